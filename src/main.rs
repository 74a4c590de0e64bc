use std::sync::Arc;

use anyhow::{Context, Result};
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, HeaderName, HeaderValue, Method},
    response::{Html, IntoResponse},
    routing::{get, post},
    Router,
};
use migration::{Migrator, MigratorTrait};
use sea_orm::Database;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use procurely::config::AppConfig;
use procurely::graphql::{create_schema, ApiSchema, ApiServices};
use procurely::services::{
    provider_from_config, spawn_poller, ComparisonService, ExtractionClient, ImapMailbox, InMemoryLedger,
    IngestionOrchestrator, Poller, RequestService, SeaOrmStore, VendorService,
};

#[derive(Clone)]
struct AppState {
    schema: ApiSchema,
}

async fn graphql_handler(State(state): State<AppState>, req: GraphQLRequest) -> GraphQLResponse {
    state.schema.execute(req.into_inner()).await.into()
}

async fn graphql_playground() -> impl IntoResponse {
    Html(r#"
    <!DOCTYPE html>
    <html>
    <head>
        <title>Procurely GraphQL Playground</title>
        <link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/graphql-playground-react/build/static/css/index.css" />
    </head>
    <body>
        <div id="root"></div>
        <script src="https://cdn.jsdelivr.net/npm/graphql-playground-react/build/static/js/middleware.js"></script>
        <script>
            GraphQLPlayground.init(document.getElementById('root'), {
                endpoint: '/graphql'
            })
        </script>
    </body>
    </html>
    "#)
}

async fn health() -> impl IntoResponse {
    "OK"
}

fn cors_layer(cors_origins: &str) -> CorsLayer {
    if cors_origins.trim() == "*" {
        warn!("CORS set to accept ANY origin (*) - only use in development!");
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = cors_origins
        .split(',')
        .filter_map(|origin| origin.trim().parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            CONTENT_TYPE,
            HeaderName::from_static("apollo-require-preflight"),
            HeaderName::from_static("x-requested-with"),
        ])
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "procurely=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    info!(provider = ?config.ai.provider, model = %config.ai.model, "Starting Procurely");

    // Connect to database
    info!("Connecting to database...");
    let db = Database::connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    Migrator::up(&db, None).await.context("Failed to run migrations")?;
    info!("Database connected and migrated");

    // Initialize services
    let store = SeaOrmStore::new(db.clone());
    let shared_store = Arc::new(store.clone());
    let extraction = ExtractionClient::new(provider_from_config(&config.ai)?, config.ai.retry);
    let comparison_service = ComparisonService::new(shared_store.clone(), extraction.clone());

    let poller = match config.mail.clone() {
        Some(mail) => {
            let orchestrator = IngestionOrchestrator::new(
                Arc::new(ImapMailbox::new(mail)),
                Arc::new(InMemoryLedger::new()),
                shared_store,
                extraction,
            );
            let poller = Poller::new(orchestrator, config.poll.allow_overlap);
            spawn_poller(poller.clone(), &config.poll);
            Some(poller)
        }
        None => None,
    };

    let schema = create_schema(ApiServices {
        vendor_service: VendorService::new(db.clone()),
        request_service: RequestService::new(db),
        store,
        comparison_service,
        poller,
    });

    // Create router
    let app = Router::new()
        .route("/graphql", post(graphql_handler))
        .route("/playground", get(graphql_playground))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.cors_origins))
        .with_state(AppState { schema });

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Server starting on http://{}", addr);
    info!("GraphQL Playground available at http://{}/playground", addr);
    info!("Health check available at http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
