// Text-generation providers behind the extraction client.
//
// Providers only translate a (prompt, system prompt) pair into one HTTP call and
// classify failures. Retry and backoff live in `ExtractionClient`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{AiConfig, AiProvider};
use crate::error::ProviderError;

const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const TEMPERATURE: f32 = 0.3;
const MAX_TOKENS: u32 = 4096;

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &'static str;

    /// Send one prompt and return the raw text of the reply.
    async fn generate(&self, prompt: &str, system_prompt: &str) -> Result<String, ProviderError>;
}

/// Build the provider selected by configuration.
pub fn provider_from_config(config: &AiConfig) -> Result<Arc<dyn TextGenerator>, ProviderError> {
    let provider: Arc<dyn TextGenerator> = match config.provider {
        AiProvider::OpenAi => Arc::new(OpenAiProvider::new(
            &config.api_key,
            &config.model,
            config.request_timeout,
        )?),
        AiProvider::Anthropic => Arc::new(AnthropicProvider::new(
            &config.api_key,
            &config.model,
            config.request_timeout,
        )?),
    };
    Ok(provider)
}

/// HTTP client with a bound on every request, body included.
fn http_client(timeout: Duration) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::Transport(format!("failed to create HTTP client: {}", e)))
}

/// A timed-out body read is a transport failure and gets retried.
fn body_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Transport(e.to_string())
    } else {
        ProviderError::Response(e.to_string())
    }
}

// =============================================================================
// OpenAI chat completions
// =============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Clone)]
pub struct OpenAiProvider {
    http_client: Client,
    api_key: String,
    model: String,
    url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: &str, model: &str, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            http_client: http_client(timeout)?,
            api_key: api_key.to_string(),
            model: model.to_string(),
            url: OPENAI_URL.to_string(),
        })
    }

    /// Point at a compatible endpoint (proxy, Azure, local gateway).
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl TextGenerator for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn generate(&self, prompt: &str, system_prompt: &str) -> Result<String, ProviderError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: system_prompt },
                ChatMessage { role: "user", content: prompt },
            ],
            temperature: TEMPERATURE,
        };

        debug!(model = %self.model, prompt_length = prompt.len(), "Calling OpenAI");

        let response = self
            .http_client
            .post(&self.url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let body: ChatResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(body_error)?;

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::Response("no choices in completion".to_string()))
    }
}

// =============================================================================
// Anthropic messages
// =============================================================================

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[derive(Clone)]
pub struct AnthropicProvider {
    http_client: Client,
    api_key: String,
    model: String,
    url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: &str, model: &str, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            http_client: http_client(timeout)?,
            api_key: api_key.to_string(),
            model: model.to_string(),
            url: ANTHROPIC_URL.to_string(),
        })
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl TextGenerator for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn generate(&self, prompt: &str, system_prompt: &str) -> Result<String, ProviderError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            system: system_prompt,
            messages: vec![ChatMessage { role: "user", content: prompt }],
            temperature: TEMPERATURE,
        };

        debug!(model = %self.model, prompt_length = prompt.len(), "Calling Anthropic");

        let response = self
            .http_client
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let body: MessagesResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(body_error)?;

        let text: String = body
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(ProviderError::Response("no text content in message".to_string()));
        }
        Ok(text)
    }
}

// =============================================================================
// Shared response classification
// =============================================================================

async fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        warn!(?retry_after, "Provider rate limit hit");
        return Err(ProviderError::RateLimited { retry_after });
    }

    let body = response.text().await.unwrap_or_default();
    warn!(status = %status, error = %body, "Provider API error");
    Err(ProviderError::Api { status: status.as_u16(), body })
}

/// `Retry-After` in delta-seconds form. HTTP-date hints are ignored and fall back to backoff.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
