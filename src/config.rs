use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use tracing::warn;

use crate::services::extraction::RetryPolicy;

/// Which text-generation backend the extraction client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiProvider {
    OpenAi,
    Anthropic,
}

impl FromStr for AiProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(AiProvider::OpenAi),
            "anthropic" => Ok(AiProvider::Anthropic),
            other => Err(anyhow::anyhow!("Unknown AI provider: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub provider: AiProvider,
    pub api_key: String,
    pub model: String,
    pub retry: RetryPolicy,
    /// Bound on one provider HTTP call, body included.
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Wall-clock bound for one whole mailbox session.
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    /// When false, a tick that fires while a run is still active is skipped.
    pub allow_overlap: bool,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub cors_origins: String,
    /// `None` when `IMAP_HOST` is unset; polling is then disabled.
    pub mail: Option<MailConfig>,
    pub poll: PollConfig,
    pub ai: AiConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let mail = match env::var("IMAP_HOST").ok().filter(|h| !h.trim().is_empty()) {
            Some(host) => Some(MailConfig {
                host,
                port: parse_var("IMAP_PORT", 993)?,
                user: env::var("IMAP_USER").unwrap_or_default(),
                password: env::var("IMAP_PASS").unwrap_or_default(),
                timeout: parse_millis("EMAIL_POLL_TIMEOUT_MS", 25_000)?,
            }),
            None => {
                warn!("IMAP_HOST not set, inbox polling will be disabled");
                None
            }
        };

        let poll = PollConfig {
            interval: parse_millis("EMAIL_POLL_INTERVAL_MS", 120_000)?,
            allow_overlap: parse_var("EMAIL_POLL_ALLOW_OVERLAP", false)?,
        };

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_var("PORT", 8080)?,
            cors_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            mail,
            poll,
            ai: AiConfig::from_env()?,
        })
    }
}

impl AiConfig {
    pub fn from_env() -> Result<Self> {
        let provider: AiProvider = env::var("AI_PROVIDER")
            .unwrap_or_else(|_| "openai".to_string())
            .parse()?;

        let (key_var, model_var, default_model) = match provider {
            AiProvider::OpenAi => ("OPENAI_API_KEY", "OPENAI_MODEL", "gpt-4o-mini"),
            AiProvider::Anthropic => (
                "ANTHROPIC_API_KEY",
                "ANTHROPIC_MODEL",
                "claude-3-5-sonnet-20241022",
            ),
        };

        let api_key = env::var(key_var).unwrap_or_else(|_| {
            warn!("{} not set, extraction calls will fail", key_var);
            String::new()
        });

        Ok(Self {
            provider,
            api_key,
            model: env::var(model_var).unwrap_or_else(|_| default_model.to_string()),
            retry: RetryPolicy {
                max_attempts: parse_var("AI_MAX_ATTEMPTS", 3)?,
                base_delay: Duration::from_millis(parse_var("AI_BASE_BACKOFF_MS", 1_000)?),
            },
            request_timeout: parse_millis("AI_REQUEST_TIMEOUT_MS", 60_000)?,
        })
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid value, got {:?}", name, raw)),
        Err(_) => Ok(default),
    }
}

/// A millisecond duration that must be non-zero.
fn parse_millis(name: &str, default: u64) -> Result<Duration> {
    positive_millis(name, parse_var(name, default)?)
}

fn positive_millis(name: &str, millis: u64) -> Result<Duration> {
    if millis == 0 {
        anyhow::bail!("{} must be greater than zero", name);
    }
    Ok(Duration::from_millis(millis))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_names_are_case_insensitive() {
        assert_eq!("OpenAI".parse::<AiProvider>().unwrap(), AiProvider::OpenAi);
        assert_eq!(" anthropic ".parse::<AiProvider>().unwrap(), AiProvider::Anthropic);
        assert!("mistral".parse::<AiProvider>().is_err());
    }

    #[test]
    fn zero_durations_are_rejected() {
        let err = positive_millis("EMAIL_POLL_INTERVAL_MS", 0).unwrap_err();
        assert!(err.to_string().contains("EMAIL_POLL_INTERVAL_MS"));
        assert!(positive_millis("EMAIL_POLL_TIMEOUT_MS", 0).is_err());

        assert_eq!(
            positive_millis("EMAIL_POLL_INTERVAL_MS", 120_000).unwrap(),
            Duration::from_secs(120)
        );
    }
}
