use std::time::Duration;

use anyhow::{bail, Context, Result};
use crate::llm_client::{
    ProviderConfig, DEFAULT_ANTHROPIC_MODEL, DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL,
};
use crate::models::progress::DEFAULT_MAX_ATTEMPTS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

/// Retry budget and timeout applied to one provider.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub config: ProviderConfig,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub timeout: Duration,
}

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub store_backend: StoreBackend,
    /// Required for the Postgres backend only.
    pub database_url: Option<String>,
    /// Fallback order: index 0 is tried first.
    pub providers: Vec<ProviderSettings>,
    /// Listed in PROVIDER_PRIORITY but missing an API key.
    pub skipped_providers: Vec<String>,
    pub max_attempts: u32,
    pub progress_stale_after: Duration,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let store_backend = match env_or("STORE_BACKEND", "postgres").as_str() {
            "postgres" => StoreBackend::Postgres,
            "memory" => StoreBackend::Memory,
            other => bail!("STORE_BACKEND must be 'postgres' or 'memory', got '{other}'"),
        };
        let database_url = match store_backend {
            StoreBackend::Postgres => Some(require_env("DATABASE_URL")?),
            StoreBackend::Memory => None,
        };

        let max_attempts: u32 = parse_env("PROVIDER_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?;
        if max_attempts == 0 {
            bail!("PROVIDER_MAX_ATTEMPTS must be at least 1");
        }
        let initial_backoff =
            Duration::from_millis(parse_env("PROVIDER_INITIAL_BACKOFF_MS", 1000u64)?);
        let timeout = Duration::from_secs(parse_env("PROVIDER_TIMEOUT_SECS", 120u64)?);

        let priority = env_or("PROVIDER_PRIORITY", "anthropic,openai");
        let mut providers = Vec::new();
        let mut skipped_providers = Vec::new();
        for name in priority.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match provider_from_env(name)? {
                Some(config) => providers.push(ProviderSettings {
                    config,
                    max_attempts,
                    initial_backoff,
                    timeout,
                }),
                None => skipped_providers.push(name.to_string()),
            }
        }
        if providers.is_empty() {
            bail!(
                "No generative-text provider configured. Set ANTHROPIC_API_KEY or OPENAI_API_KEY"
            );
        }

        Ok(Config {
            store_backend,
            database_url,
            providers,
            skipped_providers,
            max_attempts,
            progress_stale_after: Duration::from_secs(parse_env(
                "PROGRESS_STALE_AFTER_SECS",
                600u64,
            )?),
            port: parse_env("PORT", 8080u16)?,
            rust_log: env_or("RUST_LOG", "info"),
        })
    }
}

/// Builds one provider from its env vars. `Ok(None)` when its key is unset.
fn provider_from_env(name: &str) -> Result<Option<ProviderConfig>> {
    match name {
        "anthropic" => Ok(std::env::var("ANTHROPIC_API_KEY")
            .ok()
            .map(|api_key| ProviderConfig::Anthropic {
                api_key,
                model: env_or("ANTHROPIC_MODEL", DEFAULT_ANTHROPIC_MODEL),
            })),
        "openai" => Ok(std::env::var("OPENAI_API_KEY")
            .ok()
            .map(|api_key| ProviderConfig::OpenAi {
                api_key,
                model: env_or("OPENAI_MODEL", DEFAULT_OPENAI_MODEL),
                base_url: env_or("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL),
            })),
        other => bail!("Unknown provider '{other}' in PROVIDER_PRIORITY"),
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        Err(_) => Ok(default),
    }
}
