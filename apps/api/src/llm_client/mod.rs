/// LLM Client — the single point of entry for generative-text provider calls.
///
/// ARCHITECTURAL RULE: No other module may call a provider API directly.
/// Every backend is one variant of `ProviderConfig`, dispatched through
/// `LlmClient`, which implements the `TextGenerator` capability.
///
/// Retries live in `tailoring::backoff`; a client call is exactly one HTTP
/// request bounded by the configured timeout.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

pub mod anthropic;
pub mod openai;
pub mod prompts;

pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-5";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const MAX_TOKENS: u32 = 4096;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} timed out after {}ms", .after.as_millis())]
    Timeout { provider: String, after: Duration },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("Provider '{0}' is not configured")]
    NotConfigured(String),
}

/// One generation request, independent of the backend's wire shape.
#[derive(Debug, Clone)]
pub struct GenerateParams<'a> {
    pub prompt: &'a str,
    pub system_prompt: &'a str,
    /// Overrides the provider's configured model.
    pub model: Option<&'a str>,
    pub temperature: f32,
}

/// The generative-text capability shared by every backend.
///
/// Carried by the orchestrator as `Arc<dyn TextGenerator>`, in priority order.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    async fn generate(&self, params: &GenerateParams<'_>) -> Result<String, ProviderError>;

    /// Lightweight liveness probe, independent of the job path.
    async fn test_connection(&self) -> Result<String, ProviderError> {
        let text = self
            .generate(&GenerateParams {
                prompt: prompts::TEST_CONNECTION_PROMPT,
                system_prompt: prompts::TEST_CONNECTION_SYSTEM,
                model: None,
                temperature: 0.0,
            })
            .await?;
        Ok(text.trim().to_string())
    }
}

/// Backend selection plus its credentials.
#[derive(Debug, Clone)]
pub enum ProviderConfig {
    Anthropic {
        api_key: String,
        model: String,
    },
    OpenAi {
        api_key: String,
        model: String,
        base_url: String,
    },
}

impl ProviderConfig {
    pub fn name(&self) -> &'static str {
        match self {
            ProviderConfig::Anthropic { .. } => "anthropic",
            ProviderConfig::OpenAi { .. } => "openai",
        }
    }

    pub fn model(&self) -> &str {
        match self {
            ProviderConfig::Anthropic { model, .. } | ProviderConfig::OpenAi { model, .. } => {
                model
            }
        }
    }
}

#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    config: ProviderConfig,
    timeout: Duration,
}

impl LlmClient {
    pub fn new(config: ProviderConfig, timeout: Duration) -> Self {
        Self {
            // The request deadline is enforced per call below; this one only
            // catches connections that never finish.
            client: Client::builder()
                .timeout(timeout + Duration::from_secs(5))
                .build()
                .expect("Failed to build HTTP client"),
            config,
            timeout,
        }
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    fn name(&self) -> &str {
        self.config.name()
    }

    fn model(&self) -> &str {
        self.config.model()
    }

    async fn generate(&self, params: &GenerateParams<'_>) -> Result<String, ProviderError> {
        let call = async {
            match &self.config {
                ProviderConfig::Anthropic { api_key, model } => {
                    let model = params.model.unwrap_or(model);
                    anthropic::generate(&self.client, api_key, model, params).await
                }
                ProviderConfig::OpenAi {
                    api_key,
                    model,
                    base_url,
                } => {
                    let model = params.model.unwrap_or(model);
                    openai::generate(&self.client, base_url, api_key, model, params).await
                }
            }
        };

        let text = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| ProviderError::Timeout {
                provider: self.name().to_string(),
                after: self.timeout,
            })??;

        let text = strip_code_fences(&text);
        if text.is_empty() {
            return Err(ProviderError::EmptyContent);
        }
        debug!("{} returned {} chars", self.name(), text.len());
        Ok(text.to_string())
    }
}

/// Strips a surrounding ```lang ... ``` fence from model output, if any.
pub fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the optional language tag on the opening fence line.
    let body = match rest.find('\n') {
        Some(newline) if !rest[..newline].contains(' ') => &rest[newline + 1..],
        _ => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .map(|s| s.trim())
        .unwrap_or(body.trim())
}

/// Reads an error body, preferring the provider's own `error.message` field.
pub(crate) async fn read_error(response: reqwest::Response) -> ProviderError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or(body);
    ProviderError::Api { status, message }
}
