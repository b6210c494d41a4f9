//! Anthropic Messages API.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{read_error, GenerateParams, ProviderError, MAX_TOKENS};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct AnthropicResponse {
    pub content: Vec<ContentBlock>,
    pub usage: Usage,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl AnthropicResponse {
    /// Concatenates every text block in order.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter(|b| b.block_type == "text")
            .filter_map(|b| b.text.as_deref())
            .collect()
    }
}

pub async fn generate(
    client: &Client,
    api_key: &str,
    model: &str,
    params: &GenerateParams<'_>,
) -> Result<String, ProviderError> {
    let request_body = AnthropicRequest {
        model,
        max_tokens: MAX_TOKENS,
        temperature: params.temperature,
        system: params.system_prompt,
        messages: vec![AnthropicMessage {
            role: "user",
            content: params.prompt,
        }],
    };

    let response = client
        .post(ANTHROPIC_API_URL)
        .header("x-api-key", api_key)
        .header("anthropic-version", ANTHROPIC_VERSION)
        .header("content-type", "application/json")
        .json(&request_body)
        .send()
        .await?;

    if !response.status().is_success() {
        let err = read_error(response).await;
        warn!("Anthropic API call failed: {err}");
        return Err(err);
    }

    let body: AnthropicResponse = response.json().await?;
    debug!(
        "Anthropic call succeeded: input_tokens={}, output_tokens={}",
        body.usage.input_tokens, body.usage.output_tokens
    );

    Ok(body.text())
}
