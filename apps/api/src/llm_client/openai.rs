//! OpenAI-compatible Chat Completions API.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{read_error, GenerateParams, ProviderError, MAX_TOKENS};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<Choice>,
    pub usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl ChatResponse {
    pub fn text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
    }
}

pub async fn generate(
    client: &Client,
    base_url: &str,
    api_key: &str,
    model: &str,
    params: &GenerateParams<'_>,
) -> Result<String, ProviderError> {
    let mut messages = Vec::with_capacity(2);
    if !params.system_prompt.is_empty() {
        messages.push(ChatMessage {
            role: "system",
            content: params.system_prompt,
        });
    }
    messages.push(ChatMessage {
        role: "user",
        content: params.prompt,
    });

    let request_body = ChatRequest {
        model,
        max_tokens: MAX_TOKENS,
        temperature: params.temperature,
        messages,
    };

    let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));
    let response = client
        .post(url)
        .bearer_auth(api_key)
        .json(&request_body)
        .send()
        .await?;

    if !response.status().is_success() {
        let err = read_error(response).await;
        warn!("OpenAI API call failed: {err}");
        return Err(err);
    }

    let body: ChatResponse = response.json().await?;
    if let Some(usage) = &body.usage {
        debug!(
            "OpenAI call succeeded: prompt_tokens={}, completion_tokens={}",
            usage.prompt_tokens, usage.completion_tokens
        );
    }

    body.text()
        .map(str::to_string)
        .ok_or(ProviderError::EmptyContent)
}
