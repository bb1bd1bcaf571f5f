//! OpenAI-compatible chat-completions provider.
//!
//! Calls `POST {base_url}/chat/completions` with the standard OpenAI
//! schema, so it also covers self-hosted gateways that speak the same
//! dialect.
//!
//! Key differences from Anthropic:
//! - System prompt is sent as a `role: "system"` message (not a top-level field).
//! - Response text lives in `choices[0].message.content`.
//! - Token usage: `prompt_tokens` / `completion_tokens` (may be absent).

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::LlmConfig;

use super::client::{CompletionOptions, LlmClient};
use super::{LlmResponse, Message};

/// Default API base when `[llm] base_url` is not set.
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

// ── Wire types ───────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

// ── OpenAiClient ─────────────────────────────────────────

pub struct OpenAiClient {
    client: Client,
    config: LlmConfig,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(config: LlmConfig) -> Self {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        Self {
            client: Client::new(),
            config,
            base_url,
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(
        &self,
        system_prompt: &str,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<LlmResponse> {
        let max_tokens = options
            .max_tokens
            .unwrap_or(self.config.max_tokens_per_request)
            .min(self.config.max_tokens_per_request);

        let mut wire_messages = Vec::with_capacity(messages.len() + 1);
        wire_messages.push(Message {
            role: "system".to_string(),
            content: system_prompt.to_string(),
        });
        wire_messages.extend_from_slice(messages);

        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: wire_messages,
            max_tokens,
            temperature: options.temperature,
        };

        let url = format!("{}/chat/completions", self.base_url);
        debug!(
            "Calling chat completions ({}) with {} messages",
            self.config.model,
            messages.len()
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            anyhow::bail!("chat completions API error ({status}): {body}");
        }

        let resp: ChatResponse = response.json().await?;

        let text = resp
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        let (input_tokens, output_tokens) = resp
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((0, 0));

        info!("LLM response: {input_tokens} in / {output_tokens} out tokens");

        Ok(LlmResponse {
            text,
            input_tokens,
            output_tokens,
        })
    }

    fn description(&self) -> String {
        format!("openai ({})", self.config.model)
    }
}
