//! Anthropic Messages API provider.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::LlmConfig;

use super::client::{CompletionOptions, LlmClient};
use super::{LlmResponse, Message};

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

/// Client for the Anthropic Messages API.
pub struct AnthropicClient {
    client: Client,
    config: LlmConfig,
}

impl AnthropicClient {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
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

        let request = MessagesRequest {
            model: &self.config.model,
            max_tokens,
            system: system_prompt,
            messages,
            temperature: options.temperature,
        };

        debug!(
            "Calling Claude API ({}) with {} messages",
            self.config.model,
            messages.len()
        );

        let response = self
            .client
            .post(MESSAGES_URL)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            anyhow::bail!("Claude API error ({status}): {body}");
        }

        let resp: MessagesResponse = response.json().await?;

        let text = resp
            .content
            .iter()
            .filter_map(|block| {
                if block.block_type == "text" {
                    block.text.clone()
                } else {
                    None
                }
            })
            .collect::<Vec<_>>()
            .join("\n");

        let (input_tokens, output_tokens) = resp
            .usage
            .map(|u| (u.input_tokens, u.output_tokens))
            .unwrap_or((0, 0));

        info!("LLM response: {input_tokens} in / {output_tokens} out tokens");

        Ok(LlmResponse {
            text,
            input_tokens,
            output_tokens,
        })
    }

    fn description(&self) -> String {
        format!("anthropic ({})", self.config.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_parsing_joins_text_blocks() {
        let json = r#"{
            "content": [
                {"type": "text", "text": "first"},
                {"type": "tool_use", "text": null},
                {"type": "text", "text": "second"}
            ],
            "usage": {"input_tokens": 10, "output_tokens": 20}
        }"#;
        let parsed: MessagesResponse = serde_json::from_str(json).unwrap();
        let text = parsed
            .content
            .iter()
            .filter_map(|b| {
                if b.block_type == "text" {
                    b.text.clone()
                } else {
                    None
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(text, "first\nsecond");
        assert_eq!(parsed.usage.unwrap().input_tokens, 10);
    }

    #[test]
    fn test_response_parsing_without_usage() {
        let json = r#"{"content": []}"#;
        let parsed: MessagesResponse = serde_json::from_str(json).unwrap();
        assert!(parsed.usage.is_none());
    }

    #[test]
    fn test_request_omits_absent_temperature() {
        let request = MessagesRequest {
            model: "m",
            max_tokens: 10,
            system: "s",
            messages: &[],
            temperature: None,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("temperature"));

        let request = MessagesRequest {
            temperature: Some(0.1),
            ..request
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"temperature\":0.1"));
    }
}
