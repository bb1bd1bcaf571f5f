pub mod anthropic;
pub mod client;
pub mod openai;

use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;

pub use anthropic::AnthropicClient;
pub use client::{CompletionOptions, LlmClient};
pub use openai::OpenAiClient;

/// One turn of a conversation, shared across providers.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// LLM response with usage metadata.
#[derive(Debug)]
pub struct LlmResponse {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Builds the provider selected by the `[llm] provider` config field.
pub fn new_client(config: &LlmConfig) -> anyhow::Result<Box<dyn LlmClient>> {
    match config.provider.as_str() {
        "anthropic" => Ok(Box::new(AnthropicClient::new(config.clone()))),
        "openai" => Ok(Box::new(OpenAiClient::new(config.clone()))),
        other => anyhow::bail!(
            "unsupported LLM provider '{other}' (supported: 'anthropic', 'openai')"
        ),
    }
}
