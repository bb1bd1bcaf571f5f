//! `LlmClient` trait — abstraction over LLM backends.
//!
//! Providers (Anthropic, OpenAI-compatible, …) implement this trait so
//! the runtime can be pointed at any supported backend via the
//! `[llm] provider` config field.

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;

use super::{LlmResponse, Message};

/// Per-call overrides. Skills tune these (codegen runs cold and short);
/// `Default` leaves every knob at the provider's configured value.
#[derive(Debug, Default, Clone)]
pub struct CompletionOptions {
    /// Caps the response below `[llm] max_tokens_per_request`.
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// Abstraction over LLM backends.
///
/// Each provider translates the shared message types into its own wire
/// format and normalizes responses back into [`LlmResponse`].
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Sends a conversation to the LLM and returns the response.
    async fn complete(
        &self,
        system_prompt: &str,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<LlmResponse>;

    /// Human-readable description of the provider and model.
    ///
    /// Used in status output, e.g. `"anthropic (claude-sonnet-4-5-20250929)"`.
    fn description(&self) -> String;
}

impl fmt::Debug for dyn LlmClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LlmClient({})", self.description())
    }
}
