//! Chat transport: a WebSocket bus to the chat platform gateway.
//!
//! The agent connects outward to a bot gateway endpoint, receives JSON
//! message events, and pushes JSON send actions back. The runtime talks
//! to this layer only through a channel pair, so the transport can be
//! torn down and reconnected without touching agent state.

pub mod bus;
pub mod wire;

use std::fmt;

use tokio::sync::mpsc;

use crate::config::ChatConfig;
use bus::ChatBus;

pub use bus::{ChatAction, ChatEvent};
pub use wire::{IncomingMessage, MessageTarget};

/// Reasons the chat bus failed. The reconnect loop in `main` retries
/// transient failures and gives up on the rest.
#[derive(Debug)]
pub enum ChatError {
    /// Bad endpoint or local setup; retrying cannot help.
    Config(String),
    /// The gateway refused our credentials.
    Auth(String),
    /// Network-level failure; worth retrying with backoff.
    Transient(String),
}

impl ChatError {
    pub fn is_retriable(&self) -> bool {
        matches!(self, ChatError::Transient(_))
    }
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatError::Config(msg) => write!(f, "chat config error: {msg}"),
            ChatError::Auth(msg) => write!(f, "chat authentication error: {msg}"),
            ChatError::Transient(msg) => write!(f, "chat connection error: {msg}"),
        }
    }
}

impl std::error::Error for ChatError {}

/// Connects to the chat gateway and returns the channel pair the agent
/// runtime consumes.
pub async fn connect(
    config: ChatConfig,
) -> Result<(mpsc::Receiver<ChatEvent>, mpsc::Sender<ChatAction>), ChatError> {
    ChatBus::new(config).connect().await
}
