//! WebSocket chat bus.
//!
//! Owns the connection to the chat gateway. `connect()` completes the
//! WebSocket handshake synchronously (awaited), then spawns the
//! read/write event loop as a background task and hands the runtime a
//! channel pair:
//!
//! - `event_rx` — incoming chat events (messages, errors)
//! - `cmd_tx` — outgoing actions (send message)

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tracing::{debug, error, info, warn};

use crate::config::ChatConfig;

use super::wire::{self, IncomingMessage, MessageTarget, WireEvent};
use super::ChatError;

/// Events emitted by the chat layer to the runtime.
#[derive(Debug)]
pub enum ChatEvent {
    Connected,
    Message(IncomingMessage),
    Error(String),
}

/// Actions sent by the runtime to the chat layer.
#[derive(Debug)]
pub enum ChatAction {
    SendMessage {
        target: MessageTarget,
        body: String,
    },
}

pub struct ChatBus {
    config: ChatConfig,
}

impl ChatBus {
    pub fn new(config: ChatConfig) -> Self {
        Self { config }
    }

    /// Connects to the gateway and returns the channel pair. On success
    /// the event loop runs as a background task until the connection
    /// drops, at which point `event_rx` closes.
    pub async fn connect(
        self,
    ) -> Result<(mpsc::Receiver<ChatEvent>, mpsc::Sender<ChatAction>), ChatError> {
        let mut request = self
            .config
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| ChatError::Config(format!("bad chat url '{}': {e}", self.config.url)))?;

        if let Some(ref token) = self.config.access_token {
            let value = format!("Bearer {token}")
                .parse()
                .map_err(|_| ChatError::Config("access token is not header-safe".into()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        info!("Connecting to chat gateway at {}", self.config.url);
        let (ws, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(classify_ws_error)?;
        info!("Chat gateway connected");

        let (event_tx, event_rx) = mpsc::channel::<ChatEvent>(100);
        let (cmd_tx, cmd_rx) = mpsc::channel::<ChatAction>(100);

        // Connection established — notify runtime
        let _ = event_tx.send(ChatEvent::Connected).await;

        tokio::spawn(Self::run_event_loop(ws, event_tx, cmd_rx));

        Ok((event_rx, cmd_tx))
    }

    /// Main read/write loop, spawned after a successful handshake. Ends
    /// (and closes the event channel) when either direction fails.
    async fn run_event_loop(
        ws: tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        event_tx: mpsc::Sender<ChatEvent>,
        mut cmd_rx: mpsc::Receiver<ChatAction>,
    ) {
        let (mut sink, mut stream) = ws.split();

        let read_handle = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(WsMessage::Text(text)) => match wire::parse_event(&text) {
                        WireEvent::Message(msg) => {
                            debug!("Received message from {}: {}", msg.actor_id, msg.body);
                            let _ = event_tx.send(ChatEvent::Message(msg)).await;
                        }
                        WireEvent::Lifecycle(sub_type) => {
                            debug!("Gateway lifecycle event: {sub_type}");
                        }
                        WireEvent::Heartbeat | WireEvent::Ignored => {}
                    },
                    Ok(WsMessage::Close(_)) => {
                        warn!("Chat gateway closed the connection");
                        let _ = event_tx
                            .send(ChatEvent::Error("Connection closed".into()))
                            .await;
                        break;
                    }
                    // Ping/pong and binary frames are handled by the
                    // library or irrelevant to us.
                    Ok(_) => {}
                    Err(e) => {
                        error!("Chat read error: {e}");
                        let _ = event_tx.send(ChatEvent::Error(format!("read error: {e}"))).await;
                        break;
                    }
                }
            }
        });

        let write_handle = tokio::spawn(async move {
            while let Some(action) = cmd_rx.recv().await {
                let frame = match action {
                    ChatAction::SendMessage { target, body } => {
                        wire::build_send_action(&target, &body)
                    }
                };

                if let Err(e) = sink.send(WsMessage::Text(frame)).await {
                    error!("Chat write error: {e}");
                    break;
                }
            }
        });

        tokio::select! {
            _ = read_handle => {},
            _ = write_handle => {},
        }
    }
}

/// Maps a handshake failure onto the retry policy: HTTP auth rejections
/// are permanent, everything else on the network is transient.
fn classify_ws_error(error: WsError) -> ChatError {
    match error {
        WsError::Http(response) => {
            let status = response.status();
            if status == 401 || status == 403 {
                ChatError::Auth(format!("gateway rejected credentials ({status})"))
            } else {
                ChatError::Transient(format!("gateway returned {status}"))
            }
        }
        WsError::Url(e) => ChatError::Config(format!("bad url: {e}")),
        other => ChatError::Transient(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_auth_rejection() {
        let response = tokio_tungstenite::tungstenite::http::Response::builder()
            .status(401)
            .body(None)
            .unwrap();
        let err = classify_ws_error(WsError::Http(response));
        assert!(matches!(err, ChatError::Auth(_)));
        assert!(!err.is_retriable());
    }

    #[test]
    fn test_classify_server_error_is_transient() {
        let response = tokio_tungstenite::tungstenite::http::Response::builder()
            .status(502)
            .body(None)
            .unwrap();
        let err = classify_ws_error(WsError::Http(response));
        assert!(err.is_retriable());
    }

    #[test]
    fn test_classify_connection_error_is_transient() {
        let err = classify_ws_error(WsError::ConnectionClosed);
        assert!(err.is_retriable());
    }

    #[tokio::test]
    async fn test_connect_refused_is_transient() {
        // Nothing listens on this port; the TCP connect must fail fast
        // and be classified retriable.
        let bus = ChatBus::new(ChatConfig {
            url: "ws://127.0.0.1:1".to_string(),
            access_token: None,
        });
        let err = bus.connect().await.unwrap_err();
        assert!(err.is_retriable(), "got non-retriable error: {err}");
    }
}
