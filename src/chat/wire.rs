//! Wire format of the chat bus.
//!
//! The gateway speaks a line-oriented JSON protocol: every frame is one
//! JSON object. Incoming frames carry a `post_type` discriminator;
//! outgoing frames are `action` objects with an `echo` correlation id.
//! Parsing is tolerant — anything unrecognized is reported as `Ignored`
//! rather than failing the connection.

use serde_json::{json, Value};
use uuid::Uuid;

/// A chat message addressed to the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    /// Sender identity.
    pub actor_id: String,
    /// Originating group; empty for direct messages.
    pub group_id: String,
    /// Plain message text.
    pub body: String,
}

/// Where a reply goes: back to the group it came from, or directly to
/// the actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageTarget {
    User(String),
    Group(String),
}

/// One parsed incoming frame.
#[derive(Debug, PartialEq, Eq)]
pub enum WireEvent {
    Message(IncomingMessage),
    /// Gateway lifecycle notice (connect, enable, …).
    Lifecycle(String),
    Heartbeat,
    /// Anything unknown or unparseable.
    Ignored,
}

/// Parses one incoming frame.
pub fn parse_event(text: &str) -> WireEvent {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return WireEvent::Ignored;
    };

    match value.get("post_type").and_then(Value::as_str) {
        Some("message") => {
            let actor_id = id_to_string(value.get("user_id"));
            if actor_id.is_empty() {
                return WireEvent::Ignored;
            }
            let body = value
                .get("raw_message")
                .or_else(|| value.get("message"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            WireEvent::Message(IncomingMessage {
                actor_id,
                group_id: id_to_string(value.get("group_id")),
                body,
            })
        }
        Some("meta_event") => match value.get("meta_event_type").and_then(Value::as_str) {
            Some("lifecycle") => WireEvent::Lifecycle(
                value
                    .get("sub_type")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
            ),
            Some("heartbeat") => WireEvent::Heartbeat,
            _ => WireEvent::Ignored,
        },
        _ => WireEvent::Ignored,
    }
}

/// Gateway ids arrive as numbers or strings depending on the platform.
fn id_to_string(value: Option<&Value>) -> String {
    match value {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    }
}

/// Numeric ids are sent as numbers where the platform expects them.
fn id_to_value(id: &str) -> Value {
    id.parse::<i64>().map(Value::from).unwrap_or_else(|_| Value::from(id))
}

/// Builds a send-message action frame.
pub fn build_send_action(target: &MessageTarget, body: &str) -> String {
    let params = match target {
        MessageTarget::User(id) => json!({
            "message_type": "private",
            "user_id": id_to_value(id),
            "message": body,
        }),
        MessageTarget::Group(id) => json!({
            "message_type": "group",
            "group_id": id_to_value(id),
            "message": body,
        }),
    };

    json!({
        "action": "send_msg",
        "params": params,
        "echo": Uuid::new_v4().to_string(),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_private_message() {
        let event = parse_event(
            r#"{"post_type":"message","message_type":"private","user_id":10001,"raw_message":"/ping"}"#,
        );
        assert_eq!(
            event,
            WireEvent::Message(IncomingMessage {
                actor_id: "10001".to_string(),
                group_id: String::new(),
                body: "/ping".to_string(),
            })
        );
    }

    #[test]
    fn test_parse_group_message() {
        let event = parse_event(
            r#"{"post_type":"message","message_type":"group","user_id":10001,"group_id":777,"raw_message":"hello"}"#,
        );
        let WireEvent::Message(msg) = event else {
            panic!("expected a message event");
        };
        assert_eq!(msg.group_id, "777");
    }

    #[test]
    fn test_parse_string_ids() {
        let event = parse_event(
            r#"{"post_type":"message","user_id":"abc","group_id":"room-1","raw_message":"hi"}"#,
        );
        let WireEvent::Message(msg) = event else {
            panic!("expected a message event");
        };
        assert_eq!(msg.actor_id, "abc");
        assert_eq!(msg.group_id, "room-1");
    }

    #[test]
    fn test_parse_falls_back_to_message_field() {
        let event =
            parse_event(r#"{"post_type":"message","user_id":1,"message":"plain text"}"#);
        let WireEvent::Message(msg) = event else {
            panic!("expected a message event");
        };
        assert_eq!(msg.body, "plain text");
    }

    #[test]
    fn test_parse_message_without_user_id_ignored() {
        let event = parse_event(r#"{"post_type":"message","raw_message":"hi"}"#);
        assert_eq!(event, WireEvent::Ignored);
    }

    #[test]
    fn test_parse_meta_events() {
        assert_eq!(
            parse_event(
                r#"{"post_type":"meta_event","meta_event_type":"lifecycle","sub_type":"connect"}"#
            ),
            WireEvent::Lifecycle("connect".to_string())
        );
        assert_eq!(
            parse_event(r#"{"post_type":"meta_event","meta_event_type":"heartbeat"}"#),
            WireEvent::Heartbeat
        );
    }

    #[test]
    fn test_parse_garbage_ignored() {
        assert_eq!(parse_event("not json"), WireEvent::Ignored);
        assert_eq!(parse_event("{}"), WireEvent::Ignored);
        assert_eq!(parse_event(r#"{"post_type":"notice"}"#), WireEvent::Ignored);
    }

    #[test]
    fn test_build_private_send_action() {
        let frame = build_send_action(&MessageTarget::User("10001".to_string()), "pong");
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["action"], "send_msg");
        assert_eq!(value["params"]["message_type"], "private");
        // Numeric ids travel as numbers.
        assert_eq!(value["params"]["user_id"], 10001);
        assert_eq!(value["params"]["message"], "pong");
        assert!(value["echo"].as_str().is_some());
    }

    #[test]
    fn test_build_group_send_action() {
        let frame = build_send_action(&MessageTarget::Group("room-1".to_string()), "hi");
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["params"]["message_type"], "group");
        // Non-numeric ids stay strings.
        assert_eq!(value["params"]["group_id"], "room-1");
    }
}
