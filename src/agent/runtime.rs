use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::chat::{ChatAction, ChatEvent, IncomingMessage, MessageTarget};
use crate::config::Config;
use crate::llm::{CompletionOptions, LlmClient, Message};
use crate::skills::{SkillContext, SkillRegistry};

/// Maximum number of history messages sent to the LLM
const MAX_HISTORY: usize = 20;

/// The agent runtime — ties the pieces together.
///
/// Receives chat events, enforces the actor allowlist, intercepts slash
/// commands and dispatches them to skills, and falls back to LLM chat
/// (with a capped in-memory history) for plain messages.
pub struct AgentRuntime {
    config: Config,
    llm: Arc<dyn LlmClient>,
    skills: Arc<SkillRegistry>,
    /// Per-actor conversation history. Guarded by a plain mutex; never
    /// held across an await.
    history: Mutex<HashMap<String, Vec<Message>>>,
    start_time: std::time::Instant,
}

impl AgentRuntime {
    pub fn new(config: Config, llm: Arc<dyn LlmClient>, skills: Arc<SkillRegistry>) -> Self {
        Self {
            config,
            llm,
            skills,
            history: Mutex::new(HashMap::new()),
            start_time: std::time::Instant::now(),
        }
    }

    /// Main agent loop. Returns when the chat event channel closes,
    /// i.e. when the transport dropped.
    pub async fn run(
        &self,
        mut event_rx: mpsc::Receiver<ChatEvent>,
        cmd_tx: mpsc::Sender<ChatAction>,
    ) -> Result<()> {
        info!("Agent runtime started — waiting for messages...");

        while let Some(event) = event_rx.recv().await {
            match event {
                ChatEvent::Connected => {
                    info!("✓ Agent is online and ready");
                }
                ChatEvent::Message(msg) => {
                    // Authorization check
                    if !self.config.is_actor_allowed(&msg.actor_id) {
                        warn!("Unauthorized message from {}, ignoring", msg.actor_id);
                        continue;
                    }

                    info!("Processing message from {}: {}", msg.actor_id, msg.body);

                    // Slash commands are intercepted before the LLM
                    let response = if msg.body.trim_start().starts_with('/') {
                        self.handle_command(&msg).await
                    } else {
                        self.handle_chat(&msg).await
                    };

                    let body = match response {
                        Ok(text) => text,
                        Err(e) => {
                            error!("Error processing message: {e}");
                            format!("Sorry, an error occurred: {e}")
                        }
                    };

                    let _ = cmd_tx
                        .send(ChatAction::SendMessage {
                            target: reply_target(&msg),
                            body,
                        })
                        .await;
                }
                ChatEvent::Error(e) => {
                    error!("Chat bus error: {e}");
                }
            }
        }

        Ok(())
    }

    // ── Slash commands ────────────────────────────────────

    /// Handles a slash command. Returns the response text.
    /// These never reach the LLM.
    async fn handle_command(&self, msg: &IncomingMessage) -> Result<String> {
        let body = msg.body.trim();
        let (command, args) = match body.split_once(' ') {
            Some((command, args)) => (command.to_lowercase(), args.trim()),
            None => (body.to_lowercase(), ""),
        };

        info!("Slash command from {}: {command}", msg.actor_id);

        let context = SkillContext {
            actor_id: msg.actor_id.clone(),
            group_id: msg.group_id.clone(),
        };

        match command.as_str() {
            "/cmd" => {
                self.invoke_skill("run_command", json!({ "command": args }), &context)
                    .await
            }
            "/search" => {
                if args.is_empty() {
                    return Ok(self.skill_usage("web_search"));
                }
                self.invoke_skill("web_search", json!({ "query": args }), &context)
                    .await
            }
            "/code" => {
                if args.is_empty() {
                    return Ok(self.skill_usage("codegen"));
                }
                self.invoke_skill("codegen", json!({ "request": args }), &context)
                    .await
            }
            "/status" => Ok(self.cmd_status()),
            "/help" => Ok(self.cmd_help()),
            "/ping" => Ok("pong".to_string()),
            _ => Ok(format!(
                "Unknown command: {command}\nType /help for available commands."
            )),
        }
    }

    async fn invoke_skill(
        &self,
        name: &str,
        params: serde_json::Value,
        context: &SkillContext,
    ) -> Result<String> {
        match self.skills.get(name) {
            Some(skill) => skill.execute(params, context).await,
            None => Ok(format!("The {name} skill is not configured.")),
        }
    }

    fn skill_usage(&self, name: &str) -> String {
        match self.skills.get(name) {
            Some(skill) => format!("Usage: {}", skill.usage()),
            None => format!("The {name} skill is not configured."),
        }
    }

    /// /status — Agent status overview
    fn cmd_status(&self) -> String {
        let uptime = self.start_time.elapsed();
        let hours = uptime.as_secs() / 3600;
        let minutes = (uptime.as_secs() % 3600) / 60;

        format!(
            "{} — status\n\
             Uptime: {hours}h {minutes}m\n\
             LLM: {}\n\
             Skills: {} registered\n\
             Command gateway: {}\n\
             Speech: {}",
            self.config.agent.name,
            self.llm.description(),
            self.skills.len(),
            if self.config.gateway.enabled {
                "enabled"
            } else {
                "disabled"
            },
            if self.config.speech.enabled {
                format!(
                    "stt {} / tts {}",
                    self.config.speech.stt_provider, self.config.speech.tts_provider
                )
            } else {
                "disabled".to_string()
            },
        )
    }

    /// /help — List available commands
    fn cmd_help(&self) -> String {
        let mut help = String::from("Commands:\n");
        for skill in self.skills.iter() {
            help.push_str(&format!("  {} — {}\n", skill.usage(), skill.description()));
        }
        help.push_str("  /status — agent info, uptime\n");
        help.push_str("  /ping — check if the agent is alive\n");
        help.push_str("  /help — this message");
        help
    }

    // ── LLM chat fallback ─────────────────────────────────

    /// Processes a plain message and produces a response via the LLM.
    async fn handle_chat(&self, msg: &IncomingMessage) -> Result<String> {
        let mut messages = {
            let history = self.history.lock().expect("history lock poisoned");
            history.get(&msg.actor_id).cloned().unwrap_or_default()
        };
        messages.push(Message::user(&msg.body));

        let response = self
            .llm
            .complete(
                &self.build_system_prompt(),
                &messages,
                &CompletionOptions::default(),
            )
            .await?;

        self.remember(&msg.actor_id, &msg.body, &response.text);

        info!(
            "Response to {}: {} chars ({} tokens used)",
            msg.actor_id,
            response.text.len(),
            response.input_tokens + response.output_tokens
        );

        Ok(response.text)
    }

    /// Appends one exchange to the actor's history, keeping only the
    /// most recent `MAX_HISTORY` messages.
    fn remember(&self, actor_id: &str, user_text: &str, assistant_text: &str) {
        let mut history = self.history.lock().expect("history lock poisoned");
        let messages = history.entry(actor_id.to_string()).or_default();
        messages.push(Message::user(user_text));
        messages.push(Message::assistant(assistant_text));
        if messages.len() > MAX_HISTORY {
            let excess = messages.len() - MAX_HISTORY;
            messages.drain(..excess);
        }
    }

    fn build_system_prompt(&self) -> String {
        format!(
            "You are {}, an ops assistant reachable over chat.\n\
             You are direct, helpful, and concise. You respond in the user's language.\n\n\
             Rules:\n\
             - Respond concisely, no excessive markdown formatting\n\
             - Host actions happen only through the /cmd command with its own \
               safety checks; point users there instead of promising to run \
               anything yourself\n\
             - You have memory of this conversation only",
            self.config.agent.name
        )
    }
}

/// Group messages are answered in the group, direct messages directly.
fn reply_target(msg: &IncomingMessage) -> MessageTarget {
    if msg.group_id.is_empty() {
        MessageTarget::User(msg.actor_id.clone())
    } else {
        MessageTarget::Group(msg.group_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmResponse;
    use async_trait::async_trait;

    struct FakeLlm;

    #[async_trait]
    impl LlmClient for FakeLlm {
        async fn complete(
            &self,
            _system_prompt: &str,
            messages: &[Message],
            _options: &CompletionOptions,
        ) -> Result<LlmResponse> {
            Ok(LlmResponse {
                text: format!("echo: {}", messages.last().map(|m| m.content.as_str()).unwrap_or("")),
                input_tokens: 1,
                output_tokens: 1,
            })
        }

        fn description(&self) -> String {
            "fake (test)".to_string()
        }
    }

    fn test_runtime() -> AgentRuntime {
        let config: Config = toml::from_str(
            r#"
            [agent]
            name = "Test Agent"
            allowed_actors = ["10001"]

            [chat]
            url = "ws://localhost:6700"

            [llm]
            provider = "anthropic"
            model = "test-model"
            api_key = "test-key"
            "#,
        )
        .unwrap();
        AgentRuntime::new(config, Arc::new(FakeLlm), Arc::new(SkillRegistry::new()))
    }

    fn message(body: &str) -> IncomingMessage {
        IncomingMessage {
            actor_id: "10001".to_string(),
            group_id: String::new(),
            body: body.to_string(),
        }
    }

    #[tokio::test]
    async fn test_ping() {
        let runtime = test_runtime();
        assert_eq!(runtime.handle_command(&message("/ping")).await.unwrap(), "pong");
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let runtime = test_runtime();
        let reply = runtime.handle_command(&message("/frobnicate")).await.unwrap();
        assert!(reply.contains("Unknown command: /frobnicate"));
        assert!(reply.contains("/help"));
    }

    #[tokio::test]
    async fn test_command_casing_normalized() {
        let runtime = test_runtime();
        assert_eq!(runtime.handle_command(&message("/PING")).await.unwrap(), "pong");
    }

    #[tokio::test]
    async fn test_unconfigured_skill_reported() {
        let runtime = test_runtime();
        let reply = runtime.handle_command(&message("/cmd ls")).await.unwrap();
        assert!(reply.contains("not configured"));
    }

    #[tokio::test]
    async fn test_status_mentions_llm_and_gateway() {
        let runtime = test_runtime();
        let status = runtime.cmd_status();
        assert!(status.contains("Test Agent"));
        assert!(status.contains("fake (test)"));
        assert!(status.contains("Command gateway: disabled"));
        assert!(status.contains("Speech: disabled"));
    }

    #[tokio::test]
    async fn test_help_lists_builtin_commands() {
        let runtime = test_runtime();
        let help = runtime.cmd_help();
        assert!(help.contains("/status"));
        assert!(help.contains("/ping"));
        assert!(help.contains("/help"));
    }

    #[tokio::test]
    async fn test_chat_fallback_uses_llm() {
        let runtime = test_runtime();
        let reply = runtime.handle_chat(&message("hello there")).await.unwrap();
        assert_eq!(reply, "echo: hello there");
    }

    #[tokio::test]
    async fn test_history_is_capped() {
        let runtime = test_runtime();
        for i in 0..30 {
            runtime.remember("10001", &format!("q{i}"), &format!("a{i}"));
        }
        let history = runtime.history.lock().unwrap();
        let messages = history.get("10001").unwrap();
        assert_eq!(messages.len(), MAX_HISTORY);
        // The newest exchange survived.
        assert_eq!(messages.last().unwrap().content, "a29");
    }

    #[tokio::test]
    async fn test_history_is_per_actor() {
        let runtime = test_runtime();
        runtime.remember("10001", "q", "a");
        let history = runtime.history.lock().unwrap();
        assert!(history.get("20002").is_none());
    }

    #[test]
    fn test_reply_target_routing() {
        let direct = message("hi");
        assert_eq!(
            reply_target(&direct),
            MessageTarget::User("10001".to_string())
        );

        let mut grouped = message("hi");
        grouped.group_id = "777".to_string();
        assert_eq!(
            reply_target(&grouped),
            MessageTarget::Group("777".to_string())
        );
    }
}
