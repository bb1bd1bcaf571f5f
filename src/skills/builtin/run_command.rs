//! Builtin skill: gated shell command execution (`/cmd`).
//!
//! The orchestrator for the command gateway. Each request walks the
//! pipeline in order — permission check, sanitize, validate, classify,
//! confirm if dangerous, execute, truncate — and every early exit
//! produces a final, human-readable reply. Validation never executes
//! anything; execution only ever sees a command that passed validation.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::gateway::{
    sanitize, truncate, CommandGateway, CommandRequest, Confirmation, ConfirmationGate,
};
use crate::permissions::PermissionSet;
use crate::skills::{Skill, SkillContext};

pub struct RunCommandSkill {
    gateway: Arc<CommandGateway>,
    permissions: Arc<PermissionSet>,
    confirmations: ConfirmationGate,
}

impl RunCommandSkill {
    pub fn new(gateway: Arc<CommandGateway>, permissions: Arc<PermissionSet>) -> Self {
        let confirmations = ConfirmationGate::new(gateway.confirmation_window());
        Self {
            gateway,
            permissions,
            confirmations,
        }
    }

    /// Formats the final reply from the truncated execution output.
    fn format_report(output: &str, exit_code: i32) -> String {
        let body = if output.is_empty() {
            "(no output)".to_string()
        } else {
            format!("```\n{output}\n```")
        };

        if exit_code == 0 {
            format!("✅ command succeeded (exit code: 0)\n{body}")
        } else {
            format!("❌ command failed (exit code: {exit_code})\n{body}")
        }
    }
}

#[async_trait]
impl Skill for RunCommandSkill {
    fn name(&self) -> &str {
        "run_command"
    }

    fn description(&self) -> &str {
        "Run a whitelisted shell command on the host, under time and output limits"
    }

    fn usage(&self) -> &str {
        "/cmd <command>"
    }

    async fn execute(&self, params: Value, context: &SkillContext) -> anyhow::Result<String> {
        let raw = params
            .get("command")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("Missing 'command' parameter"))?;

        if !self.gateway.enabled() {
            return Ok("Command execution is disabled.".to_string());
        }

        // Permission gate comes before validation; a denied actor never
        // reaches the parser.
        let node = self.gateway.required_permission();
        if !self.permissions.is_granted(&context.actor_id, node) {
            return Ok(format!(
                "You lack the '{node}' permission required to run commands."
            ));
        }

        // The per-invocation request value; dropped once the reply is built.
        let request = CommandRequest {
            command: sanitize(raw),
            actor_id: context.actor_id.clone(),
            group_id: context.group_id.clone(),
        };
        if request.command.is_empty() {
            return Ok(format!(
                "Provide a command to run, e.g. {} ls -la",
                self.usage().split(' ').next().unwrap_or("/cmd")
            ));
        }

        let verdict = self
            .gateway
            .validate(&request.command, &request.actor_id, &request.group_id);
        if !verdict.allowed {
            return Ok(format!("Command rejected: {}", verdict.reason));
        }

        if let Some(warning) = self.gateway.classify(&request.command) {
            if self.gateway.require_confirmation() {
                match self.confirmations.submit(&request.actor_id, &request.command) {
                    Confirmation::Armed => {
                        return Ok(format!(
                            "⚠️ {warning}\nResend the exact same command within {}s to confirm:\n{}",
                            self.gateway.confirmation_window().as_secs(),
                            request.command
                        ));
                    }
                    Confirmation::Confirmed => {
                        debug!(actor = %request.actor_id, "dangerous command confirmed");
                    }
                }
            }
        }

        let request_id = Uuid::new_v4();
        if self.gateway.log_commands() {
            info!(%request_id, actor = %request.actor_id, command = %request.command, "executing gated command");
        }

        let result = self.gateway.execute(&request.command).await;
        let (output, was_truncated) = truncate(&result.output, self.gateway.max_output_size());
        if was_truncated {
            debug!(%request_id, "command output truncated");
        }

        Ok(Self::format_report(&output, result.exit_code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GatewayConfig, PermissionsConfig};
    use crate::gateway::testutil::test_config;
    use crate::skills::testutil::test_context;
    use serde_json::json;

    fn permissions_with(actor: &str, nodes: &[&str]) -> Arc<PermissionSet> {
        let mut config = PermissionsConfig::default();
        config.grants.insert(
            actor.to_string(),
            nodes.iter().map(|n| n.to_string()).collect(),
        );
        Arc::new(PermissionSet::new(&config))
    }

    fn skill_with(config: GatewayConfig) -> RunCommandSkill {
        RunCommandSkill::new(
            Arc::new(CommandGateway::new(&config).unwrap()),
            permissions_with("10001", &["cmd.exec"]),
        )
    }

    fn skill() -> RunCommandSkill {
        skill_with(test_config())
    }

    #[tokio::test]
    async fn test_executes_whitelisted_command() {
        let reply = skill()
            .execute(json!({"command": "echo hello"}), &test_context("10001"))
            .await
            .unwrap();
        assert!(reply.contains("✅"));
        assert!(reply.contains("exit code: 0"));
        assert!(reply.contains("hello"));
    }

    #[tokio::test]
    async fn test_disabled_gateway_short_circuits() {
        let mut config = test_config();
        config.enabled = false;
        let reply = skill_with(config)
            .execute(json!({"command": "echo hi"}), &test_context("10001"))
            .await
            .unwrap();
        assert_eq!(reply, "Command execution is disabled.");
    }

    #[tokio::test]
    async fn test_permission_checked_before_validation() {
        let reply = skill()
            .execute(json!({"command": "echo hi"}), &test_context("99999"))
            .await
            .unwrap();
        assert!(reply.contains("'cmd.exec'"));
    }

    #[tokio::test]
    async fn test_rejection_reports_reason() {
        let reply = skill()
            .execute(json!({"command": "cat /etc/hosts"}), &test_context("10001"))
            .await
            .unwrap();
        assert!(reply.starts_with("Command rejected:"));
        assert!(reply.contains("'cat'"));
    }

    #[tokio::test]
    async fn test_blocked_pattern_reported() {
        let reply = skill()
            .execute(json!({"command": "rm -rf /"}), &test_context("10001"))
            .await
            .unwrap();
        assert!(reply.contains("blocked pattern"));
    }

    #[tokio::test]
    async fn test_dangerous_command_warns_then_runs_on_resubmit() {
        let skill = skill();
        let context = test_context("10001");
        let params = json!({"command": "rm /tmp/opsgate-does-not-exist"});

        let first = skill.execute(params.clone(), &context).await.unwrap();
        assert!(first.contains("⚠️"));
        assert!(first.contains("deletion may cause data loss"));

        // Identical resubmission consumes the token and executes; rm on a
        // missing file fails, which is fine — it ran.
        let second = skill.execute(params, &context).await.unwrap();
        assert!(!second.contains("⚠️"));
        assert!(second.contains("exit code:"));
    }

    #[tokio::test]
    async fn test_dangerous_command_runs_directly_without_confirmation() {
        let mut config = test_config();
        config.require_confirmation = false;
        let reply = skill_with(config)
            .execute(
                json!({"command": "rm /tmp/opsgate-does-not-exist"}),
                &test_context("10001"),
            )
            .await
            .unwrap();
        assert!(!reply.contains("⚠️"));
        assert!(reply.contains("exit code:"));
    }

    #[tokio::test]
    async fn test_command_text_is_sanitized_before_validation() {
        let reply = skill()
            .execute(
                json!({"command": "  echo\u{0007}   spaced   out  "}),
                &test_context("10001"),
            )
            .await
            .unwrap();
        assert!(reply.contains("✅"));
        assert!(reply.contains("spaced out"));
    }

    #[tokio::test]
    async fn test_empty_command_prompts_usage() {
        let reply = skill()
            .execute(json!({"command": "   "}), &test_context("10001"))
            .await
            .unwrap();
        assert!(reply.contains("/cmd"));
    }

    #[tokio::test]
    async fn test_missing_parameter_is_an_error() {
        let result = skill().execute(json!({}), &test_context("10001")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_output_is_truncated_to_budget() {
        let mut config = test_config();
        config.max_output_size = 512;
        let reply = skill_with(config)
            .execute(
                // ~2000 bytes of output against a 512-byte budget.
                json!({"command": "echo $(printf 'x%.0s' $(seq 1 2000))"}),
                &test_context("10001"),
            )
            .await
            .unwrap();
        assert!(reply.contains("output truncated"));
    }

    #[tokio::test]
    async fn test_failed_command_reports_exit_code() {
        let reply = skill()
            .execute(json!({"command": "ls /nonexistent-dir-xyz"}), &test_context("10001"))
            .await
            .unwrap();
        assert!(reply.contains("❌"));
        assert!(reply.contains("stderr"));
    }

    #[test]
    fn test_format_report_no_output() {
        let report = RunCommandSkill::format_report("", 0);
        assert!(report.contains("(no output)"));
    }
}
