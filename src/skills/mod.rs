pub mod builtin;
pub mod registry;

use async_trait::async_trait;

/// Runtime context passed to skill execution.
///
/// Identifies the invoking actor and the chat group (empty for direct
/// messages) so skills can enforce per-actor policy.
pub struct SkillContext {
    /// Chat identity of the invoking actor.
    pub actor_id: String,
    /// Group the invocation came from; empty for direct messages.
    pub group_id: String,
}

/// A skill invocable from the chat surface via its slash command.
///
/// Builtin skills implement this trait; the runtime resolves the slash
/// command to a registered skill and calls `execute()` with the parsed
/// parameters. The returned string is sent back to the actor verbatim.
#[async_trait]
pub trait Skill: Send + Sync {
    /// Unique identifier, lowercase alphanumeric + underscores
    /// (e.g. "run_command").
    fn name(&self) -> &str;

    /// One-line description shown in /help.
    fn description(&self) -> &str;

    /// Usage line shown in /help, e.g. "/cmd <command>".
    fn usage(&self) -> &str;

    /// Executes the skill. Policy rejections (permissions, validation)
    /// are reported in the returned text; `Err` is reserved for faults
    /// worth logging.
    async fn execute(
        &self,
        params: serde_json::Value,
        context: &SkillContext,
    ) -> anyhow::Result<String>;
}

pub use registry::SkillRegistry;
