//! Command-execution security gateway.
//!
//! Everything behind the `/cmd` chat command lives here: given free-text
//! shell input from an untrusted actor, decide whether it may run at all,
//! flag commands that are dangerous even when permitted, run the command
//! under strict time and output bounds, and guarantee the process never
//! outlives its budget.
//!
//! The pipeline, wired by the `run_command` skill:
//!
//! ```text
//! sanitize → validate → classify → (confirm if dangerous) → execute → truncate
//! ```
//!
//! All policy (whitelist set, compiled blocklist and dangerous patterns,
//! ACLs, limits) is compiled once into a [`CommandGateway`] at startup and
//! shared read-only afterwards. Pattern compilation failures and
//! out-of-bounds limits are fatal configuration errors, never per-request
//! faults.

pub mod classify;
pub mod confirm;
pub mod engine;
pub mod sanitize;
pub mod truncate;
pub mod validate;

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use regex::{Regex, RegexBuilder};

use crate::config::GatewayConfig;

pub use confirm::{Confirmation, ConfirmationGate};
pub use sanitize::sanitize;
pub use truncate::truncate;

/// Execution time budget bounds, in seconds.
const MIN_EXECUTION_TIME: u64 = 1;
const MAX_EXECUTION_TIME: u64 = 300;

/// Output size budget bounds, in bytes.
const MIN_OUTPUT_SIZE: usize = 512;
const MAX_OUTPUT_SIZE: usize = 16384;

/// Exit code reported for engine-side failures (timeout, spawn error,
/// internal fault). Never produced by a normally exiting process.
pub const ENGINE_FAILURE_CODE: i32 = -1;

// ── Request / result types ───────────────────────────────

/// One command invocation from the chat surface. Created per request,
/// discarded after the reply is sent.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    /// Raw command text as typed by the actor (already sanitized).
    pub command: String,
    /// Chat identity of the actor, e.g. `"10001"`.
    pub actor_id: String,
    /// Chat group the request came from; empty for direct messages.
    pub group_id: String,
}

/// Outcome of the validation pipeline. `reason` is always human-readable
/// and non-empty, for rejections and approvals alike.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub allowed: bool,
    pub reason: String,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            allowed: true,
            reason: "ok".to_string(),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

/// Outcome of running a command. Every engine failure path is folded into
/// this value; the engine never surfaces an error to its caller.
#[derive(Debug)]
pub struct ExecutionResult {
    /// Standard output and standard error merged into one buffer.
    pub output: String,
    /// The process's real exit code, or [`ENGINE_FAILURE_CODE`] for
    /// timeouts, spawn failures, and internal faults.
    pub exit_code: i32,
    pub timed_out: bool,
}

// ── Configuration errors ─────────────────────────────────

/// Fatal gateway configuration error, surfaced at startup from
/// [`CommandGateway::new`]. Never produced per-request.
#[derive(Debug)]
pub enum ConfigError {
    /// A blocklist or dangerous-command pattern failed to compile.
    Pattern {
        pattern: String,
        source: regex::Error,
    },
    /// A numeric limit is outside its allowed range.
    Bounds {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Pattern { pattern, source } => {
                write!(f, "invalid gateway pattern '{pattern}': {source}")
            }
            ConfigError::Bounds {
                field,
                value,
                min,
                max,
            } => {
                write!(f, "gateway {field} = {value} is outside [{min}, {max}]")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Pattern { source, .. } => Some(source),
            ConfigError::Bounds { .. } => None,
        }
    }
}

// ── Compiled policy ──────────────────────────────────────

/// A dangerous-command rule: pattern anchored at the start of the command,
/// paired with the warning shown to the actor.
#[derive(Debug)]
pub(crate) struct DangerousRule {
    pub(crate) regex: Regex,
    pub(crate) warning: String,
}

/// The gateway's immutable compiled policy.
///
/// Constructed once in `main` from the `[gateway]` config section and
/// shared by `Arc` with every in-flight request; nothing here is mutated
/// after startup, so concurrent requests need no locking.
#[derive(Debug)]
pub struct CommandGateway {
    pub(crate) enabled: bool,
    pub(crate) require_permission: String,
    pub(crate) allowed_commands: HashSet<String>,
    pub(crate) blocked_patterns: Vec<Regex>,
    pub(crate) dangerous_commands: Vec<DangerousRule>,
    pub(crate) allowed_users: Vec<String>,
    pub(crate) allowed_groups: Vec<String>,
    pub(crate) max_execution_time: Duration,
    pub(crate) max_output_size: usize,
    pub(crate) require_confirmation: bool,
    pub(crate) confirmation_window: Duration,
    pub(crate) log_commands: bool,
}

impl CommandGateway {
    /// Compiles the gateway policy. All regexes are compiled here, once;
    /// a bad pattern or an out-of-bounds limit aborts startup.
    pub fn new(config: &GatewayConfig) -> Result<Self, ConfigError> {
        if !(MIN_EXECUTION_TIME..=MAX_EXECUTION_TIME).contains(&config.max_execution_time) {
            return Err(ConfigError::Bounds {
                field: "max_execution_time",
                value: config.max_execution_time,
                min: MIN_EXECUTION_TIME,
                max: MAX_EXECUTION_TIME,
            });
        }
        if !(MIN_OUTPUT_SIZE..=MAX_OUTPUT_SIZE).contains(&config.max_output_size) {
            return Err(ConfigError::Bounds {
                field: "max_output_size",
                value: config.max_output_size as u64,
                min: MIN_OUTPUT_SIZE as u64,
                max: MAX_OUTPUT_SIZE as u64,
            });
        }

        let blocked_patterns = config
            .blocked_patterns
            .iter()
            .map(|p| compile_pattern(p))
            .collect::<Result<Vec<_>, _>>()?;

        let dangerous_commands = config
            .dangerous_commands
            .iter()
            .map(|rule| {
                Ok(DangerousRule {
                    regex: compile_pattern(&rule.pattern)?,
                    warning: rule.warning.clone(),
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self {
            enabled: config.enabled,
            require_permission: config.require_permission.clone(),
            allowed_commands: config.allowed_commands.iter().cloned().collect(),
            blocked_patterns,
            dangerous_commands,
            allowed_users: config.allowed_users.clone(),
            allowed_groups: config.allowed_groups.clone(),
            max_execution_time: Duration::from_secs(config.max_execution_time),
            max_output_size: config.max_output_size,
            require_confirmation: config.require_confirmation,
            confirmation_window: Duration::from_secs(config.confirmation_window_secs),
            log_commands: config.log_commands,
        })
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Permission node an actor must hold before validation is attempted.
    pub fn required_permission(&self) -> &str {
        &self.require_permission
    }

    pub fn require_confirmation(&self) -> bool {
        self.require_confirmation
    }

    pub fn confirmation_window(&self) -> Duration {
        self.confirmation_window
    }

    pub fn log_commands(&self) -> bool {
        self.log_commands
    }

    pub fn max_output_size(&self) -> usize {
        self.max_output_size
    }

    pub fn max_execution_time(&self) -> Duration {
        self.max_execution_time
    }

    /// Runs a command that already passed [`validate`](Self::validate),
    /// under the configured time budget.
    pub async fn execute(&self, command: &str) -> ExecutionResult {
        engine::execute(command, self.max_execution_time).await
    }
}

/// Case-insensitive compilation shared by blocklist and dangerous rules,
/// mirroring the policy file's intent rather than each call site's.
fn compile_pattern(pattern: &str) -> Result<Regex, ConfigError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| ConfigError::Pattern {
            pattern: pattern.to_string(),
            source,
        })
}

#[cfg(test)]
pub(crate) mod testutil {
    use crate::config::GatewayConfig;

    /// A permissive gateway config for component tests: small whitelist,
    /// no ACLs, short budgets.
    pub(crate) fn test_config() -> GatewayConfig {
        GatewayConfig {
            enabled: true,
            allowed_commands: vec![
                "ls".into(),
                "echo".into(),
                "pwd".into(),
                "rm".into(),
                "sleep".into(),
                "curl".into(),
            ],
            blocked_patterns: vec![r"rm.*-rf.*(/|\*)".into(), r"curl.*\|".into()],
            dangerous_commands: vec![
                crate::config::DangerousCommandConfig {
                    pattern: "^rm".into(),
                    warning: "deletion may cause data loss".into(),
                },
                crate::config::DangerousCommandConfig {
                    pattern: "^reboot".into(),
                    warning: "this restarts the whole host".into(),
                },
            ],
            ..GatewayConfig::default()
        }
    }
}
