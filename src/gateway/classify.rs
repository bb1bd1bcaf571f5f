//! Dangerous-command classifier.
//!
//! Independent of the allow/deny decision and evaluated after validation
//! succeeds: a command can be perfectly permitted yet still warrant an
//! explicit confirmation (`rm`, `reboot`, `systemctl` …). Rules are
//! checked in configuration order and the first match wins.

use super::CommandGateway;

impl CommandGateway {
    /// Returns the warning of the first dangerous rule matching the
    /// command, or `None` when the command is not flagged.
    ///
    /// Each pattern is anchored to the start of the command and matched
    /// case-insensitively, so `^` in the policy file is optional.
    pub fn classify(&self, command: &str) -> Option<&str> {
        self.dangerous_commands
            .iter()
            .find(|rule| matches_at_start(&rule.regex, command))
            .map(|rule| rule.warning.as_str())
    }
}

/// True when the pattern matches at position 0. The leftmost-first match
/// guarantee makes this equivalent to anchoring: if any match starts at
/// 0, the leftmost match does too.
fn matches_at_start(regex: &regex::Regex, command: &str) -> bool {
    regex.find(command).is_some_and(|m| m.start() == 0)
}
