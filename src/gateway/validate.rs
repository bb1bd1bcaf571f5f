//! Command validation: ACLs, whitelist, blocklist.
//!
//! Checks run in a fixed order and the first failure short-circuits the
//! rest. The whitelist gates which programs may run at all (a cheap,
//! name-only check); the blocklist is defense-in-depth against dangerous
//! argument and pipeline combinations on otherwise-whitelisted binaries
//! (`curl ... | sh`), which the whitelist alone cannot see.
//!
//! Validation never executes anything and always returns a result.

use super::{CommandGateway, ValidationResult};

impl CommandGateway {
    /// Validates a sanitized command for the given actor and group.
    ///
    /// Order: user ACL → group ACL → tokenization → whitelist → blocklist.
    /// An empty ACL list means unrestricted.
    pub fn validate(&self, command: &str, actor_id: &str, group_id: &str) -> ValidationResult {
        if !self.allowed_users.is_empty() && !self.allowed_users.iter().any(|u| u == actor_id) {
            return ValidationResult::rejected(format!(
                "user '{actor_id}' is not on the allowed user list"
            ));
        }

        if !self.allowed_groups.is_empty() && !self.allowed_groups.iter().any(|g| g == group_id) {
            return ValidationResult::rejected("this group is not on the allowed group list");
        }

        let base = match base_command(command) {
            Some(base) => base,
            None => return ValidationResult::rejected("cannot parse command"),
        };

        if !self.allowed_commands.contains(&base) {
            return ValidationResult::rejected(format!("command '{base}' is not whitelisted"));
        }

        // The whole raw string is matched, not just the base command, so
        // argument and pipeline abuse is caught on whitelisted binaries.
        for pattern in &self.blocked_patterns {
            if pattern.is_match(command) {
                return ValidationResult::rejected(format!(
                    "command matches blocked pattern: {}",
                    pattern.as_str()
                ));
            }
        }

        ValidationResult::ok()
    }
}

/// Extracts the base command: the first shell token with any path prefix
/// stripped (`/bin/ls` → `ls`). Returns `None` for unbalanced quoting or
/// empty input.
fn base_command(command: &str) -> Option<String> {
    let words = shell_words::split(command).ok()?;
    let first = words.into_iter().next()?;
    let base = first.rsplit('/').next().unwrap_or(&first);
    Some(base.to_string())
}
