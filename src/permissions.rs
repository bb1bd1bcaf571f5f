//! Permission-node lookups.
//!
//! Skills name the node they require (`cmd.exec`, `codegen.use`, …) and
//! the runtime checks it against the actor's grants before anything else
//! happens — for the command gateway, before validation is even
//! attempted. A denied check is an immediate reject with no side effect.
//!
//! Grants support two wildcard forms: `*` (everything) and `prefix.*`
//! (every node under the prefix).

use std::collections::HashMap;

use crate::config::PermissionsConfig;

pub struct PermissionSet {
    grants: HashMap<String, Vec<String>>,
    default_nodes: Vec<String>,
}

impl PermissionSet {
    pub fn new(config: &PermissionsConfig) -> Self {
        Self {
            grants: config.grants.clone(),
            default_nodes: config.default_nodes.clone(),
        }
    }

    /// True when the actor holds `node`, directly or through a wildcard
    /// grant (actor-specific or default).
    pub fn is_granted(&self, actor_id: &str, node: &str) -> bool {
        let actor_nodes = self.grants.get(actor_id).map(Vec::as_slice).unwrap_or(&[]);
        self.default_nodes
            .iter()
            .chain(actor_nodes)
            .any(|grant| node_matches(grant, node))
    }
}

fn node_matches(grant: &str, node: &str) -> bool {
    if grant == "*" || grant == node {
        return true;
    }
    // "cmd.*" covers "cmd.exec" but not "cmd" itself or "cmdx.exec".
    grant
        .strip_suffix(".*")
        .is_some_and(|prefix| {
            node.strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('.'))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn permissions(grants: &[(&str, &[&str])], defaults: &[&str]) -> PermissionSet {
        PermissionSet {
            grants: grants
                .iter()
                .map(|(actor, nodes)| {
                    (
                        actor.to_string(),
                        nodes.iter().map(|n| n.to_string()).collect(),
                    )
                })
                .collect(),
            default_nodes: defaults.iter().map(|n| n.to_string()).collect(),
        }
    }

    #[test]
    fn test_direct_grant() {
        let perms = permissions(&[("10001", &["cmd.exec"])], &[]);
        assert!(perms.is_granted("10001", "cmd.exec"));
        assert!(!perms.is_granted("10001", "codegen.use"));
    }

    #[test]
    fn test_unknown_actor_denied() {
        let perms = permissions(&[("10001", &["cmd.exec"])], &[]);
        assert!(!perms.is_granted("99999", "cmd.exec"));
    }

    #[test]
    fn test_star_grants_everything() {
        let perms = permissions(&[("admin", &["*"])], &[]);
        assert!(perms.is_granted("admin", "cmd.exec"));
        assert!(perms.is_granted("admin", "anything.at.all"));
    }

    #[test]
    fn test_prefix_wildcard() {
        let perms = permissions(&[("10001", &["cmd.*"])], &[]);
        assert!(perms.is_granted("10001", "cmd.exec"));
        assert!(perms.is_granted("10001", "cmd.confirm"));
        assert!(!perms.is_granted("10001", "cmd"));
        assert!(!perms.is_granted("10001", "cmdx.exec"));
        assert!(!perms.is_granted("10001", "codegen.use"));
    }

    #[test]
    fn test_default_nodes_apply_to_everyone() {
        let perms = permissions(&[], &["search.use"]);
        assert!(perms.is_granted("anyone", "search.use"));
        assert!(!perms.is_granted("anyone", "cmd.exec"));
    }

    #[test]
    fn test_empty_set_denies_all() {
        let perms = permissions(&[], &[]);
        assert!(!perms.is_granted("10001", "cmd.exec"));
    }
}
