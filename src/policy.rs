//! Role-based command authorization (spec §4.7).

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::{Error, Result};

/// `users: user -> role` and `roles: role -> set<command>`, loaded from a
/// TOML policy file.
#[derive(Debug, Clone, Deserialize)]
pub struct Policy {
    users: HashMap<String, String>,
    roles: HashMap<String, HashSet<String>>,
}

impl Policy {
    /// Load and validate a policy file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let policy: Policy = toml::from_str(&text)?;
        policy.validate()?;
        Ok(policy)
    }

    /// The built-in default policy: `root`/`admin` map to an `admin` role
    /// with every command; an `operator` role covers the mutating and
    /// read-only commands but not raw audit inspection beyond
    /// `audit-verify`; an `auditor` role is read-only.
    pub fn default_policy() -> Self {
        let mut users = HashMap::new();
        users.insert("root".to_string(), "admin".to_string());
        users.insert("admin".to_string(), "admin".to_string());

        let admin_commands: HashSet<String> = [
            "init",
            "backup",
            "list",
            "verify",
            "restore",
            "audit-verify",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let operator_commands: HashSet<String> = [
            "backup",
            "list",
            "verify",
            "restore",
            "audit-verify",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let auditor_commands: HashSet<String> = ["list", "verify", "audit-verify"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let mut roles = HashMap::new();
        roles.insert("admin".to_string(), admin_commands);
        roles.insert("operator".to_string(), operator_commands);
        roles.insert("auditor".to_string(), auditor_commands);

        Self { users, roles }
    }

    fn validate(&self) -> Result<()> {
        for required in ["admin", "operator", "auditor"] {
            if !self.roles.contains_key(required) {
                return Err(Error::ConfigInvalid {
                    reason: format!("policy is missing required role '{required}'"),
                });
            }
        }
        for (user, role) in &self.users {
            if !self.roles.contains_key(role) {
                return Err(Error::ConfigInvalid {
                    reason: format!("user '{user}' references undefined role '{role}'"),
                });
            }
        }
        Ok(())
    }

    /// True iff `user` is known and their role permits `command`.
    pub fn check(&self, command: &str, user: &str) -> bool {
        self.users
            .get(user)
            .and_then(|role| self.roles.get(role))
            .is_some_and(|commands| commands.contains(command))
    }

    /// `check`, raising `PolicyDenied` on failure. Callers must still audit
    /// the denial themselves (spec §4.7: the audit entry must be written
    /// before the caller observes failure).
    pub fn enforce(&self, command: &str, user: &str) -> Result<()> {
        if self.check(command, user) {
            Ok(())
        } else {
            Err(Error::PolicyDenied {
                user: user.to_string(),
                command: command.to_string(),
            })
        }
    }

    /// Every command `user`'s role permits, for introspection/help output.
    pub fn allowed_commands(&self, user: &str) -> Vec<String> {
        let mut commands: Vec<String> = self
            .users
            .get(user)
            .and_then(|role| self.roles.get(role))
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        commands.sort();
        commands
    }
}
