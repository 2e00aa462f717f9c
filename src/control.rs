//! Control plane: binds policy, WAL, snapshot manager, and audit log into
//! the per-command sequence of spec §4.8.

use std::path::{Path, PathBuf};

use tracing::{info, instrument};

use crate::audit::{AuditLog, AuditStatus};
use crate::lock::StoreLock;
use crate::policy::Policy;
use crate::snapshot::{SnapshotManager, SnapshotRecord, VerifyOutcome};
use crate::wal::Wal;
use crate::{Error, Result};

/// Environment variable consulted before falling back to the OS user, the
/// same elevated-user override convention `sudo` itself uses.
const USER_OVERRIDE_VAR: &str = "CHAINVAULT_USER";

/// Determine the invoking identity: prefer [`USER_OVERRIDE_VAR`], then the
/// platform's ambient user environment variable.
pub fn current_user() -> Result<String> {
    if let Ok(user) = std::env::var(USER_OVERRIDE_VAR) {
        if !user.is_empty() {
            return Ok(user);
        }
    }
    for var in ["SUDO_USER", "USER", "USERNAME"] {
        if let Ok(user) = std::env::var(var) {
            if !user.is_empty() {
                return Ok(user);
            }
        }
    }
    Err(Error::ConfigInvalid {
        reason: "could not determine invoking OS user".to_string(),
    })
}

/// Opens a store, holding its exclusive lock for the process's lifetime,
/// and dispatches commands through the authorize -> journal -> do ->
/// journal -> audit sequence.
pub struct ControlPlane {
    _lock: StoreLock,
    snapshots: SnapshotManager,
    audit: AuditLog,
    policy: Policy,
    user: String,
}

impl ControlPlane {
    /// Open `store_root`, acquire its exclusive lock, run WAL recovery, and
    /// load `policy` (or the built-in default if `None`).
    #[instrument(skip(policy))]
    pub fn open(store_root: &Path, policy: Option<Policy>, user: String) -> Result<Self> {
        std::fs::create_dir_all(store_root)?;
        let lock = StoreLock::acquire(store_root)?;
        let wal = Wal::open(store_root.join("journal.wal"))?;
        let snapshots = SnapshotManager::open(store_root, wal)?;
        snapshots.recover()?;
        let audit = AuditLog::open(store_root.join("audit.log"))?;
        let policy = policy.unwrap_or_else(Policy::default_policy);

        Ok(Self {
            _lock: lock,
            snapshots,
            audit,
            policy,
            user,
        })
    }

    fn authorize(&self, command: &str, args: &[String]) -> Result<()> {
        if self.policy.check(command, &self.user) {
            Ok(())
        } else {
            self.audit
                .append(&self.user, command, args, AuditStatus::Deny, None)?;
            Err(Error::PolicyDenied {
                user: self.user.clone(),
                command: command.to_string(),
            })
        }
    }

    fn record_outcome<T>(
        &self,
        command: &str,
        args: &[String],
        result: Result<T>,
    ) -> Result<T> {
        match result {
            Ok(value) => {
                self.audit
                    .append(&self.user, command, args, AuditStatus::Ok, None)?;
                Ok(value)
            }
            Err(e) => {
                self.audit.append(
                    &self.user,
                    command,
                    args,
                    AuditStatus::Fail,
                    Some(&e.to_string()),
                )?;
                Err(e)
            }
        }
    }

    /// `init <store_path>`: the store is already created and recovered by
    /// `open`; this only needs to authorize and audit the command itself.
    pub fn init(&self, store_path: &Path) -> Result<()> {
        let args = vec![store_path.display().to_string()];
        self.authorize("init", &args)?;
        self.record_outcome("init", &args, Ok(()))
    }

    /// `backup <source_path> [--label <s>]`.
    pub fn backup(&self, source_path: &Path, label: Option<String>) -> Result<SnapshotRecord> {
        let mut args = vec![source_path.display().to_string()];
        if let Some(l) = &label {
            args.push(l.clone());
        }
        self.authorize("backup", &args)?;
        let result = self.snapshots.create_snapshot(source_path, label);
        self.record_outcome("backup", &args, result)
    }

    /// `list`: enumerate snapshots, newest first.
    pub fn list(&self) -> Result<Vec<SnapshotRecord>> {
        let args = vec![];
        self.authorize("list", &args)?;
        let result = self.snapshots.list();
        self.record_outcome("list", &args, result)
    }

    /// `verify <snapshot_id>`: non-mutating, returns a structured outcome.
    pub fn verify(&self, snapshot_id: &str) -> Result<VerifyOutcome> {
        let args = vec![snapshot_id.to_string()];
        self.authorize("verify", &args)?;
        let result = self.snapshots.verify(snapshot_id);
        self.record_outcome("verify", &args, result)
    }

    /// `restore <snapshot_id> <target_path>`. `force` skips the non-empty
    /// target confirmation (spec §6).
    pub fn restore(&self, snapshot_id: &str, target: &Path, force: bool) -> Result<()> {
        let args = vec![snapshot_id.to_string(), target.display().to_string()];
        self.authorize("restore", &args)?;
        let result = self.snapshots.restore(snapshot_id, target, force);
        self.record_outcome("restore", &args, result)
    }

    /// `audit-verify`.
    pub fn audit_verify(&self) -> Result<crate::audit::VerifyOutcome> {
        let args = vec![];
        self.authorize("audit-verify", &args)?;
        let result = self.audit.verify();
        self.record_outcome("audit-verify", &args, result)
    }
}

/// Resolve the store root in the teacher's own precedence order: an
/// explicit CLI flag, then `CHAINVAULT_STORE`, then `~/.chainvault`.
pub fn resolve_store_root(cli_flag: Option<PathBuf>) -> Result<PathBuf> {
    cli_flag
        .or_else(|| std::env::var("CHAINVAULT_STORE").ok().map(PathBuf::from))
        .or_else(|| dirs::home_dir().map(|home| home.join(".chainvault")))
        .ok_or_else(|| Error::ConfigInvalid {
            reason: "could not determine store root: pass --store, set CHAINVAULT_STORE, or ensure $HOME is set".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn denied_command_is_audited_before_failing() {
        let store_dir = TempDir::new().unwrap();
        let control = ControlPlane::open(
            store_dir.path(),
            Some(Policy::default_policy()),
            "nobody".to_string(),
        )
        .unwrap();

        let err = control.backup(Path::new("/tmp"), None).unwrap_err();
        assert!(matches!(err, Error::PolicyDenied { .. }));

        let entries = control.audit.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, "DENY");
    }

    #[test]
    fn successful_backup_is_audited_ok() {
        let store_dir = TempDir::new().unwrap();
        let source_dir = TempDir::new().unwrap();
        std::fs::write(source_dir.path().join("a.txt"), b"hi").unwrap();
        let control = ControlPlane::open(
            store_dir.path(),
            Some(Policy::default_policy()),
            "root".to_string(),
        )
        .unwrap();

        control.backup(source_dir.path(), None).unwrap();

        let entries = control.audit.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, "OK");
    }

    #[test]
    fn opening_the_same_store_twice_fails_with_lock_held() {
        let store_dir = TempDir::new().unwrap();
        let first = ControlPlane::open(store_dir.path(), None, "root".to_string()).unwrap();
        let second = ControlPlane::open(store_dir.path(), None, "root".to_string());
        assert!(matches!(second, Err(Error::LockHeld { .. })));
        drop(first);
    }

    #[test]
    fn current_user_prefers_override_variable() {
        std::env::set_var(USER_OVERRIDE_VAR, "alice");
        assert_eq!(current_user().unwrap(), "alice");
        std::env::remove_var(USER_OVERRIDE_VAR);
    }
}
