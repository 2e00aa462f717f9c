//! `audit-verify` — check the audit log's hash chain.

use std::path::PathBuf;

use clap::Args;

use crate::audit::VerifyOutcome;
use crate::control::ControlPlane;
use crate::policy::Policy;
use crate::Result;

#[derive(Args)]
pub struct AuditVerifyArgs;

pub fn run(
    _args: AuditVerifyArgs,
    store: PathBuf,
    policy: Option<Policy>,
    user: String,
) -> Result<()> {
    let control = ControlPlane::open(&store, policy, user)?;
    match control.audit_verify()? {
        VerifyOutcome::Ok => {
            println!("AUDIT OK");
            Ok(())
        }
        VerifyOutcome::Corrupted { line, reason } => {
            println!("AUDIT CORRUPTED line {line}: {reason}");
            std::process::exit(1);
        }
    }
}
