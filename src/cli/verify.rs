//! `verify <snapshot_id>` — check a snapshot's integrity and chain position.

use std::path::PathBuf;

use clap::Args;

use crate::control::ControlPlane;
use crate::policy::Policy;
use crate::snapshot::VerifyOutcome;
use crate::Result;

#[derive(Args)]
pub struct VerifyArgs {
    pub snapshot_id: String,
}

pub fn run(args: VerifyArgs, store: PathBuf, policy: Option<Policy>, user: String) -> Result<()> {
    let control = ControlPlane::open(&store, policy, user)?;
    match control.verify(&args.snapshot_id)? {
        VerifyOutcome::Ok => {
            println!("OK {}", args.snapshot_id);
            Ok(())
        }
        VerifyOutcome::ManifestCorrupt(reason) => {
            println!("MANIFEST CORRUPT {}: {reason}", args.snapshot_id);
            std::process::exit(1);
        }
        VerifyOutcome::ChunkMissing(hash) => {
            println!("CHUNK MISSING {}: {hash}", args.snapshot_id);
            std::process::exit(1);
        }
        VerifyOutcome::RollbackDetected(reason) => {
            println!("ROLLBACK DETECTED {}: {reason}", args.snapshot_id);
            std::process::exit(1);
        }
    }
}
