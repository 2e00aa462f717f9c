//! `restore <snapshot_id> <target_path>` — restore a snapshot.

use std::path::PathBuf;

use clap::Args;

use crate::control::ControlPlane;
use crate::policy::Policy;
use crate::Result;

#[derive(Args)]
pub struct RestoreArgs {
    pub snapshot_id: String,
    pub target_path: PathBuf,

    /// Skip the non-empty-target confirmation prompt.
    #[arg(long)]
    pub yes: bool,
}

pub fn run(args: RestoreArgs, store: PathBuf, policy: Option<Policy>, user: String) -> Result<()> {
    let control = ControlPlane::open(&store, policy, user)?;
    control.restore(&args.snapshot_id, &args.target_path, args.yes)?;
    println!(
        "restored {} into {}",
        args.snapshot_id,
        args.target_path.display()
    );
    Ok(())
}
