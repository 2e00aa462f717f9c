//! `backup <source_path> [--label <s>]` — create a snapshot.

use std::path::PathBuf;

use clap::Args;

use crate::control::ControlPlane;
use crate::policy::Policy;
use crate::Result;

#[derive(Args)]
pub struct BackupArgs {
    /// Source directory to back up.
    pub source_path: PathBuf,

    /// Human-readable label for this snapshot.
    #[arg(long)]
    pub label: Option<String>,
}

pub fn run(args: BackupArgs, store: PathBuf, policy: Option<Policy>, user: String) -> Result<()> {
    let control = ControlPlane::open(&store, policy, user)?;
    let record = control.backup(&args.source_path, args.label)?;

    println!("snapshot created: {}", record.id);
    println!("  merkle_root:  {}", record.merkle_root);
    println!("  chain_hash:   {}", record.chain_hash);
    println!("  sequence:     {}", record.sequence);
    println!("  total_files:  {}", record.total_files);
    println!("  total_chunks: {}", record.total_chunks);
    Ok(())
}
