//! `list` — enumerate snapshots, newest first.

use std::path::PathBuf;

use clap::Args;

use crate::control::ControlPlane;
use crate::policy::Policy;
use crate::Result;

#[derive(Args)]
pub struct ListArgs;

pub fn run(_args: ListArgs, store: PathBuf, policy: Option<Policy>, user: String) -> Result<()> {
    let control = ControlPlane::open(&store, policy, user)?;
    let records = control.list()?;

    if records.is_empty() {
        println!("no snapshots");
        return Ok(());
    }
    for record in records {
        let label = record.label.as_deref().unwrap_or("-");
        println!(
            "{}  seq={}  files={}  label={}",
            record.id, record.sequence, record.total_files, label
        );
    }
    Ok(())
}
