//! `init <store_path>` — create and recover a store.

use std::path::PathBuf;

use clap::Args;

use crate::control::ControlPlane;
use crate::policy::Policy;
use crate::Result;

#[derive(Args)]
pub struct InitArgs {
    /// Directory to initialize as a store.
    pub store_path: PathBuf,
}

pub fn run(args: InitArgs, policy: Option<Policy>, user: String) -> Result<()> {
    // ControlPlane::open already creates the store directory and runs
    // recovery; init's job is just to authorize and audit the attempt.
    let control = ControlPlane::open(&args.store_path, policy, user)?;
    control.init(&args.store_path)?;
    println!("initialized store at {}", args.store_path.display());
    Ok(())
}
