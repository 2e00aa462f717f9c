//! chainvault - content-addressed, tamper-evident backup engine.
//!
//! Main binary entry point for the command-line interface.

use clap::Parser;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use chainvault::cli::{Cli, Commands, LogFormat};
use chainvault::control::{current_user, resolve_store_root};
use chainvault::policy::Policy;
use chainvault::Result;

fn init_logging(cli: &Cli) {
    let level = if cli.quiet { Level::WARN } else { Level::INFO };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    match cli.log_format {
        LogFormat::Text => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
        LogFormat::Json => {
            tracing_subscriber::fmt().with_env_filter(filter).json().init();
        }
    }
}

fn load_policy(path: &Option<std::path::PathBuf>) -> Result<Option<Policy>> {
    match path {
        Some(p) => Ok(Some(Policy::load(p)?)),
        None => Ok(None),
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let store = resolve_store_root(cli.store.clone())?;
    let policy = load_policy(&cli.policy)?;
    let user = current_user()?;

    match cli.command {
        Commands::Init(args) => chainvault::cli::init::run(args, policy, user),
        Commands::Backup(args) => chainvault::cli::backup::run(args, store, policy, user),
        Commands::List(args) => chainvault::cli::list::run(args, store, policy, user),
        Commands::Verify(args) => chainvault::cli::verify::run(args, store, policy, user),
        Commands::Restore(args) => chainvault::cli::restore::run(args, store, policy, user),
        Commands::AuditVerify(args) => {
            chainvault::cli::audit_verify::run(args, store, policy, user)
        }
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
