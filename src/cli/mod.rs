//! Command-line surface for chainvault.
//!
//! Thin adapter: each subcommand module parses its arguments, resolves a
//! [`crate::control::ControlPlane`], and formats whatever the control plane
//! returns. No business logic lives here.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod audit_verify;
pub mod backup;
pub mod init;
pub mod list;
pub mod restore;
pub mod verify;

/// chainvault - content-addressed, tamper-evident backup engine
#[derive(Parser)]
#[command(name = "chainvault")]
#[command(about = "Content-addressed, deduplicating backup engine with Merkle-attested, hash-chained snapshots")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Store root directory.
    #[arg(long, short = 's', global = true, env = "CHAINVAULT_STORE")]
    pub store: Option<PathBuf>,

    /// Role-policy TOML file; falls back to the built-in default policy.
    #[arg(long, global = true, env = "CHAINVAULT_POLICY")]
    pub policy: Option<PathBuf>,

    /// Reduce log verbosity to warnings and errors only.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Log output format.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::ValueEnum, Clone, Debug)]
pub enum LogFormat {
    Text,
    Json,
}

/// The six commands specified for this engine (spec §6). No other
/// subcommands are exposed.
#[derive(Subcommand)]
pub enum Commands {
    /// Create and recover a store.
    Init(init::InitArgs),
    /// Create a snapshot of a directory tree.
    Backup(backup::BackupArgs),
    /// Enumerate snapshots, newest first.
    List(list::ListArgs),
    /// Verify a snapshot's integrity and chain position.
    Verify(verify::VerifyArgs),
    /// Restore a snapshot into a target directory.
    Restore(restore::RestoreArgs),
    /// Verify the audit log's hash chain.
    AuditVerify(audit_verify::AuditVerifyArgs),
}
