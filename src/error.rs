//! Error types for chainvault.

use thiserror::Error;

/// Main error type for chainvault operations.
///
/// Variants follow the error taxonomy a command's exit path needs to
/// distinguish (policy vs. integrity vs. plumbing), not the internal module
/// that happened to raise them.
#[derive(Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("toml parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("toml serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("user '{user}' is not allowed to run '{command}'")]
    PolicyDenied { user: String, command: String },

    #[error("snapshot not found: {id}")]
    SnapshotNotFound { id: String },

    #[error("manifest corrupt: {reason}")]
    ManifestCorrupt { reason: String },

    #[error("chunk missing or corrupted: {hash}")]
    ChunkMissing { hash: String },

    #[error("rollback detected: {reason}")]
    RollbackDetected { reason: String },

    #[error("audit log corrupt at line {line}: {reason}")]
    AuditCorrupt { line: usize, reason: String },

    #[error("store lock held by another process: {path}")]
    LockHeld { path: String },

    #[error("invalid configuration: {reason}")]
    ConfigInvalid { reason: String },

    #[error("restore target '{path}' is not empty; pass --yes to restore into it anyway")]
    RestoreTargetNotEmpty { path: String },

    #[error("write-ahead log corrupt: {reason}")]
    WalCorrupt { reason: String },

    #[error("operation cancelled: {reason}")]
    Cancelled { reason: String },
}

/// Result type alias for chainvault operations.
pub type Result<T> = std::result::Result<T, Error>;