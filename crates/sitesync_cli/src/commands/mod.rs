//! CLI command implementations.

pub mod clear_queue;
pub mod compact;
pub mod conflicts;
pub mod inspect;
pub mod queue;
pub mod verify;

use clap::ValueEnum;
use sitesync_codec::CodecError;
use sitesync_core::{CoreError, DurableStore, StoreConfig};
use sitesync_storage::StorageError;
use sitesync_sync_engine::SyncError;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors reported by the commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// The store file does not exist.
    #[error("no store found at {}", .0.display())]
    NotFound(PathBuf),

    /// Store error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Sync engine error.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Backend error.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A stored value could not be converted.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// JSON output failed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Writing output failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The log scan found problems.
    #[error("verification failed: {0}")]
    VerificationFailed(String),

    /// A destructive command ran without confirmation.
    #[error("refusing to {0} without --yes")]
    NotConfirmed(&'static str),
}

/// Result type for commands.
pub type CliResult<T> = Result<T, CliError>;

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable text.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Opens an existing store file. Recovery of a torn tail happens here.
pub fn open_store(path: &Path) -> CliResult<DurableStore> {
    if !path.exists() {
        return Err(CliError::NotFound(path.to_path_buf()));
    }
    Ok(DurableStore::open_file(path, StoreConfig::default())?)
}

/// Formats a byte count for humans.
pub fn format_size(bytes: u64) -> String {
    #[allow(clippy::cast_precision_loss)]
    let b = bytes as f64;
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", b / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", b / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", b / (1024.0 * 1024.0 * 1024.0))
    }
}
