//! Error types for harness infrastructure failures.
//!
//! Only infrastructure-level problems surface as [`HarnessError`]: a
//! process that could not be launched, a filesystem operation that failed,
//! a configuration that cannot be executed. A compiler that exits non-zero
//! or a test that fails is *data*, recorded in outcomes and reports, and
//! never travels through this type.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("failed to launch `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("workspace operation failed at {}: {source}", path.display())]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("corpus error: {0}")]
    Corpus(String),

    #[error("manifest error: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for harness operations
pub type Result<T> = std::result::Result<T, HarnessError>;
