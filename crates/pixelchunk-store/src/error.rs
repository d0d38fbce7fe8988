//! Error types for store operations.
//!
//! Commit conflicts are deliberately *not* here — a lost commit race is
//! the expected steady state of concurrent editing and is modeled as the
//! second case of [`crate::CommitOutcome`], never as an error.

use thiserror::Error;

use pixelchunk_types::{ColorParseError, ProjectId, SnapshotId};

/// Errors that can occur during store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No project exists at this identifier.
    #[error("project not found: {0}")]
    ProjectNotFound(ProjectId),

    /// No snapshot exists at this identifier in the project's graph.
    #[error("snapshot not found: {0}")]
    SnapshotNotFound(SnapshotId),

    /// A rejected edit batch or bad project parameters. The session
    /// survives; nothing was staged.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Backend unavailable or provisioning failure. Surfaced to the
    /// caller; never silently retried here.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Validation failures that reject a whole batch with no partial application.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Chunk index outside `[0, rows*cols)`.
    #[error("chunk index {index} out of range for array of {len} chunks")]
    IndexOutOfRange { index: u32, len: u32 },

    /// Malformed color string.
    #[error(transparent)]
    Color(#[from] ColorParseError),

    /// Grid dimensions must be positive.
    #[error("grid dimensions must be positive, got {rows}x{cols}")]
    BadDimensions { rows: u32, cols: u32 },

    /// Grid whose chunk count would overflow the u32 index space.
    #[error("grid of {rows}x{cols} chunks exceeds the addressable limit")]
    TooManyChunks { rows: u32, cols: u32 },
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
