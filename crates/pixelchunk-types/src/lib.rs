//! Shared identifier, color, and wire protocol types for pixelchunk.
//!
//! This crate is the leaf of the workspace: typed IDs, the pixel/hex
//! color codec, and the JSON shapes exchanged over the project routes
//! and the real-time edit channel. It has **no internal pixelchunk
//! dependencies** — other crates build on it.
//!
//! # Key Types
//!
//! |--------------------|---------------------------------------------|
//! | Type               | Purpose                                     |
//! |--------------------|---------------------------------------------|
//! | [`ProjectId`]      | Which project (one versioned store each)    |
//! | [`SnapshotId`]     | Which commit in a project's graph           |
//! | [`ConnectionId`]   | Which live edit-channel connection          |
//! | [`Pixel`]          | One RGBA chunk; hex codec lives here        |
//! | [`ClientCommand`]  | Inbound edit frame (commit vs rebase)       |
//! | [`ServerReply`]    | Outbound edit frame (success vs conflict)   |
//! | [`ConflictReport`] | Where two commit paths collide              |
//! |--------------------|---------------------------------------------|

pub mod color;
pub mod ids;
pub mod protocol;

// Re-export primary types at crate root for convenience.
pub use color::{ColorParseError, Pixel, WHITE};
pub use ids::{ConnectionId, ProjectId, SnapshotId};
pub use protocol::{
    ClientCommand, ConflictReport, DrawState, Project, ProjectState, ProjectVersion,
    ProtocolError, ServerReply, Strategy, UpdateAction,
};

/// Current time as Unix milliseconds. Used by constructors throughout the workspace.
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
