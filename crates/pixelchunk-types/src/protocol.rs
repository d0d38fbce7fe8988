//! Wire protocol for the project routes and the real-time edit channel.
//!
//! All messages are JSON text frames. Inbound edit-channel commands are
//! discriminated up front by field presence — `changes` means a
//! stage-and-commit, `strategy` means a resolve-and-retry — rather than
//! parse-and-fallback.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ProjectId, SnapshotId};

/// A single staged pixel write: chunk index plus new color.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateAction {
    /// Flat index into the pixel array. Must be within `[0, rows*cols)`.
    pub index: u32,
    /// Hex color string, `#rrggbbaa` or `#rrggbb`.
    pub color: String,
}

/// Conflict-resolution policy carried by a rebase command.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// The session's staged value wins for every conflicting chunk.
    Ours,
    /// The already-committed value wins; conflicting staged writes drop.
    Theirs,
}

/// Inbound edit-channel commands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientCommand {
    /// Stage a batch of pixel writes and attempt a commit.
    Commit {
        message: String,
        changes: Vec<UpdateAction>,
    },
    /// Resolve the current divergence with a policy and retry the commit.
    Rebase { message: String, strategy: Strategy },
}

/// Malformed or unrecognized inbound frames.
///
/// Rejecting a frame never closes the connection.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame has neither 'changes' nor 'strategy'")]
    UnknownShape,
}

#[derive(Deserialize)]
struct CommitFrame {
    message: String,
    changes: Vec<UpdateAction>,
}

#[derive(Deserialize)]
struct RebaseFrame {
    message: String,
    strategy: Strategy,
}

impl ClientCommand {
    /// Decode a text frame, discriminating on field presence.
    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        let value: serde_json::Value = serde_json::from_str(frame)?;

        if value.get("changes").is_some() {
            let f: CommitFrame = serde_json::from_value(value)?;
            Ok(ClientCommand::Commit { message: f.message, changes: f.changes })
        } else if value.get("strategy").is_some() {
            let f: RebaseFrame = serde_json::from_value(value)?;
            Ok(ClientCommand::Rebase { message: f.message, strategy: f.strategy })
        } else {
            Err(ProtocolError::UnknownShape)
        }
    }
}

/// A failed commit attempt: who we were, who beat us, and where we collide.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConflictReport {
    /// The session's base snapshot at the time of the attempt.
    pub source_snapshot: SnapshotId,
    /// The branch tip the attempt failed against.
    pub failed_at_snapshot: SnapshotId,
    /// Chunk indices written on both sides, ascending.
    pub conflicted_chunks: Vec<u32>,
}

/// Outbound edit-channel replies.
///
/// Serialized untagged: the client discriminates by field presence, the
/// mirror of how inbound frames are decoded.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ServerReply {
    /// Commit landed; the branch tip is now this snapshot.
    Success { latest_snapshot: SnapshotId },
    /// Commit lost the race; resolve and retry.
    Conflicts(ConflictReport),
    /// The frame was rejected (validation or protocol); session survives.
    Error { error: String },
}

/// Project metadata returned by the create route.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Project {
    pub id: ProjectId,
    /// Creation time, unix millis.
    pub date_created: i64,
}

/// One visible entry in a project's version history.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectVersion {
    pub id: SnapshotId,
    /// Commit time, unix millis.
    pub date: i64,
    pub message: String,
}

/// The pixel array at some version, shaped for display.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DrawState {
    /// Per-chunk color strings, `#rrggbbaa`, in flat index order.
    pub chunks: Vec<String>,
    pub rows: u32,
    pub cols: u32,
}

/// Full response for the fetch-project route.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectState {
    pub id: ProjectId,
    pub state: DrawState,
    pub versions: Vec<ProjectVersion>,
}
