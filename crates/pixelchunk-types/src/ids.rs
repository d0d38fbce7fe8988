//! Typed identifiers for projects, snapshots, and connections.
//!
//! All ID types wrap a UUID and are opaque strings on the wire. Snapshot
//! and connection ids are UUIDv7 (time-ordered); project ids are UUIDv4
//! to match the ids minted by the create route. The `short()` form (first
//! 8 hex chars) is for log lines only, never a lookup key.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A project identifier (UUIDv4).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(uuid::Uuid);

/// A snapshot identifier (UUIDv7).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(uuid::Uuid);

/// An edit-channel connection identifier (UUIDv7).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(uuid::Uuid);

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_typed_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// First 8 hex characters — for human display only, not lookup.
            pub fn short(&self) -> String {
                self.0.as_simple().to_string()[..8].to_string()
            }

            /// Full hyphenated UUID string.
            pub fn to_uuid_string(&self) -> String {
                self.0.to_string()
            }

            /// Parse from standard UUID text.
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                uuid::Uuid::parse_str(s).map(Self)
            }
        }

        impl From<uuid::Uuid> for $T {
            fn from(u: uuid::Uuid) -> Self {
                Self(u)
            }
        }

        impl From<$T> for uuid::Uuid {
            fn from(id: $T) -> uuid::Uuid {
                id.0
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($name, "({})"), self.0)
            }
        }
    };
}

impl_typed_id!(ProjectId, "ProjectId");
impl_typed_id!(SnapshotId, "SnapshotId");
impl_typed_id!(ConnectionId, "ConnectionId");

impl ProjectId {
    /// Mint a fresh project id (UUIDv4).
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl SnapshotId {
    /// Mint a fresh time-ordered snapshot id (UUIDv7).
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }
}

impl ConnectionId {
    /// Mint a fresh time-ordered connection id (UUIDv7).
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }
}

impl Default for ProjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for SnapshotId {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}
