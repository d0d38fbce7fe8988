//! Per-connection edit sessions and the connection-keyed registry.
//!
//! Each live edit-channel connection owns exactly one [`EditSession`]:
//! a writable store session plus the handle it was opened against. The
//! registry maps an opaque [`ConnectionId`] to that state — populated
//! on connect, removed on disconnect — so no session ever outlives its
//! connection or leaks into another one.
//!
//! All command handling is synchronous: the socket task decodes a
//! frame, drives the session to a reply under the registry guard, and
//! only then awaits the send. Guards never cross an await.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use pixelchunk_store::{CommitOutcome, Repository, StoreError, WritableSession};
use pixelchunk_types::{ClientCommand, ConnectionId, ServerReply, Strategy, UpdateAction};

/// Ephemeral state for one edit-channel connection.
pub struct EditSession {
    repo: Arc<Repository>,
    session: WritableSession,
}

impl EditSession {
    pub fn new(repo: Arc<Repository>, session: WritableSession) -> Self {
        Self { repo, session }
    }

    /// Stage a validated batch and attempt a commit.
    fn commit(&mut self, message: &str, changes: &[UpdateAction]) -> ServerReply {
        if let Err(e) = self.session.stage_batch(changes) {
            // Whole batch rejected, nothing staged; the session survives.
            return ServerReply::Error { error: e.to_string() };
        }
        match self.repo.commit(&mut self.session, message) {
            Ok(CommitOutcome::Committed(id)) => ServerReply::Success { latest_snapshot: id },
            Ok(CommitOutcome::Conflicted(report)) => ServerReply::Conflicts(report),
            Err(e) => store_error_reply(e),
        }
    }

    /// Resolve the current divergence with a policy and retry.
    fn rebase(&mut self, message: &str, strategy: Strategy) -> ServerReply {
        match self.repo.rebase_commit(&mut self.session, message, strategy) {
            Ok(id) => ServerReply::Success { latest_snapshot: id },
            Err(e) => store_error_reply(e),
        }
    }

    /// Number of staged, uncommitted writes (for tests and logs).
    pub fn staged_len(&self) -> usize {
        self.session.len()
    }
}

fn store_error_reply(e: StoreError) -> ServerReply {
    warn!("edit session store error: {e}");
    ServerReply::Error { error: e.to_string() }
}

/// Registry of live edit sessions, keyed by connection id.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<ConnectionId, EditSession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session for a new connection at the project's current tip.
    pub fn connect(&self, repo: Arc<Repository>) -> Result<ConnectionId, StoreError> {
        let conn = ConnectionId::new();
        let session = repo.writable_session()?;
        debug!(connection = %conn.short(), project = %repo.id().short(), base = %session.base().short(), "edit session opened");
        self.sessions.insert(conn, EditSession::new(repo, session));
        Ok(conn)
    }

    /// Discard a connection's session. Staged, uncommitted writes are
    /// lost — there is no implicit save.
    pub fn disconnect(&self, conn: ConnectionId) {
        if self.sessions.remove(&conn).is_some() {
            debug!(connection = %conn.short(), "edit session discarded");
        }
    }

    /// Handle one inbound text frame and produce the JSON reply.
    ///
    /// Malformed frames and rejected batches answer in-band; nothing
    /// here terminates the connection.
    pub fn handle_frame(&self, conn: ConnectionId, frame: &str) -> String {
        let reply = match ClientCommand::decode(frame) {
            Ok(command) => self.handle_command(conn, command),
            Err(e) => ServerReply::Error { error: e.to_string() },
        };
        serde_json::to_string(&reply).unwrap_or_else(|e| {
            // ServerReply is plain data; serialization cannot really fail.
            warn!("failed to encode reply: {e}");
            r#"{"error":"internal encoding failure"}"#.to_string()
        })
    }

    /// Dispatch a decoded command against the connection's session.
    pub fn handle_command(&self, conn: ConnectionId, command: ClientCommand) -> ServerReply {
        let Some(mut entry) = self.sessions.get_mut(&conn) else {
            return ServerReply::Error { error: "no session for this connection".into() };
        };
        match command {
            ClientCommand::Commit { message, changes } => entry.commit(&message, &changes),
            ClientCommand::Rebase { message, strategy } => entry.rebase(&message, strategy),
        }
    }

    /// Staged write count for a connection (test introspection).
    pub fn staged_len(&self, conn: ConnectionId) -> Option<usize> {
        self.sessions.get(&conn).map(|s| s.staged_len())
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
