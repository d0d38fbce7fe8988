//! The versioned array store for one project.
//!
//! Owns the commit graph, the `main` branch pointer, and the chunked
//! pixel array. Commits are optimistic: staging is local, and the only
//! contended step is the branch-tip check-and-advance, which runs as a
//! compare-and-swap inside the backing database.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;

use pixelchunk_types::{
    ConflictReport, Pixel, ProjectId, ProjectVersion, SnapshotId, Strategy, WHITE, now_millis,
};

use crate::conflict::conflicting_chunks;
use crate::db::{CasOutcome, ProjectDb};
use crate::error::{Result, StoreError, ValidationError};
use crate::session::{ReadView, WritableSession};

/// The single branch every project has.
pub const DEFAULT_BRANCH: &str = "main";

/// Message on the synthetic root snapshot. The visible version history
/// filters entries with this prefix.
pub const INIT_MESSAGE: &str = "Repository initialized";

/// Result of a commit attempt: exactly two cases, success or conflict.
#[derive(Debug, Clone)]
pub enum CommitOutcome {
    /// The tip was still ours; the snapshot landed and the pointer
    /// advanced.
    Committed(SnapshotId),
    /// Another session committed first and at least one staged chunk
    /// collides with it. Resolve and retry.
    Conflicted(ConflictReport),
}

/// Metadata for one commit, as returned by ancestry walks.
#[derive(Debug, Clone)]
pub struct SnapshotInfo {
    pub id: SnapshotId,
    pub parent: Option<SnapshotId>,
    pub message: String,
    /// Unix millis.
    pub written_at: i64,
}

/// An open handle to one project's versioned store.
pub struct Repository {
    id: ProjectId,
    rows: u32,
    cols: u32,
    chunk_count: u32,
    date_created: i64,
    db: Mutex<ProjectDb>,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The database handle carries no useful debug state.
        f.debug_struct("Repository")
            .field("id", &self.id)
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .field("date_created", &self.date_created)
            .finish_non_exhaustive()
    }
}

const META_ROWS: &str = "rows";
const META_COLS: &str = "cols";
const META_DATE_CREATED: &str = "date_created";

fn db_path(data_dir: &Path, id: ProjectId) -> PathBuf {
    data_dir.join(format!("{id}.sqlite3"))
}

/// Validate grid dimensions and compute the total chunk count.
///
/// Rows and cols must be positive and their product must fit the u32
/// index space; an unchecked multiply here would corrupt index bounds
/// and the materialized array size.
fn grid_chunk_count(rows: u32, cols: u32) -> Result<u32> {
    if rows == 0 || cols == 0 {
        return Err(ValidationError::BadDimensions { rows, cols }.into());
    }
    rows.checked_mul(cols)
        .ok_or_else(|| ValidationError::TooManyChunks { rows, cols }.into())
}

impl Repository {
    /// Allocate the backing store for a new project and write the root
    /// snapshot (full default-white array, no explicit writes).
    pub fn create(data_dir: &Path, id: ProjectId, rows: u32, cols: u32) -> Result<Self> {
        grid_chunk_count(rows, cols)?;
        std::fs::create_dir_all(data_dir)
            .map_err(|e| StoreError::Storage(format!("cannot provision data dir: {e}")))?;
        let path = db_path(data_dir, id);
        if path.exists() {
            return Err(StoreError::Storage(format!("project {id} already exists")));
        }

        let db = ProjectDb::open(&path)?;
        let now = now_millis();
        db.set_meta(META_ROWS, &rows.to_string())?;
        db.set_meta(META_COLS, &cols.to_string())?;
        db.set_meta(META_DATE_CREATED, &now.to_string())?;

        Self::init_graph(db, id, rows, cols, now)
    }

    /// Create a project backed by an in-memory database (for testing).
    pub fn create_in_memory(rows: u32, cols: u32) -> Result<Self> {
        grid_chunk_count(rows, cols)?;
        let id = ProjectId::new();
        let db = ProjectDb::in_memory()?;
        let now = now_millis();
        db.set_meta(META_ROWS, &rows.to_string())?;
        db.set_meta(META_COLS, &cols.to_string())?;
        db.set_meta(META_DATE_CREATED, &now.to_string())?;
        Self::init_graph(db, id, rows, cols, now)
    }

    fn init_graph(
        mut db: ProjectDb,
        id: ProjectId,
        rows: u32,
        cols: u32,
        now: i64,
    ) -> Result<Self> {
        let chunk_count = grid_chunk_count(rows, cols)?;
        let root = SnapshotId::new();
        db.init_root(DEFAULT_BRANCH, &root.to_uuid_string(), INIT_MESSAGE, now)?;
        debug!(project = %id.short(), %rows, %cols, root = %root.short(), "created project store");
        Ok(Self { id, rows, cols, chunk_count, date_created: now, db: Mutex::new(db) })
    }

    /// Attach to an existing project's store.
    pub fn open(data_dir: &Path, id: ProjectId) -> Result<Self> {
        let path = db_path(data_dir, id);
        if !path.exists() {
            return Err(StoreError::ProjectNotFound(id));
        }
        let db = ProjectDb::open(&path)?;

        let read_u32 = |key: &str| -> Result<u32> {
            db.get_meta(key)?
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| StoreError::Storage(format!("missing or bad meta key '{key}'")))
        };
        let rows = read_u32(META_ROWS)?;
        let cols = read_u32(META_COLS)?;
        let chunk_count = grid_chunk_count(rows, cols)?;
        let date_created = db
            .get_meta(META_DATE_CREATED)?
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| StoreError::Storage("missing or bad meta key 'date_created'".into()))?;

        Ok(Self { id, rows, cols, chunk_count, date_created, db: Mutex::new(db) })
    }

    pub fn id(&self) -> ProjectId {
        self.id
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    /// Creation time, unix millis.
    pub fn date_created(&self) -> i64 {
        self.date_created
    }

    /// Total chunks in the array. Validated against overflow at open.
    pub fn chunk_count(&self) -> u32 {
        self.chunk_count
    }

    /// Current tip of the `main` branch.
    pub fn tip(&self) -> Result<SnapshotId> {
        let db = self.db.lock();
        let tip = db
            .tip(DEFAULT_BRANCH)?
            .ok_or_else(|| StoreError::Storage("branch 'main' missing".into()))?;
        parse_snapshot_id(&tip)
    }

    /// Open a writable session based at the current tip.
    pub fn writable_session(&self) -> Result<WritableSession> {
        let base = self.tip()?;
        Ok(WritableSession::new(self.id, base, self.chunk_count()))
    }

    /// Materialize an immutable view of the array as of one snapshot
    /// (default: the current tip).
    pub fn readonly_session(&self, snapshot: Option<SnapshotId>) -> Result<ReadView> {
        let at = match snapshot {
            Some(s) => s,
            None => self.tip()?,
        };
        let db = self.db.lock();
        if db.snapshot(&at.to_uuid_string())?.is_none() {
            return Err(StoreError::SnapshotNotFound(at));
        }

        // Replay chunk writes from the root over the default white fill.
        // Deterministic: a snapshot's state is its parent's state plus
        // its recorded writes.
        let mut chunks = vec![WHITE; self.chunk_count() as usize];
        let chain = db.ancestry(&at.to_uuid_string())?;
        for row in chain.iter().rev() {
            for (index, rgba) in db.writes_for(&row.id)? {
                if let Some(slot) = chunks.get_mut(index as usize) {
                    *slot = Pixel(rgba);
                }
            }
        }

        Ok(ReadView { snapshot: at, chunks, rows: self.rows, cols: self.cols })
    }

    /// Walk parent links from a snapshot to the root, newest first.
    pub fn ancestry(&self, from: SnapshotId) -> Result<Vec<SnapshotInfo>> {
        let db = self.db.lock();
        if db.snapshot(&from.to_uuid_string())?.is_none() {
            return Err(StoreError::SnapshotNotFound(from));
        }
        db.ancestry(&from.to_uuid_string())?
            .into_iter()
            .map(|row| {
                Ok(SnapshotInfo {
                    id: parse_snapshot_id(&row.id)?,
                    parent: row.parent.as_deref().map(parse_snapshot_id).transpose()?,
                    message: row.message,
                    written_at: row.written_at,
                })
            })
            .collect()
    }

    /// The visible version history at a snapshot (default: tip), newest
    /// first, with the synthetic root filtered out.
    pub fn versions(&self, at: Option<SnapshotId>) -> Result<Vec<ProjectVersion>> {
        let at = match at {
            Some(s) => s,
            None => self.tip()?,
        };
        Ok(self
            .ancestry(at)?
            .into_iter()
            .filter(|s| !s.message.starts_with(INIT_MESSAGE))
            .map(|s| ProjectVersion { id: s.id, date: s.written_at, message: s.message })
            .collect())
    }

    /// Attempt to commit the session's staged writes.
    ///
    /// The check-and-advance is atomic at the database. If the tip moved
    /// but no staged chunk collides with the interleaved commits, the
    /// session is rebased forward automatically and the attempt retries —
    /// disjoint edits never need a policy. A genuine collision returns
    /// the conflict report with staged writes intact so the caller can
    /// pick a policy without re-sending edits.
    pub fn commit(&self, session: &mut WritableSession, message: &str) -> Result<CommitOutcome> {
        loop {
            let id = SnapshotId::new();
            let writes: Vec<(u32, [u8; 4])> =
                session.staged().iter().map(|(&i, px)| (i, px.0)).collect();

            let outcome = {
                let mut db = self.db.lock();
                db.commit_snapshot(
                    DEFAULT_BRANCH,
                    &session.base().to_uuid_string(),
                    &id.to_uuid_string(),
                    message,
                    now_millis(),
                    &writes,
                )?
            };

            match outcome {
                CasOutcome::Advanced => {
                    debug!(
                        project = %self.id.short(),
                        snapshot = %id.short(),
                        writes = writes.len(),
                        "commit fast-forwarded"
                    );
                    session.set_base(id);
                    session.clear_staged();
                    return Ok(CommitOutcome::Committed(id));
                }
                CasOutcome::TipMoved(tip) => {
                    let tip = parse_snapshot_id(&tip)?;
                    let conflicts = {
                        let db = self.db.lock();
                        conflicting_chunks(&db, session.base(), tip, session.staged())?
                    };
                    if conflicts.is_empty() {
                        // Disjoint with everything that landed since our
                        // base: fast-forward the session and race again.
                        debug!(project = %self.id.short(), tip = %tip.short(), "rebasing clean session onto moved tip");
                        session.set_base(tip);
                        continue;
                    }
                    debug!(
                        project = %self.id.short(),
                        tip = %tip.short(),
                        conflicts = conflicts.len(),
                        "commit conflicted"
                    );
                    return Ok(CommitOutcome::Conflicted(ConflictReport {
                        source_snapshot: session.base(),
                        failed_at_snapshot: tip,
                        conflicted_chunks: conflicts,
                    }));
                }
            }
        }
    }

    /// Resolve the current divergence with a policy and retry the commit.
    ///
    /// `Ours` keeps every staged value; `Theirs` drops the staged writes
    /// for conflicting chunks and keeps the rest. Either way the session
    /// is rebased onto the observed tip, so non-conflicting remote
    /// writes are incorporated via parentage. Resolution is
    /// deterministic: the conflict set is computed in ascending index
    /// order and the same policy always yields the same array. The loop
    /// re-detects on every race, so a commit that loses again is
    /// resolved again under the same policy.
    pub fn rebase_commit(
        &self,
        session: &mut WritableSession,
        message: &str,
        strategy: Strategy,
    ) -> Result<SnapshotId> {
        loop {
            match self.commit(session, message)? {
                CommitOutcome::Committed(id) => return Ok(id),
                CommitOutcome::Conflicted(report) => {
                    match strategy {
                        Strategy::Ours => {
                            // Staged values win; nothing to drop.
                        }
                        Strategy::Theirs => {
                            for index in &report.conflicted_chunks {
                                session.unstage(*index);
                            }
                        }
                    }
                    session.set_base(report.failed_at_snapshot);
                }
            }
        }
    }
}

fn parse_snapshot_id(s: &str) -> Result<SnapshotId> {
    SnapshotId::parse(s).map_err(|e| StoreError::Storage(format!("bad snapshot id {s:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixelchunk_types::UpdateAction;

    fn action(index: u32, color: &str) -> UpdateAction {
        UpdateAction { index, color: color.to_string() }
    }

    fn commit_one(repo: &Repository, session: &mut WritableSession, idx: u32, color: &str, msg: &str) -> CommitOutcome {
        session.stage_batch(&[action(idx, color)]).unwrap();
        repo.commit(session, msg).unwrap()
    }

    #[test]
    fn test_fresh_project_is_white() {
        let repo = Repository::create_in_memory(2, 2).unwrap();
        let view = repo.readonly_session(None).unwrap();
        assert_eq!(view.rows, 2);
        assert_eq!(view.cols, 2);
        assert_eq!(view.chunks_hex(), vec!["#ffffffff"; 4]);
    }

    #[test]
    fn test_fresh_project_versions_empty() {
        let repo = Repository::create_in_memory(2, 2).unwrap();
        assert!(repo.versions(None).unwrap().is_empty());
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        assert!(matches!(
            Repository::create_in_memory(0, 4),
            Err(StoreError::Validation(ValidationError::BadDimensions { .. }))
        ));
    }

    #[test]
    fn test_overflowing_dimensions_rejected() {
        // 70_000^2 overflows u32; creation must fail instead of minting
        // a store whose session open would panic on the chunk bound.
        assert!(matches!(
            Repository::create_in_memory(70_000, 70_000),
            Err(StoreError::Validation(ValidationError::TooManyChunks { .. }))
        ));
        // The largest representable grid is still fine.
        let repo = Repository::create_in_memory(u32::MAX, 1).unwrap();
        assert_eq!(repo.chunk_count(), u32::MAX);
    }

    #[test]
    fn test_debug_elides_connection() {
        let repo = Repository::create_in_memory(2, 2).unwrap();
        let rendered = format!("{repo:?}");
        assert!(rendered.contains("Repository"));
        assert!(rendered.contains(&repo.id().to_uuid_string()));
    }

    #[test]
    fn test_single_writer_commit_advances_tip() {
        let repo = Repository::create_in_memory(2, 2).unwrap();
        let root = repo.tip().unwrap();

        let mut session = repo.writable_session().unwrap();
        let outcome = commit_one(&repo, &mut session, 0, "#ff0000ff", "paint");
        let id = match outcome {
            CommitOutcome::Committed(id) => id,
            other => panic!("expected success, got {other:?}"),
        };

        assert_eq!(repo.tip().unwrap(), id);
        // New tip is a descendant of the old one.
        let chain = repo.ancestry(id).unwrap();
        assert!(chain.iter().any(|s| s.id == root));
        // Session cleared and rebased.
        assert!(session.is_empty());
        assert_eq!(session.base(), id);

        let versions = repo.versions(None).unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].message, "paint");
    }

    #[test]
    fn test_disjoint_sessions_both_commit() {
        let repo = Repository::create_in_memory(2, 2).unwrap();
        let mut a = repo.writable_session().unwrap();
        let mut b = repo.writable_session().unwrap();

        assert!(matches!(
            commit_one(&repo, &mut a, 0, "#ff0000ff", "red"),
            CommitOutcome::Committed(_)
        ));
        // B is stale but touches a different chunk: auto-rebased, no policy needed.
        assert!(matches!(
            commit_one(&repo, &mut b, 1, "#00ff00ff", "green"),
            CommitOutcome::Committed(_)
        ));

        let view = repo.readonly_session(None).unwrap();
        assert_eq!(
            view.chunks_hex(),
            vec!["#ff0000ff", "#00ff00ff", "#ffffffff", "#ffffffff"]
        );
    }

    #[test]
    fn test_same_chunk_conflict_reported() {
        let repo = Repository::create_in_memory(2, 2).unwrap();
        let base = repo.tip().unwrap();
        let mut a = repo.writable_session().unwrap();
        let mut b = repo.writable_session().unwrap();

        let winner = match commit_one(&repo, &mut a, 0, "#ff0000ff", "red") {
            CommitOutcome::Committed(id) => id,
            other => panic!("expected success, got {other:?}"),
        };

        let report = match commit_one(&repo, &mut b, 0, "#0000ffff", "blue") {
            CommitOutcome::Conflicted(report) => report,
            other => panic!("expected conflict, got {other:?}"),
        };
        assert_eq!(report.source_snapshot, base);
        assert_eq!(report.failed_at_snapshot, winner);
        assert_eq!(report.conflicted_chunks, vec![0]);
        // Staged writes survive the failed attempt.
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn test_rebase_theirs_keeps_winner() {
        let repo = Repository::create_in_memory(2, 2).unwrap();
        let mut a = repo.writable_session().unwrap();
        let mut b = repo.writable_session().unwrap();

        commit_one(&repo, &mut a, 0, "#ff0000ff", "red");
        b.stage_batch(&[action(0, "#0000ffff")]).unwrap();
        repo.rebase_commit(&mut b, "blue", Strategy::Theirs).unwrap();

        let view = repo.readonly_session(None).unwrap();
        assert_eq!(view.chunks_hex()[0], "#ff0000ff");
    }

    #[test]
    fn test_rebase_ours_overrides() {
        let repo = Repository::create_in_memory(2, 2).unwrap();
        let mut a = repo.writable_session().unwrap();
        let mut b = repo.writable_session().unwrap();

        commit_one(&repo, &mut a, 0, "#ff0000ff", "red");
        b.stage_batch(&[action(0, "#0000ffff")]).unwrap();
        repo.rebase_commit(&mut b, "blue", Strategy::Ours).unwrap();

        let view = repo.readonly_session(None).unwrap();
        assert_eq!(view.chunks_hex()[0], "#0000ffff");
    }

    #[test]
    fn test_rebase_theirs_keeps_nonconflicting_staged() {
        let repo = Repository::create_in_memory(2, 2).unwrap();
        let mut a = repo.writable_session().unwrap();
        let mut b = repo.writable_session().unwrap();

        commit_one(&repo, &mut a, 0, "#ff0000ff", "red");
        b.stage_batch(&[action(0, "#0000ffff"), action(3, "#00ff00ff")]).unwrap();
        repo.rebase_commit(&mut b, "mixed", Strategy::Theirs).unwrap();

        let view = repo.readonly_session(None).unwrap();
        assert_eq!(
            view.chunks_hex(),
            vec!["#ff0000ff", "#ffffffff", "#ffffffff", "#00ff00ff"]
        );
    }

    #[test]
    fn test_readonly_session_at_old_snapshot() {
        let repo = Repository::create_in_memory(2, 2).unwrap();
        let mut session = repo.writable_session().unwrap();

        let s1 = match commit_one(&repo, &mut session, 0, "#ff0000ff", "red") {
            CommitOutcome::Committed(id) => id,
            other => panic!("expected success, got {other:?}"),
        };
        commit_one(&repo, &mut session, 1, "#00ff00ff", "green");

        // History at s1 shows only the red write.
        let view = repo.readonly_session(Some(s1)).unwrap();
        assert_eq!(view.chunks_hex()[0], "#ff0000ff");
        assert_eq!(view.chunks_hex()[1], "#ffffffff");
    }

    #[test]
    fn test_unknown_snapshot_not_found() {
        let repo = Repository::create_in_memory(2, 2).unwrap();
        let missing = SnapshotId::new();
        assert!(matches!(
            repo.readonly_session(Some(missing)),
            Err(StoreError::SnapshotNotFound(_))
        ));
        assert!(matches!(repo.ancestry(missing), Err(StoreError::SnapshotNotFound(_))));
    }

    #[test]
    fn test_on_disk_create_open_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let id = ProjectId::new();
        {
            let repo = Repository::create(dir.path(), id, 3, 5).unwrap();
            let mut session = repo.writable_session().unwrap();
            commit_one(&repo, &mut session, 7, "#12345678", "dot");
        }

        let repo = Repository::open(dir.path(), id).unwrap();
        assert_eq!(repo.rows(), 3);
        assert_eq!(repo.cols(), 5);
        let view = repo.readonly_session(None).unwrap();
        assert_eq!(view.chunks_hex()[7], "#12345678");
        assert_eq!(repo.versions(None).unwrap().len(), 1);
    }

    #[test]
    fn test_open_missing_project() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Repository::open(dir.path(), ProjectId::new()),
            Err(StoreError::ProjectNotFound(_))
        ));
    }

    #[test]
    fn test_create_twice_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let id = ProjectId::new();
        Repository::create(dir.path(), id, 2, 2).unwrap();
        assert!(matches!(
            Repository::create(dir.path(), id, 2, 2),
            Err(StoreError::Storage(_))
        ));
    }
}
