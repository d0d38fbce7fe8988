//! Write and read sessions against a project's commit graph.
//!
//! A [`WritableSession`] is a purely local staging area: it captures the
//! branch tip it was opened at and buffers pixel writes in memory.
//! Nothing touches the store until [`crate::Repository::commit`] runs
//! the atomic check-and-advance. Sessions are never shared across
//! connections and never persisted.

use std::collections::BTreeMap;

use pixelchunk_types::{Pixel, ProjectId, SnapshotId, UpdateAction};

use crate::error::{Result, ValidationError};

/// A per-connection staging area for pending pixel writes.
#[derive(Debug, Clone)]
pub struct WritableSession {
    project: ProjectId,
    /// The branch tip observed when the session was opened (or last
    /// committed / rebased). Commit parents hang off this.
    base: SnapshotId,
    /// Total chunks in the array; the index validity bound.
    chunk_count: u32,
    /// Staged writes, keyed by chunk index. BTreeMap so every walk over
    /// the staged set is in ascending index order — resolution and
    /// detection stay deterministic.
    staged: BTreeMap<u32, Pixel>,
}

impl WritableSession {
    pub(crate) fn new(project: ProjectId, base: SnapshotId, chunk_count: u32) -> Self {
        Self { project, base, chunk_count, staged: BTreeMap::new() }
    }

    pub fn project(&self) -> ProjectId {
        self.project
    }

    /// The snapshot this session's next commit will be parented on.
    pub fn base(&self) -> SnapshotId {
        self.base
    }

    pub(crate) fn set_base(&mut self, base: SnapshotId) {
        self.base = base;
    }

    /// Stage a batch of update actions.
    ///
    /// The whole batch is validated before anything is staged: one bad
    /// index or color rejects it with no partial application.
    pub fn stage_batch(&mut self, changes: &[UpdateAction]) -> Result<()> {
        let mut validated = Vec::with_capacity(changes.len());
        for action in changes {
            if action.index >= self.chunk_count {
                return Err(ValidationError::IndexOutOfRange {
                    index: action.index,
                    len: self.chunk_count,
                }
                .into());
            }
            let pixel = Pixel::from_hex(&action.color).map_err(ValidationError::Color)?;
            validated.push((action.index, pixel));
        }
        for (index, pixel) in validated {
            self.staged.insert(index, pixel);
        }
        Ok(())
    }

    /// The staged writes, ascending by chunk index.
    pub fn staged(&self) -> &BTreeMap<u32, Pixel> {
        &self.staged
    }

    /// Drop a staged write (used when "theirs" wins a conflicted chunk).
    pub(crate) fn unstage(&mut self, index: u32) {
        self.staged.remove(&index);
    }

    pub(crate) fn clear_staged(&mut self) {
        self.staged.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }
}

/// An immutable view of the pixel array as of one snapshot.
#[derive(Debug, Clone)]
pub struct ReadView {
    /// The snapshot this view was materialized at.
    pub snapshot: SnapshotId,
    /// The full array, flat index order.
    pub chunks: Vec<Pixel>,
    pub rows: u32,
    pub cols: u32,
}

impl ReadView {
    /// Per-chunk color strings for the wire.
    pub fn chunks_hex(&self) -> Vec<String> {
        self.chunks.iter().map(Pixel::to_hex).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> WritableSession {
        WritableSession::new(ProjectId::new(), SnapshotId::new(), 4)
    }

    fn action(index: u32, color: &str) -> UpdateAction {
        UpdateAction { index, color: color.to_string() }
    }

    #[test]
    fn test_stage_batch() {
        let mut s = session();
        s.stage_batch(&[action(0, "#ff0000ff"), action(3, "#00ff00ff")]).unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s.staged()[&0], Pixel([255, 0, 0, 255]));
    }

    #[test]
    fn test_restaging_overwrites() {
        let mut s = session();
        s.stage_batch(&[action(0, "#ff0000ff")]).unwrap();
        s.stage_batch(&[action(0, "#0000ffff")]).unwrap();
        assert_eq!(s.len(), 1);
        assert_eq!(s.staged()[&0], Pixel([0, 0, 255, 255]));
    }

    #[test]
    fn test_bad_index_rejects_whole_batch() {
        let mut s = session();
        let err = s.stage_batch(&[action(0, "#ff0000ff"), action(4, "#00ff00ff")]).unwrap_err();
        assert!(matches!(
            err,
            crate::StoreError::Validation(ValidationError::IndexOutOfRange { index: 4, len: 4 })
        ));
        // Nothing staged, including the valid entry.
        assert!(s.is_empty());
    }

    #[test]
    fn test_bad_color_rejects_whole_batch() {
        let mut s = session();
        let err = s.stage_batch(&[action(1, "#ff0000ff"), action(2, "red")]).unwrap_err();
        assert!(matches!(
            err,
            crate::StoreError::Validation(ValidationError::Color(_))
        ));
        assert!(s.is_empty());
    }
}
