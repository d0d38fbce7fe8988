//! Chunk-granular conflict detection between two diverging commit paths.
//!
//! A conflict is a chunk index written both by the session's staged
//! buffer and by some snapshot committed between the session's base and
//! the current tip. With chunk = one pixel, edits to disjoint pixels
//! can never conflict regardless of commit order.

use std::collections::BTreeMap;

use pixelchunk_types::{Pixel, SnapshotId};

use crate::db::ProjectDb;
use crate::error::{Result, StoreError};

/// Chunk indices written by both sides, ascending.
///
/// Walks the snapshots in `(base, tip]` — the commits that landed after
/// the session's base — and intersects their chunk writes with the
/// staged set. Ascending order makes the report deterministic for a
/// given conflict set.
pub(crate) fn conflicting_chunks(
    db: &ProjectDb,
    base: SnapshotId,
    tip: SnapshotId,
    staged: &BTreeMap<u32, Pixel>,
) -> Result<Vec<u32>> {
    let base_id = base.to_uuid_string();
    let mut conflicts = Vec::new();

    let mut cursor = Some(tip.to_uuid_string());
    let mut found_base = false;
    while let Some(id) = cursor {
        if id == base_id {
            found_base = true;
            break;
        }
        let row = db
            .snapshot(&id)?
            .ok_or_else(|| StoreError::Storage(format!("snapshot {id} missing from graph")))?;
        for (index, _) in db.writes_for(&id)? {
            if staged.contains_key(&index) {
                conflicts.push(index);
            }
        }
        cursor = row.parent;
    }

    // The tip only ever advances through descendants, so the base must
    // be on the path. Anything else is a corrupted graph.
    if !found_base {
        return Err(StoreError::Storage(format!(
            "session base {base} is not an ancestor of tip {tip}"
        )));
    }

    conflicts.sort_unstable();
    conflicts.dedup();
    Ok(conflicts)
}
