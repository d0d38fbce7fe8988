//! Versioned chunked-array store with optimistic-concurrency commit/rebase.
//!
//! Each project is one independent store: an append-only commit graph
//! over a chunked pixel array, with a single `main` branch pointer.
//! Writers stage locally in a [`WritableSession`] and contend only at
//! the atomic branch-tip check-and-advance; losers get a chunk-granular
//! [`ConflictReport`](pixelchunk_types::ConflictReport) and resolve with
//! an explicit policy.
//!
//! ```
//! use pixelchunk_store::{CommitOutcome, Repository};
//! use pixelchunk_types::UpdateAction;
//!
//! let repo = Repository::create_in_memory(2, 2).unwrap();
//! let mut session = repo.writable_session().unwrap();
//! session
//!     .stage_batch(&[UpdateAction { index: 0, color: "#ff0000ff".into() }])
//!     .unwrap();
//! match repo.commit(&mut session, "paint").unwrap() {
//!     CommitOutcome::Committed(id) => println!("landed {id}"),
//!     CommitOutcome::Conflicted(report) => println!("lost: {report:?}"),
//! }
//! ```

pub mod cache;
mod conflict;
pub mod db;
pub mod error;
pub mod repo;
pub mod session;

pub use cache::{DEFAULT_CACHE_CAPACITY, RepoCache};
pub use error::{Result, StoreError, ValidationError};
pub use repo::{CommitOutcome, DEFAULT_BRANCH, INIT_MESSAGE, Repository, SnapshotInfo};
pub use session::{ReadView, WritableSession};
