//! HTTP + WebSocket server for collaborative versioned pixel canvases.
//!
//! The server wires three pieces together:
//! - the [`RepoCache`](pixelchunk_store::RepoCache), a bounded LRU of
//!   open store handles shared by every request handler,
//! - the [`SessionRegistry`](session::SessionRegistry), one edit
//!   session per live WebSocket connection,
//! - the axum [`Router`](axum::Router) exposing the project routes and
//!   the edit channel.

pub mod error;
pub mod routes;
pub mod session;
pub mod ws;

use std::path::PathBuf;

use pixelchunk_store::RepoCache;
use session::SessionRegistry;

pub use error::ApiError;
pub use routes::build_router;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 8000;

/// Default directory for per-project store databases.
pub const DEFAULT_DATA_DIR: &str = "data";

/// Shared server state.
pub struct AppState {
    /// Bounded cache of open repository handles.
    pub cache: RepoCache,
    /// Live edit sessions, keyed by connection.
    pub sessions: SessionRegistry,
}

impl AppState {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { cache: RepoCache::new(data_dir), sessions: SessionRegistry::new() }
    }
}
