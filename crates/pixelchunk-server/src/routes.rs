//! Axum router and project route handlers.
//!
//! ```text
//! POST /projects/new          - create a project (rows/cols query params)
//! GET  /projects/{id}         - pixel array + visible version history
//! GET  /projects/{id}/edit    - WebSocket upgrade to the edit channel
//! ```
//!
//! These routes are thin collaborators over the store; the real-time
//! protocol lives in [`crate::ws`].

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use pixelchunk_store::Repository;
use pixelchunk_types::{DrawState, Project, ProjectId, ProjectState, SnapshotId};

use crate::AppState;
use crate::error::ApiError;
use crate::ws::edit_channel;

/// Grid size when the create route is called without dimensions.
pub const DEFAULT_DIMENSION: u32 = 16;

/// Build the complete router over the shared state.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/projects/new", post(new_project))
        .route("/projects/{id}", get(get_project))
        .route("/projects/{id}/edit", get(edit_channel))
        .with_state(state)
}

#[derive(Deserialize)]
pub struct NewProjectParams {
    rows: Option<u32>,
    cols: Option<u32>,
}

/// Create a project: provision its store, write the root snapshot, and
/// warm the repository cache with the fresh handle.
pub async fn new_project(
    State(state): State<Arc<AppState>>,
    Query(params): Query<NewProjectParams>,
) -> Result<Json<Project>, ApiError> {
    let rows = params.rows.unwrap_or(DEFAULT_DIMENSION);
    let cols = params.cols.unwrap_or(DEFAULT_DIMENSION);
    let id = ProjectId::new();

    let repo = Repository::create(state.cache.data_dir(), id, rows, cols)?;
    let date_created = repo.date_created();
    state.cache.insert(Arc::new(repo));

    tracing::info!(project = %id.short(), %rows, %cols, "created project");
    Ok(Json(Project { id, date_created }))
}

#[derive(Deserialize)]
pub struct GetProjectParams {
    version: Option<String>,
}

/// Fetch the pixel array and version list, at an optional snapshot
/// (default: the current `main` tip).
pub async fn get_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<GetProjectParams>,
) -> Result<Json<ProjectState>, ApiError> {
    // An unparseable id cannot name any project.
    let id = ProjectId::parse(&id).map_err(|_| ApiError::NotFound("Project not found".into()))?;
    let repo = state.cache.get(id)?;

    let at = params
        .version
        .as_deref()
        .map(|v| {
            SnapshotId::parse(v).map_err(|_| ApiError::NotFound("Snapshot not found".into()))
        })
        .transpose()?;

    let view = repo.readonly_session(at)?;
    let versions = repo.versions(Some(view.snapshot))?;

    Ok(Json(ProjectState {
        id,
        state: DrawState { chunks: view.chunks_hex(), rows: view.rows, cols: view.cols },
        versions,
    }))
}
