//! The real-time edit channel: one WebSocket per editing client.
//!
//! Inbound frames are JSON commands (stage-and-commit or
//! resolve-and-retry); every frame gets exactly one JSON reply. Bad
//! frames are answered in-band and never close the socket. Closing the
//! socket — or any receive error — discards the session and its staged
//! writes; nothing else is affected.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use tracing::debug;

use pixelchunk_types::ProjectId;

use crate::AppState;
use crate::error::ApiError;

/// Upgrade handler: resolves the project through the repository cache
/// before accepting the socket, so unknown projects fail with 404
/// instead of a doomed connection.
pub async fn edit_channel(
    ws: WebSocketUpgrade,
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let id = ProjectId::parse(&id).map_err(|_| ApiError::NotFound("Project not found".into()))?;
    let repo = state.cache.get(id)?;
    Ok(ws.on_upgrade(move |socket| run_connection(socket, state, repo)))
}

async fn run_connection(
    mut socket: WebSocket,
    state: Arc<AppState>,
    repo: Arc<pixelchunk_store::Repository>,
) {
    let conn = match state.sessions.connect(repo) {
        Ok(conn) => conn,
        Err(e) => {
            // Tip unreadable at session open; nothing was registered.
            tracing::warn!("failed to open edit session: {e}");
            let body = serde_json::json!({ "error": e.to_string() }).to_string();
            let _ = socket.send(Message::Text(body.into())).await;
            return;
        }
    };

    while let Some(Ok(msg)) = socket.recv().await {
        match msg {
            Message::Text(frame) => {
                // All store work happens synchronously here; the
                // registry guard is released before the send await.
                let reply = state.sessions.handle_frame(conn, frame.as_str());
                if socket.send(Message::Text(reply.into())).await.is_err() {
                    break;
                }
            }
            Message::Close(_) => break,
            // Pings are answered by axum; binary frames are not part of
            // the protocol and are ignored.
            _ => {}
        }
    }

    debug!(connection = %conn.short(), "edit channel closed");
    state.sessions.disconnect(conn);
}
