//! End-to-end edit flows driven through the session registry and the
//! repository cache, against on-disk stores.

use std::sync::Arc;

use pixelchunk_server::AppState;
use pixelchunk_server::session::SessionRegistry;
use pixelchunk_store::{RepoCache, Repository};
use pixelchunk_types::{ClientCommand, ConnectionId, ServerReply, Strategy, UpdateAction};

fn commit_cmd(message: &str, changes: &[(u32, &str)]) -> ClientCommand {
    ClientCommand::Commit {
        message: message.into(),
        changes: changes
            .iter()
            .map(|&(index, color)| UpdateAction { index, color: color.into() })
            .collect(),
    }
}

fn rebase_cmd(message: &str, strategy: Strategy) -> ClientCommand {
    ClientCommand::Rebase { message: message.into(), strategy }
}

fn expect_success(reply: ServerReply) -> pixelchunk_types::SnapshotId {
    match reply {
        ServerReply::Success { latest_snapshot } => latest_snapshot,
        other => panic!("expected success, got {other:?}"),
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    state: AppState,
    repo: Arc<Repository>,
}

impl Harness {
    /// A 2x2 project behind a warmed cache and an empty registry.
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(dir.path().to_path_buf());
        let id = pixelchunk_types::ProjectId::new();
        let repo = Arc::new(Repository::create(dir.path(), id, 2, 2).unwrap());
        state.cache.insert(Arc::clone(&repo));
        Self { _dir: dir, state, repo }
    }

    fn connect(&self) -> ConnectionId {
        self.state.sessions.connect(Arc::clone(&self.repo)).unwrap()
    }

    fn send(&self, conn: ConnectionId, cmd: ClientCommand) -> ServerReply {
        self.state.sessions.handle_command(conn, cmd)
    }

    fn chunks(&self) -> Vec<String> {
        self.repo.readonly_session(None).unwrap().chunks_hex()
    }
}

#[test]
fn fresh_project_has_white_chunks_and_empty_history() {
    let h = Harness::new();
    assert_eq!(h.chunks(), vec!["#ffffffff"; 4]);
    assert!(h.repo.versions(None).unwrap().is_empty());
}

#[test]
fn paint_commit_appears_in_version_list() {
    let h = Harness::new();
    let conn = h.connect();
    expect_success(h.send(conn, commit_cmd("paint", &[(0, "#ff0000ff")])));

    let versions = h.repo.versions(None).unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].message, "paint");
}

/// The full concrete scenario: A paints red, B lands green on a stale
/// base (disjoint chunk), C conflicts on chunk 0 and resolves theirs.
#[test]
fn red_green_blue_scenario_theirs() {
    let h = Harness::new();
    let a = h.connect();
    let b = h.connect();
    let c = h.connect();

    expect_success(h.send(a, commit_cmd("red", &[(0, "#ff0000ff")])));

    // B is based on the pre-red tip but touches a disjoint chunk.
    expect_success(h.send(b, commit_cmd("green", &[(1, "#00ff00ff")])));
    assert_eq!(
        h.chunks(),
        vec!["#ff0000ff", "#00ff00ff", "#ffffffff", "#ffffffff"]
    );

    // C collides on chunk 0.
    let report = match h.send(c, commit_cmd("blue", &[(0, "#0000ffff")])) {
        ServerReply::Conflicts(report) => report,
        other => panic!("expected conflict, got {other:?}"),
    };
    assert_eq!(report.conflicted_chunks, vec![0]);

    expect_success(h.send(c, rebase_cmd("blue", Strategy::Theirs)));
    assert_eq!(h.chunks()[0], "#ff0000ff");

    // The init snapshot stays filtered throughout.
    let messages: Vec<_> = h
        .repo
        .versions(None)
        .unwrap()
        .into_iter()
        .map(|v| v.message)
        .collect();
    assert_eq!(messages, ["blue", "green", "red"]);
}

#[test]
fn red_green_blue_scenario_ours() {
    let h = Harness::new();
    let a = h.connect();
    let c = h.connect();

    expect_success(h.send(a, commit_cmd("red", &[(0, "#ff0000ff")])));

    let report = match h.send(c, commit_cmd("blue", &[(0, "#0000ffff")])) {
        ServerReply::Conflicts(report) => report,
        other => panic!("expected conflict, got {other:?}"),
    };
    assert_eq!(report.conflicted_chunks, vec![0]);

    expect_success(h.send(c, rebase_cmd("blue", Strategy::Ours)));
    assert_eq!(h.chunks()[0], "#0000ffff");
}

#[test]
fn disconnect_discards_staged_writes() {
    let h = Harness::new();
    let conn = h.connect();

    // A rejected batch stages nothing; a conflicting commit keeps its
    // staged writes until the connection goes away.
    let a = h.connect();
    expect_success(h.send(a, commit_cmd("red", &[(0, "#ff0000ff")])));
    let reply = h.send(conn, commit_cmd("blue", &[(0, "#0000ffff")]));
    assert!(matches!(reply, ServerReply::Conflicts(_)));
    assert_eq!(h.state.sessions.staged_len(conn), Some(1));

    h.state.sessions.disconnect(conn);
    assert_eq!(h.state.sessions.staged_len(conn), None);
    // The canvas never saw the staged blue.
    assert_eq!(h.chunks()[0], "#ff0000ff");
}

#[test]
fn cache_eviction_reopens_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let cache = RepoCache::with_capacity(dir.path().to_path_buf(), 2);

    let ids: Vec<_> = (0..3)
        .map(|_| {
            let id = pixelchunk_types::ProjectId::new();
            Repository::create(dir.path(), id, 2, 2).unwrap();
            id
        })
        .collect();

    // Commit through a cached handle, then push it out of the cache.
    let repo = cache.get(ids[0]).unwrap();
    let registry = SessionRegistry::new();
    let conn = registry.connect(Arc::clone(&repo)).unwrap();
    expect_success(registry.handle_command(conn, commit_cmd("paint", &[(0, "#ff0000ff")])));

    cache.get(ids[1]).unwrap();
    cache.get(ids[2]).unwrap();
    assert_eq!(cache.len(), 2);

    // Reopened handle sees the committed state from disk.
    let reopened = cache.get(ids[0]).unwrap();
    assert!(!Arc::ptr_eq(&repo, &reopened));
    assert_eq!(reopened.readonly_session(None).unwrap().chunks_hex()[0], "#ff0000ff");
    assert_eq!(reopened.versions(None).unwrap().len(), 1);
}

#[test]
fn router_builds_over_state() {
    let dir = tempfile::tempdir().unwrap();
    let state = Arc::new(AppState::new(dir.path().to_path_buf()));
    let _app = pixelchunk_server::build_router(state);
}

/// Many writers racing on disjoint chunks: every commit lands without a
/// policy, and the final array reflects all of them.
#[test]
fn concurrent_disjoint_writers_all_land() {
    let dir = tempfile::tempdir().unwrap();
    let id = pixelchunk_types::ProjectId::new();
    let repo = Arc::new(Repository::create(dir.path(), id, 4, 4).unwrap());
    let registry = Arc::new(SessionRegistry::new());

    let handles: Vec<_> = (0..8u32)
        .map(|i| {
            let repo = Arc::clone(&repo);
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                let conn = registry.connect(repo).unwrap();
                let reply =
                    registry.handle_command(conn, commit_cmd("dot", &[(i, "#000000ff")]));
                registry.disconnect(conn);
                matches!(reply, ServerReply::Success { .. })
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap());
    }

    let chunks = repo.readonly_session(None).unwrap().chunks_hex();
    for i in 0..8 {
        assert_eq!(chunks[i], "#000000ff");
    }
    assert_eq!(repo.versions(None).unwrap().len(), 8);
}
