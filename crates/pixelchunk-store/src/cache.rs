//! Bounded cache of open repository handles, keyed by project id.
//!
//! An explicit O(1) LRU: a hash map into a slab of nodes threaded on a
//! doubly linked recency list. The whole lookup/insert/evict sequence
//! runs under one mutex, so concurrent request handlers can't race a
//! duplicate open or a lost eviction. Open failures surface NotFound
//! and are never cached.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use pixelchunk_types::ProjectId;

use crate::error::Result;
use crate::repo::Repository;

/// Default number of open handles kept around.
pub const DEFAULT_CACHE_CAPACITY: usize = 5;

struct Node {
    key: ProjectId,
    repo: Arc<Repository>,
    prev: Option<usize>,
    next: Option<usize>,
}

/// The recency list: head is most recently used, tail gets evicted.
struct LruList {
    map: HashMap<ProjectId, usize>,
    slots: Vec<Option<Node>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl LruList {
    fn new() -> Self {
        Self { map: HashMap::new(), slots: Vec::new(), free: Vec::new(), head: None, tail: None }
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn node(&self, slot: usize) -> &Node {
        self.slots[slot].as_ref().expect("slot in map is live")
    }

    fn node_mut(&mut self, slot: usize) -> &mut Node {
        self.slots[slot].as_mut().expect("slot in map is live")
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = {
            let n = self.node(slot);
            (n.prev, n.next)
        };
        match prev {
            Some(p) => self.node_mut(p).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.node_mut(n).prev = prev,
            None => self.tail = prev,
        }
        let n = self.node_mut(slot);
        n.prev = None;
        n.next = None;
    }

    fn push_front(&mut self, slot: usize) {
        let old_head = self.head;
        {
            let n = self.node_mut(slot);
            n.prev = None;
            n.next = old_head;
        }
        if let Some(h) = old_head {
            self.node_mut(h).prev = Some(slot);
        }
        self.head = Some(slot);
        if self.tail.is_none() {
            self.tail = Some(slot);
        }
    }

    /// Look up a key and promote it to most recently used.
    fn touch(&mut self, key: ProjectId) -> Option<Arc<Repository>> {
        let slot = *self.map.get(&key)?;
        self.unlink(slot);
        self.push_front(slot);
        Some(Arc::clone(&self.node(slot).repo))
    }

    fn insert_front(&mut self, key: ProjectId, repo: Arc<Repository>) {
        let node = Node { key, repo, prev: None, next: None };
        let slot = match self.free.pop() {
            Some(s) => {
                self.slots[s] = Some(node);
                s
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };
        self.map.insert(key, slot);
        self.push_front(slot);
    }

    /// Drop the least-recently-used entry, returning its key.
    fn evict_tail(&mut self) -> Option<ProjectId> {
        let slot = self.tail?;
        self.unlink(slot);
        let node = self.slots[slot].take().expect("tail slot is live");
        self.map.remove(&node.key);
        self.free.push(slot);
        Some(node.key)
    }

    fn remove(&mut self, key: ProjectId) -> bool {
        let Some(slot) = self.map.remove(&key) else {
            return false;
        };
        self.unlink(slot);
        self.slots[slot] = None;
        self.free.push(slot);
        true
    }
}

/// Shared cache of open store handles.
pub struct RepoCache {
    data_dir: PathBuf,
    capacity: usize,
    inner: Mutex<LruList>,
}

impl RepoCache {
    pub fn new(data_dir: PathBuf) -> Self {
        Self::with_capacity(data_dir, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(data_dir: PathBuf, capacity: usize) -> Self {
        assert!(capacity > 0, "cache capacity must be positive");
        Self { data_dir, capacity, inner: Mutex::new(LruList::new()) }
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    /// Get the handle for a project, opening the backing store on a miss.
    ///
    /// Unknown projects surface [`crate::StoreError::ProjectNotFound`];
    /// the failure is not cached. Eviction drops the handle — backend
    /// resources release once the last clone of the `Arc` goes away.
    pub fn get(&self, id: ProjectId) -> Result<Arc<Repository>> {
        let mut inner = self.inner.lock();
        if let Some(repo) = inner.touch(id) {
            debug!(project = %id.short(), "repo cache hit");
            return Ok(repo);
        }

        debug!(project = %id.short(), "repo cache miss, opening store");
        let repo = Arc::new(Repository::open(&self.data_dir, id)?);
        if inner.len() == self.capacity {
            if let Some(evicted) = inner.evict_tail() {
                debug!(project = %evicted.short(), "evicted least-recently-used repo");
            }
        }
        inner.insert_front(id, Arc::clone(&repo));
        Ok(repo)
    }

    /// Warm the cache with a freshly created repository.
    pub fn insert(&self, repo: Arc<Repository>) {
        let mut inner = self.inner.lock();
        let id = repo.id();
        if inner.touch(id).is_some() {
            return;
        }
        if inner.len() == self.capacity {
            inner.evict_tail();
        }
        inner.insert_front(id, repo);
    }

    /// Drop a cached handle, if present.
    pub fn remove(&self, id: ProjectId) -> bool {
        self.inner.lock().remove(id)
    }

    /// Number of currently cached handles.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
