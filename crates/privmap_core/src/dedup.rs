//! Type-partitioned set of already-claimed content identifiers.

use crate::content_id::ContentId;
use crate::types::NodeKind;
use parking_lot::Mutex;
use std::collections::HashSet;

/// Tracks which (kind, id) pairs have been claimed during one run.
///
/// One cache is built per run and per scope ("staged", "created") and
/// handed to every collector or loader that needs it. Each kind has its own
/// lock, so claims on different kinds never contend.
///
/// # Examples
///
/// ```
/// use privmap_core::{ContentId, DedupCache, NodeKind};
///
/// let cache = DedupCache::new();
/// let id = ContentId::from_bytes([7; 32]);
/// assert!(cache.try_claim(NodeKind::Exe, id));
/// assert!(!cache.try_claim(NodeKind::Exe, id));
/// // Same id, different kind: separate partition.
/// assert!(cache.try_claim(NodeKind::Directory, id));
/// ```
#[derive(Debug, Default)]
pub struct DedupCache {
    partitions: [Mutex<HashSet<ContentId>>; 6],
}

impl DedupCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `id` under `kind`.
    ///
    /// Returns true exactly once per (kind, id) pair; every later call
    /// returns false. Check and insert happen under one lock acquisition.
    pub fn try_claim(&self, kind: NodeKind, id: ContentId) -> bool {
        self.partition(kind).lock().insert(id)
    }

    /// Number of ids claimed under `kind`.
    pub fn claimed(&self, kind: NodeKind) -> usize {
        self.partition(kind).lock().len()
    }

    /// Total number of claimed ids across all kinds.
    pub fn len(&self) -> usize {
        self.partitions.iter().map(|p| p.lock().len()).sum()
    }

    /// Returns true if nothing has been claimed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn partition(&self, kind: NodeKind) -> &Mutex<HashSet<ContentId>> {
        let idx = match kind {
            NodeKind::Exe => 0,
            NodeKind::Dll => 1,
            NodeKind::Directory => 2,
            NodeKind::Principal => 3,
            NodeKind::Runner => 4,
            NodeKind::Dependency => 5,
        };
        &self.partitions[idx]
    }
}
