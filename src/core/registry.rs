// MeshTail - core/registry.rs
//
// Bounded table of remote nodes learned from identity announcements.
// First-seen wins once full: known nodes keep refreshing, new ones are
// dropped. Entries are never evicted.

use crate::core::model::{Label, NodeAddress, SourceIdentity};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// A remembered remote node.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub identity: SourceIdentity,
    pub last_seen: Instant,
}

/// What `observe` did with an announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Known node; last-seen (and label, if given) refreshed.
    Refreshed,
    /// New node added.
    Inserted,
    /// New node ignored because the registry is full.
    DroppedFull,
}

/// One row of the node listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedNode {
    pub identity: SourceIdentity,
    pub is_local: bool,
    pub is_selected: bool,
    /// Time since the last announcement; `None` for the local node and for
    /// a selection synthesised because it was never observed.
    pub last_seen_ago: Option<Duration>,
}

pub struct NodeRegistry {
    entries: Mutex<Vec<RegistryEntry>>,
    capacity: usize,
}

impl NodeRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, Vec<RegistryEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record an announcement from `address`, with an optional label.
    pub fn observe(&self, address: NodeAddress, label: Option<&str>) -> Observation {
        self.observe_at(address, label, Instant::now())
    }

    fn observe_at(&self, address: NodeAddress, label: Option<&str>, now: Instant) -> Observation {
        let label = label.filter(|l| !l.trim_matches(char::from(0)).trim().is_empty());
        let mut entries = self.lock();
        if let Some(entry) = entries.iter_mut().find(|e| e.identity.address == address) {
            if let Some(l) = label {
                entry.identity.label = Label::new(l);
            }
            entry.last_seen = now;
            return Observation::Refreshed;
        }
        if entries.len() >= self.capacity {
            return Observation::DroppedFull;
        }
        entries.push(RegistryEntry {
            identity: SourceIdentity::new(address, label.map(Label::new).unwrap_or_default()),
            last_seen: now,
        });
        Observation::Inserted
    }

    /// Label last announced by `address`, if known.
    pub fn label_of(&self, address: NodeAddress) -> Option<Label> {
        self.lock()
            .iter()
            .find(|e| e.identity.address == address)
            .map(|e| e.identity.label.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The local node first, then each distinct remote node in first-seen
    /// order. The current selection is always present: if it was never
    /// observed (or did not fit) it is appended from `selected`.
    pub fn list(&self, local: &SourceIdentity, selected: &SourceIdentity) -> Vec<ListedNode> {
        let now = Instant::now();
        let mut out = vec![ListedNode {
            identity: local.clone(),
            is_local: true,
            is_selected: local == selected,
            last_seen_ago: None,
        }];
        {
            let entries = self.lock();
            out.extend(
                entries
                    .iter()
                    .filter(|e| e.identity != *local)
                    .map(|e| ListedNode {
                        identity: e.identity.clone(),
                        is_local: false,
                        is_selected: e.identity == *selected,
                        last_seen_ago: Some(now.saturating_duration_since(e.last_seen)),
                    }),
            );
        }
        if !out.iter().any(|n| n.is_selected) {
            out.push(ListedNode {
                identity: selected.clone(),
                is_local: false,
                is_selected: true,
                last_seen_ago: None,
            });
        }
        out
    }
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}
