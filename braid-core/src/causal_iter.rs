//! Causal entry iterator - yields entries in causal order
//!
//! Topological traversal of the entry arena using a min-heap of ready
//! entries, so an entry is yielded only after everything in its `next` set,
//! and concurrent entries come out ordered by (clock time, hash).
//! Complexity: O(N log N) over N entries.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use braid_model::Hash;

use crate::entry::Entry;

/// A heap entry carrying the ordering key of a ready DAG node.
/// Uses reversed comparisons for min-heap behavior (lowest key first).
struct HeapEntry {
    time: u64,
    hash: Hash,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.hash == other.hash
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap (BinaryHeap is max-heap by default)
        (other.time, other.hash).cmp(&(self.time, self.hash))
    }
}

/// Iterator yielding entries in a deterministic causal linearization.
///
/// An entry never appears before an entry in its `next` set. Ties among
/// causally-incomparable entries break by clock time ascending, then hash,
/// so two arenas holding the same entries always produce the same sequence
/// regardless of insertion history.
pub struct CausalIter<'a> {
    entries: &'a HashMap<Hash, Entry>,
    /// parent hash -> entries waiting on it
    dependents: HashMap<Hash, Vec<Hash>>,
    /// entry hash -> number of predecessors not yet yielded
    pending: HashMap<Hash, usize>,
    ready: BinaryHeap<HeapEntry>,
}

impl<'a> CausalIter<'a> {
    /// Create an iterator over an entry arena.
    ///
    /// The arena is ancestor-complete by log construction: every hash in a
    /// `next` set is present as a key.
    pub fn new(entries: &'a HashMap<Hash, Entry>) -> Self {
        let mut dependents: HashMap<Hash, Vec<Hash>> = HashMap::new();
        let mut pending = HashMap::new();
        let mut ready = BinaryHeap::new();

        for (hash, entry) in entries {
            if entry.next.is_empty() {
                ready.push(HeapEntry {
                    time: entry.clock.time,
                    hash: *hash,
                });
            } else {
                pending.insert(*hash, entry.next.len());
                for parent in &entry.next {
                    dependents.entry(*parent).or_default().push(*hash);
                }
            }
        }

        Self {
            entries,
            dependents,
            pending,
            ready,
        }
    }
}

impl<'a> Iterator for CausalIter<'a> {
    type Item = &'a Entry;

    fn next(&mut self) -> Option<Self::Item> {
        let HeapEntry { hash, .. } = self.ready.pop()?;

        if let Some(children) = self.dependents.remove(&hash) {
            for child in children {
                if let Some(left) = self.pending.get_mut(&child) {
                    *left -= 1;
                    if *left == 0 {
                        self.pending.remove(&child);
                        let entry = &self.entries[&child];
                        self.ready.push(HeapEntry {
                            time: entry.clock.time,
                            hash: child,
                        });
                    }
                }
            }
        }

        Some(&self.entries[&hash])
    }
}
