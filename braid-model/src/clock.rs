//! Lamport clock
//!
//! A per-log logical counter scoped by an owner id. It advances on append
//! and merges by taking the max of both times, so the tick following a
//! merge produces `max + 1` and clock times never regress across merges.

use std::cmp::Ordering;

/// Logical clock carried by every entry and by the log itself.
///
/// The owner id is the creating identity's id. Clock times order
/// causally-unrelated entries; the causal `next` relation always wins.
#[derive(Debug, Clone, PartialEq, Eq, Hash,
         borsh::BorshSerialize, borsh::BorshDeserialize,
         serde::Serialize, serde::Deserialize)]
pub struct LamportClock {
    /// Id of the identity this clock belongs to
    pub id: String,
    /// Logical time, starting at 0 for a fresh log
    pub time: u64,
}

impl LamportClock {
    /// Create a clock with an explicit time.
    pub fn new(id: impl Into<String>, time: u64) -> Self {
        Self { id: id.into(), time }
    }

    /// Create a clock at time 0 for the given owner.
    pub fn for_owner(id: impl Into<String>) -> Self {
        Self::new(id, 0)
    }

    /// Advance for a new local event.
    pub fn tick(&self) -> LamportClock {
        LamportClock::new(self.id.clone(), self.time + 1)
    }

    /// Merge with another clock, keeping this clock's owner.
    ///
    /// The merged time is `max(self.time, other.time)`; the next `tick`
    /// after a merge therefore yields `max + 1`.
    pub fn merge(&self, other: &LamportClock) -> LamportClock {
        LamportClock::new(self.id.clone(), self.time.max(other.time))
    }
}

impl Ord for LamportClock {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.time.cmp(&other.time) {
            Ordering::Equal => self.id.cmp(&other.id),
            other => other,
        }
    }
}

impl PartialOrd for LamportClock {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for LamportClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.id, self.time)
    }
}
