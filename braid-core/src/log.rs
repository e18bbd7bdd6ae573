//! Append-only log over a content-addressed entry DAG
//!
//! A `Log` is a grow-only set of signed entries keyed by content hash,
//! together with the current heads (entries no other entry references)
//! and a Lamport clock. Logs sharing an id merge with `join`, which is
//! commutative, associative, and idempotent: replicas that have seen the
//! same entries hold the same state, no matter the order of exchange.
//!
//! A `Log` instance is single-writer. Callers must serialize `append` and
//! `join` on the same instance; the log takes no internal locks.

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use braid_model::{ContentStore, Hash, Identity, LamportClock, StorageError};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::access::AccessController;
use crate::causal_iter::CausalIter;
use crate::entry::{Entry, EntryError};
use crate::identity::IdentityProvider;

/// Errors surfaced by log construction, `append`, and `join`.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("Access controller is required")]
    AccessControllerRequired,

    #[error("Identity is required")]
    IdentityRequired,

    #[error("Entry storage is required")]
    StorageRequired,

    #[error("Identity provider is required")]
    IdentityProviderRequired,

    /// The access controller rejected the writing identity.
    #[error("Could not append entry, key \"{id}\" is not allowed to write to the log")]
    WriteNotAllowed { id: String },

    #[error(transparent)]
    Entry(#[from] EntryError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Builder for [`Log`]. All collaborators except the id are required.
#[derive(Default)]
pub struct LogBuilder {
    id: Option<String>,
    identity: Option<Identity>,
    identities: Option<Arc<dyn IdentityProvider>>,
    access: Option<Box<dyn AccessController>>,
    store: Option<Arc<dyn ContentStore>>,
}

impl LogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log id. Logs only merge with logs carrying the same id.
    /// Defaults to a fresh UUID when omitted.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Content-addressed store entries are persisted to and fetched from.
    pub fn with_store(mut self, store: Arc<dyn ContentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Access controller consulted on every append and join candidate.
    pub fn with_access(mut self, access: impl AccessController + 'static) -> Self {
        self.access = Some(Box::new(access));
        self
    }

    /// Identity provider used for signing and verification.
    pub fn with_identities(mut self, identities: Arc<dyn IdentityProvider>) -> Self {
        self.identities = Some(identities);
        self
    }

    /// The local writing identity.
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn build(self) -> Result<Log, LogError> {
        let access = self.access.ok_or(LogError::AccessControllerRequired)?;
        let identity = self.identity.ok_or(LogError::IdentityRequired)?;
        let store = self.store.ok_or(LogError::StorageRequired)?;
        let identities = self.identities.ok_or(LogError::IdentityProviderRequired)?;
        let id = self.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let clock = LamportClock::for_owner(identity.id.clone());

        Ok(Log {
            id,
            identity,
            identities,
            access,
            store,
            entries: HashMap::new(),
            heads: BTreeSet::new(),
            clock,
        })
    }
}

/// Signed, content-addressed, peer-mergeable append-only log.
pub struct Log {
    id: String,
    identity: Identity,
    identities: Arc<dyn IdentityProvider>,
    access: Box<dyn AccessController>,
    store: Arc<dyn ContentStore>,
    entries: HashMap<Hash, Entry>,
    heads: BTreeSet<Hash>,
    clock: LamportClock,
}

impl std::fmt::Debug for Log {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Log")
            .field("id", &self.id)
            .field("identity", &self.identity.id)
            .field("entries", &self.entries.len())
            .field("heads", &self.heads)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl Log {
    pub fn builder() -> LogBuilder {
        LogBuilder::new()
    }

    /// Reconstruct a log from head hashes, resolving every reachable
    /// ancestor through the store. Entries are validated on the way in.
    pub async fn from_entry_hashes(
        store: Arc<dyn ContentStore>,
        access: impl AccessController + 'static,
        identities: Arc<dyn IdentityProvider>,
        identity: Identity,
        id: impl Into<String>,
        heads: &[Hash],
    ) -> Result<Log, LogError> {
        let mut log = Log::builder()
            .with_id(id)
            .with_store(store)
            .with_access(access)
            .with_identities(identities)
            .with_identity(identity)
            .build()?;
        log.join_heads(heads).await?;
        Ok(log)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn clock(&self) -> &LamportClock {
        &self.clock
    }

    /// Current tips: hashes no admitted entry references in `next`.
    pub fn heads(&self) -> &BTreeSet<Hash> {
        &self.heads
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, hash: &Hash) -> Option<&Entry> {
        self.entries.get(hash)
    }

    pub fn has(&self, hash: &Hash) -> bool {
        self.entries.contains_key(hash)
    }

    pub fn access(&self) -> &dyn AccessController {
        self.access.as_ref()
    }

    /// Replace the access controller.
    ///
    /// Future appends and joins are checked against the new controller;
    /// entries already admitted are not re-checked. Not synchronized
    /// against in-flight operations; callers sequence the swap.
    pub fn set_access(&mut self, access: impl AccessController + 'static) {
        self.access = Box::new(access);
    }

    /// Entries in a deterministic causal order: an entry never precedes a
    /// member of its `next` set, concurrent entries order by clock time
    /// then hash. Identical entry sets linearize identically.
    pub fn values(&self) -> CausalIter<'_> {
        CausalIter::new(&self.entries)
    }

    /// Entries with an empty `next` set, the roots of the DAG,
    /// ordered by clock time then hash.
    pub fn tails(&self) -> Vec<&Entry> {
        let mut tails: Vec<&Entry> = self
            .entries
            .values()
            .filter(|entry| entry.next.is_empty())
            .collect();
        tails.sort_by_key(|entry| (entry.clock.time, entry.hash()));
        tails
    }

    /// Walk backwards from `from` through `next` references, newest first.
    /// `amount` caps the number of entries returned.
    pub fn traverse(&self, from: &[Hash], amount: Option<usize>) -> Vec<&Entry> {
        let limit = amount.unwrap_or(usize::MAX);
        let mut stack: Vec<Hash> = from.to_vec();
        let mut seen: HashSet<Hash> = HashSet::new();
        let mut found: Vec<(u64, Hash)> = Vec::new();

        while let Some(hash) = stack.pop() {
            if !seen.insert(hash) {
                continue;
            }
            if let Some(entry) = self.entries.get(&hash) {
                found.push((entry.clock.time, hash));
                stack.extend(entry.next.iter().copied());
            }
        }

        found.sort_by_key(|key| Reverse(*key));
        found
            .into_iter()
            .take(limit)
            .map(|(_, hash)| &self.entries[&hash])
            .collect()
    }

    /// Append a payload as a new entry.
    ///
    /// The entry links to the current heads, carries the ticked clock, and
    /// is signed by the local identity. Fails without any state change if
    /// the access controller denies the local identity or the store put
    /// fails; on success the entry is persisted and becomes the sole head.
    pub async fn append(&mut self, payload: impl Into<Vec<u8>>) -> Result<Entry, LogError> {
        let clock = self.clock.tick();
        let next: Vec<Hash> = self.heads.iter().copied().collect();

        let entry = Entry::create(
            self.id.clone(),
            payload,
            next.clone(),
            clock.clone(),
            &self.identity,
            self.identities.as_ref(),
        )?;

        if !self.access.can_append(&entry) {
            return Err(LogError::WriteNotAllowed {
                id: self.identity.id.clone(),
            });
        }

        let hash = entry.hash();
        let stored = self.store.put(&entry.to_bytes()).await?;
        debug_assert_eq!(stored, hash);

        self.entries.insert(hash, entry.clone());
        for parent in &next {
            self.heads.remove(parent);
        }
        self.heads.insert(hash);
        self.clock = clock;

        debug!(log_id = %self.id, hash = %hash, time = self.clock.time, "Appended entry");
        Ok(entry)
    }

    /// Merge another log into this one.
    ///
    /// Joining a log with a different id is a no-op. Otherwise every entry
    /// of `other` not already present is validated (structure, signature,
    /// access) against this log's current state; if any candidate fails,
    /// the whole join fails and this log is left exactly as it was. On
    /// success the entry sets union, heads are recomputed, and the clock
    /// merges keeping this log's owner.
    pub async fn join(&mut self, other: &Log) -> Result<(), LogError> {
        if other.id != self.id {
            trace!(ours = %self.id, theirs = %other.id, "Join skipped, log ids differ");
            return Ok(());
        }

        let mut candidates: Vec<(Hash, Entry)> = other
            .entries
            .iter()
            .filter(|(hash, _)| !self.entries.contains_key(*hash))
            .map(|(hash, entry)| (*hash, entry.clone()))
            .collect();
        candidates.sort_by_key(|(hash, entry)| (entry.clock.time, *hash));

        for (_, entry) in &candidates {
            self.check_entry(entry)?;
        }

        let admitted = candidates.len();
        for (hash, entry) in candidates {
            self.entries.insert(hash, entry);
        }
        self.heads = find_heads(&self.entries);
        self.clock = self.clock.merge(&other.clock);

        debug!(log_id = %self.id, admitted, total = self.entries.len(), "Joined log");
        Ok(())
    }

    /// Merge loose entries, resolving missing ancestors through the store.
    ///
    /// Ancestor resolution is memoized: hashes already admitted or already
    /// fetched in this call are not fetched or verified again. Validation
    /// and admission follow the same all-or-nothing rule as [`Log::join`];
    /// an unresolvable ancestor fails the whole join.
    pub async fn join_entries(&mut self, entries: Vec<Entry>) -> Result<(), LogError> {
        let mut candidates: HashMap<Hash, Entry> = HashMap::new();
        let mut missing: Vec<Hash> = Vec::new();

        for entry in entries {
            let hash = entry.hash();
            if self.entries.contains_key(&hash) || candidates.contains_key(&hash) {
                continue;
            }
            missing.extend(entry.next.iter().copied());
            candidates.insert(hash, entry);
        }

        while let Some(hash) = missing.pop() {
            if self.entries.contains_key(&hash) || candidates.contains_key(&hash) {
                continue;
            }
            let entry = self.fetch_entry(&hash).await?;
            missing.extend(entry.next.iter().copied());
            candidates.insert(hash, entry);
        }

        let mut pending: Vec<(Hash, Entry)> = candidates.into_iter().collect();
        pending.sort_by_key(|(hash, entry)| (entry.clock.time, *hash));

        for (_, entry) in &pending {
            self.check_entry(entry)?;
        }

        let mut clock = self.clock.clone();
        for (_, entry) in &pending {
            clock = clock.merge(&entry.clock);
        }

        let admitted = pending.len();
        for (hash, entry) in pending {
            self.entries.insert(hash, entry);
        }
        self.heads = find_heads(&self.entries);
        self.clock = clock;

        debug!(log_id = %self.id, admitted, total = self.entries.len(), "Joined entries");
        Ok(())
    }

    /// Merge from head hashes alone, fetching the heads and every missing
    /// ancestor through the store. Duplicate and already admitted heads
    /// are not fetched again.
    pub async fn join_heads(&mut self, heads: &[Hash]) -> Result<(), LogError> {
        let mut entries = Vec::with_capacity(heads.len());
        let mut seen: HashSet<Hash> = HashSet::with_capacity(heads.len());
        for hash in heads {
            if self.entries.contains_key(hash) || !seen.insert(*hash) {
                continue;
            }
            entries.push(self.fetch_entry(hash).await?);
        }
        self.join_entries(entries).await
    }

    /// Fetch one entry from the store and check it decodes to the
    /// requested address.
    async fn fetch_entry(&self, hash: &Hash) -> Result<Entry, LogError> {
        let bytes = self.store.get(hash).await?;
        let entry = Entry::from_bytes(&bytes)?;
        let got = entry.hash();
        if got != *hash {
            warn!(expected = %hash, got = %got, "Fetched entry does not match its address");
            return Err(EntryError::HashMismatch {
                expected: *hash,
                got,
            }
            .into());
        }
        Ok(entry)
    }

    /// Validate one join candidate against current log state:
    /// structure, signature, then access.
    fn check_entry(&self, entry: &Entry) -> Result<(), LogError> {
        entry.validate(&self.id)?;
        entry.verify(self.identities.as_ref())?;
        if !self.access.can_append(entry) {
            return Err(LogError::WriteNotAllowed {
                id: entry.identity.id.clone(),
            });
        }
        Ok(())
    }
}

/// Heads of an entry set: hashes not referenced by any entry's `next`.
fn find_heads(entries: &HashMap<Hash, Entry>) -> BTreeSet<Hash> {
    let mut referenced: HashSet<Hash> = HashSet::new();
    for entry in entries.values() {
        referenced.extend(entry.next.iter().copied());
    }
    entries
        .keys()
        .filter(|hash| !referenced.contains(*hash))
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{AllowAll, DenyAll};
    use crate::identity::KeystoreProvider;
    use braid_storage::MemoryStore;

    fn test_log(id: &str, who: &str) -> Log {
        let provider = Arc::new(KeystoreProvider::in_memory());
        let identity = provider.create_identity(who).unwrap();
        Log::builder()
            .with_id(id)
            .with_store(Arc::new(MemoryStore::new()))
            .with_access(AllowAll)
            .with_identities(provider)
            .with_identity(identity)
            .build()
            .unwrap()
    }

    fn payloads(log: &Log) -> Vec<String> {
        log.values()
            .map(|e| String::from_utf8(e.payload.clone()).unwrap())
            .collect()
    }

    #[test]
    fn test_builder_requires_access_controller() {
        let err = Log::builder().build().unwrap_err();
        assert_eq!(err.to_string(), "Access controller is required");
    }

    #[test]
    fn test_builder_requires_identity() {
        let err = Log::builder().with_access(AllowAll).build().unwrap_err();
        assert_eq!(err.to_string(), "Identity is required");
    }

    #[test]
    fn test_builder_requires_store() {
        let provider = KeystoreProvider::in_memory();
        let identity = provider.create_identity("alice").unwrap();
        let err = Log::builder()
            .with_access(AllowAll)
            .with_identity(identity)
            .build()
            .unwrap_err();
        assert_eq!(err.to_string(), "Entry storage is required");
    }

    #[test]
    fn test_builder_requires_identity_provider() {
        let provider = KeystoreProvider::in_memory();
        let identity = provider.create_identity("alice").unwrap();
        let err = Log::builder()
            .with_access(AllowAll)
            .with_identity(identity)
            .with_store(Arc::new(MemoryStore::new()))
            .build()
            .unwrap_err();
        assert_eq!(err.to_string(), "Identity provider is required");
    }

    #[test]
    fn test_builder_keeps_given_id() {
        let log = test_log("log-a", "alice");
        assert_eq!(log.id(), "log-a");
    }

    #[test]
    fn test_builder_defaults_to_unique_id() {
        let provider = Arc::new(KeystoreProvider::in_memory());
        let identity = provider.create_identity("alice").unwrap();
        let a = Log::builder()
            .with_store(Arc::new(MemoryStore::new()))
            .with_access(AllowAll)
            .with_identities(provider.clone())
            .with_identity(identity.clone())
            .build()
            .unwrap();
        let b = Log::builder()
            .with_store(Arc::new(MemoryStore::new()))
            .with_access(AllowAll)
            .with_identities(provider)
            .with_identity(identity)
            .build()
            .unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn test_append_links_and_advances_clock() {
        let mut log = test_log("log-a", "alice");
        assert!(log.is_empty());

        let first = log.append("one").await.unwrap();
        assert!(first.next.is_empty());
        assert_eq!(first.clock.time, 1);
        assert_eq!(log.len(), 1);
        assert!(log.heads().contains(&first.hash()));

        let second = log.append("two").await.unwrap();
        assert_eq!(second.next, vec![first.hash()]);
        assert_eq!(second.clock.time, 2);
        assert_eq!(log.clock().time, 2);
        assert_eq!(log.heads().len(), 1);
        assert!(log.heads().contains(&second.hash()));
        assert!(log.has(&first.hash()));
    }

    #[tokio::test]
    async fn test_append_carries_local_identity_and_signature() {
        let mut log = test_log("log-a", "alice");
        let entry = log.append("one").await.unwrap();
        assert_eq!(&entry.identity, log.identity());
        assert!(entry.sig.is_some());
        assert_eq!(entry.key, Some(log.identity().public_key));
    }

    #[tokio::test]
    async fn test_append_stores_entry_at_its_hash() {
        let provider = Arc::new(KeystoreProvider::in_memory());
        let identity = provider.create_identity("alice").unwrap();
        let store = Arc::new(MemoryStore::new());
        let mut log = Log::builder()
            .with_id("log-a")
            .with_store(store.clone())
            .with_access(AllowAll)
            .with_identities(provider)
            .with_identity(identity)
            .build()
            .unwrap();

        let entry = log.append("one").await.unwrap();
        let bytes = store.get(&entry.hash()).await.unwrap();
        assert_eq!(Entry::from_bytes(&bytes).unwrap(), entry);
    }

    #[tokio::test]
    async fn test_denied_append_leaves_log_unchanged() {
        let provider = Arc::new(KeystoreProvider::in_memory());
        let identity = provider.create_identity("alice").unwrap();
        let mut log = Log::builder()
            .with_id("log-a")
            .with_store(Arc::new(MemoryStore::new()))
            .with_access(DenyAll)
            .with_identities(provider)
            .with_identity(identity)
            .build()
            .unwrap();

        let err = log.append("one").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Could not append entry, key \"alice\" is not allowed to write to the log"
        );
        assert!(log.is_empty());
        assert!(log.heads().is_empty());
        assert_eq!(log.clock().time, 0);
    }

    #[tokio::test]
    async fn test_access_controller_is_swappable() {
        let mut log = test_log("log-a", "alice");
        log.append("one").await.unwrap();

        log.set_access(DenyAll);
        assert!(log.append("two").await.is_err());

        log.set_access(AllowAll);
        log.append("three").await.unwrap();
        assert_eq!(log.len(), 2);
    }

    #[tokio::test]
    async fn test_values_follow_append_order() {
        let mut log = test_log("log-a", "alice");
        log.append("one").await.unwrap();
        log.append("two").await.unwrap();
        log.append("three").await.unwrap();
        assert_eq!(payloads(&log), vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_tails_are_the_roots() {
        let mut log = test_log("log-a", "alice");
        let first = log.append("one").await.unwrap();
        log.append("two").await.unwrap();

        let tails = log.tails();
        assert_eq!(tails.len(), 1);
        assert_eq!(tails[0].hash(), first.hash());
    }

    #[tokio::test]
    async fn test_traverse_newest_first_with_limit() {
        let mut log = test_log("log-a", "alice");
        log.append("one").await.unwrap();
        let second = log.append("two").await.unwrap();
        let third = log.append("three").await.unwrap();

        let from: Vec<Hash> = log.heads().iter().copied().collect();
        let walked = log.traverse(&from, Some(2));
        assert_eq!(walked.len(), 2);
        assert_eq!(walked[0].hash(), third.hash());
        assert_eq!(walked[1].hash(), second.hash());

        let all = log.traverse(&from, None);
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_get_returns_admitted_entry() {
        let mut log = test_log("log-a", "alice");
        let entry = log.append("one").await.unwrap();
        assert_eq!(log.get(&entry.hash()), Some(&entry));
        assert_eq!(log.get(&Hash::ZERO), None);
    }
}
