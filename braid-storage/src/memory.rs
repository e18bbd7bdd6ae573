//! In-memory content-addressed store

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use braid_model::{ContentStore, Hash, StorageError};
use tracing::trace;

/// Content-addressed store holding blobs in a process-local map.
///
/// Blobs are keyed by the BLAKE3 hash of their bytes. Puts are idempotent.
/// Clone-free sharing goes through `Arc<MemoryStore>`.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<Hash, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn put(&self, bytes: &[u8]) -> Result<Hash, StorageError> {
        let hash = Hash(blake3::hash(bytes).into());
        let mut entries = self.entries.write().expect("lock poisoned");
        entries.entry(hash).or_insert_with(|| bytes.to_vec());
        trace!(hash = %hash, len = bytes.len(), "Stored blob");
        Ok(hash)
    }

    async fn get(&self, hash: &Hash) -> Result<Vec<u8>, StorageError> {
        let entries = self.entries.read().expect("lock poisoned");
        entries
            .get(hash)
            .cloned()
            .ok_or(StorageError::NotFound(*hash))
    }

    async fn contains(&self, hash: &Hash) -> Result<bool, StorageError> {
        let entries = self.entries.read().expect("lock poisoned");
        Ok(entries.contains_key(hash))
    }
}
