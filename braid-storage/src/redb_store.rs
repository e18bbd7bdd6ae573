//! Durable content-addressed store backed by redb
//!
//! Single table mapping BLAKE3 hash to blob bytes. Writes are committed
//! per put; a blob already present under its hash is not rewritten.

use std::path::Path;

use async_trait::async_trait;
use braid_model::{ContentStore, Hash, StorageError};
use redb::{Database, ReadableTable, TableDefinition};
use tracing::debug;

const ENTRIES_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("entries");

/// Content-addressed store persisting blobs in a redb database file.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open or create the database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(backend)?;

        // Ensure the table exists
        let write_txn = db.begin_write().map_err(backend)?;
        {
            let _ = write_txn.open_table(ENTRIES_TABLE).map_err(backend)?;
        }
        write_txn.commit().map_err(backend)?;

        debug!(path = %path.as_ref().display(), "Opened content store");
        Ok(Self { db })
    }
}

#[async_trait]
impl ContentStore for RedbStore {
    async fn put(&self, bytes: &[u8]) -> Result<Hash, StorageError> {
        let hash = Hash(blake3::hash(bytes).into());

        let write_txn = self.db.begin_write().map_err(backend)?;
        {
            let mut table = write_txn.open_table(ENTRIES_TABLE).map_err(backend)?;
            if table.get(hash.as_slice()).map_err(backend)?.is_none() {
                table.insert(hash.as_slice(), bytes).map_err(backend)?;
            }
        }
        write_txn.commit().map_err(backend)?;
        Ok(hash)
    }

    async fn get(&self, hash: &Hash) -> Result<Vec<u8>, StorageError> {
        let read_txn = self.db.begin_read().map_err(backend)?;
        let table = read_txn.open_table(ENTRIES_TABLE).map_err(backend)?;
        match table.get(hash.as_slice()).map_err(backend)? {
            Some(guard) => Ok(guard.value().to_vec()),
            None => Err(StorageError::NotFound(*hash)),
        }
    }

    async fn contains(&self, hash: &Hash) -> Result<bool, StorageError> {
        let read_txn = self.db.begin_read().map_err(backend)?;
        let table = read_txn.open_table(ENTRIES_TABLE).map_err(backend)?;
        Ok(table.get(hash.as_slice()).map_err(backend)?.is_some())
    }
}

fn backend(err: impl std::fmt::Display) -> StorageError {
    StorageError::Backend(err.to_string())
}
