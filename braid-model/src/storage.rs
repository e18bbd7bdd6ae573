//! Content-addressed storage boundary
//!
//! The log reads and writes serialized entries through this trait only.
//! Backends address blobs by the BLAKE3 hash of their bytes, so an entry's
//! storage address equals its content hash.

use crate::types::Hash;

/// Errors surfaced by storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No blob is stored under the requested address.
    #[error("entry not found: {0}")]
    NotFound(Hash),

    /// An I/O error occurred.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The underlying engine failed.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Trait for storing and retrieving serialized entries by content address.
///
/// All implementations must be `Send + Sync` for use across async tasks.
/// These calls are the log's only suspension points.
#[async_trait::async_trait]
pub trait ContentStore: Send + Sync {
    /// Persist a blob, returning the address it is stored under.
    async fn put(&self, bytes: &[u8]) -> Result<Hash, StorageError>;

    /// Fetch the blob stored under the given address.
    ///
    /// Fails with [`StorageError::NotFound`] when the address is unknown.
    async fn get(&self, hash: &Hash) -> Result<Vec<u8>, StorageError>;

    /// Check whether an address is present.
    async fn contains(&self, hash: &Hash) -> Result<bool, StorageError>;
}
