//! Braid Storage
//!
//! Content-addressed store backends:
//! - **MemoryStore**: In-process map, for tests and ephemeral logs
//! - **RedbStore**: Durable single-file store backed by redb
//!
//! Both address a blob by the BLAKE3 hash of its bytes, so the storage
//! address of a serialized entry equals the entry's content hash.

pub mod memory;
pub mod redb_store;

pub use memory::MemoryStore;
pub use redb_store::RedbStore;
