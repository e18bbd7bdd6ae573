//! Braid Model
//!
//! Pure data types and traits for braid logs, decoupled from storage
//! engines and the merge machinery.

pub mod clock;
pub mod identity;
pub mod storage;
pub mod types;

// Re-exports
pub use clock::LamportClock;
pub use identity::{Identity, IdentitySignatures};
pub use storage::{ContentStore, StorageError};
pub use types::{Hash, PubKey, Signature};
