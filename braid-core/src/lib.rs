//! Braid Core
//!
//! A signed, content-addressed, append-only log that merges across peers:
//! - **Entry**: Immutable signed record, addressed by its content hash
//! - **Log**: Entry DAG with heads, Lamport clock, append and join
//! - **CausalIter**: Deterministic causal linearization of a log
//! - **AccessController**: Capability deciding who may append
//! - **Keystore**: Ed25519 signing keys, in memory or on disk
//! - **KeystoreProvider**: Identity creation, signing, and verification
//!
//! Two logs sharing an id converge under `join` no matter the order of
//! exchange; join admits all of a peer's entries or none of them.

pub mod access;
pub mod causal_iter;
pub mod entry;
pub mod identity;
pub mod log;

pub use access::{AccessController, AllowAll, AllowList, DenyAll};
pub use causal_iter::CausalIter;
pub use entry::{Entry, EntryError};
pub use identity::{verify_signature, IdentityError, IdentityProvider, Keystore, KeystoreProvider};
pub use log::{Log, LogBuilder, LogError};

pub use braid_model::{
    ContentStore, Hash, Identity, IdentitySignatures, LamportClock, PubKey, Signature,
    StorageError,
};
