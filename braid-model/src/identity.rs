//! Identity credential data
//!
//! The public portion of a writer's identity: a stable id, an Ed25519
//! public key, and the provider-issued signatures binding the two together.
//! Private key material never appears here; it stays with the identity
//! provider that created the credential.

use crate::types::{PubKey, Signature};

/// Provider-issued signatures binding an identity's id to its public key.
#[derive(Debug, Clone, PartialEq, Eq,
         borsh::BorshSerialize, borsh::BorshDeserialize,
         serde::Serialize, serde::Deserialize)]
pub struct IdentitySignatures {
    /// Signature over the identity's id bytes
    pub id: Signature,
    /// Signature over the public key bytes followed by the id signature
    pub public_key: Signature,
}

/// A writer's credential. Immutable once obtained.
#[derive(Debug, Clone, PartialEq, Eq,
         borsh::BorshSerialize, borsh::BorshDeserialize,
         serde::Serialize, serde::Deserialize)]
pub struct Identity {
    /// Stable external identifier
    pub id: String,
    /// Ed25519 public key used to sign entries
    pub public_key: PubKey,
    /// Signatures binding `id` to `public_key`
    pub signatures: IdentitySignatures,
}

impl Identity {
    pub fn new(id: impl Into<String>, public_key: PubKey, signatures: IdentitySignatures) -> Self {
        Self {
            id: id.into(),
            public_key,
            signatures,
        }
    }
}
