//! Entries: immutable, content-addressed, signed records
//!
//! An entry's signature covers the Borsh tuple `(log_id, payload, next,
//! clock, key)`. Its content address is `blake3` over the Borsh encoding of
//! the whole entry, which also covers `identity` and `sig`, so both forgery
//! and tampering change the address.

use borsh::{BorshDeserialize, BorshSerialize};
use braid_model::{Hash, Identity, LamportClock, PubKey, Signature};
use thiserror::Error;

use crate::identity::{IdentityError, IdentityProvider};

/// Errors raised while building or checking entries.
#[derive(Error, Debug)]
pub enum EntryError {
    #[error("Entry doesn't have a key")]
    MissingKey,

    #[error("Entry doesn't have a signature")]
    MissingSignature,

    #[error("Could not validate signature \"{sig}\" for entry \"{hash}\" and key \"{key}\"")]
    InvalidSignature {
        sig: Signature,
        hash: Hash,
        key: PubKey,
    },

    #[error("entry belongs to log \"{got}\", expected \"{expected}\"")]
    WrongLog { expected: String, got: String },

    #[error("entry hash mismatch: expected {expected}, got {got}")]
    HashMismatch { expected: Hash, got: Hash },

    #[error("entry decode failed: {0}")]
    Decode(borsh::io::Error),

    #[error(transparent)]
    Identity(#[from] IdentityError),
}

/// An immutable record in the log.
///
/// `next` holds the content hashes of the direct causal predecessors,
/// sorted lexically; a root entry has none. `key` and `sig` are optional at
/// the representation level so that malformed foreign entries can be decoded
/// and rejected; entries built by [`Entry::create`] always carry both.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Entry {
    /// Id of the log this entry belongs to
    pub log_id: String,
    /// Application data, opaque to the log
    pub payload: Vec<u8>,
    /// Direct causal predecessors, sorted lexically
    pub next: Vec<Hash>,
    /// Logical time of creation, owned by the creating identity
    pub clock: LamportClock,
    /// Creator's credential (public portion)
    pub identity: Identity,
    /// Denormalized copy of the creator's public key
    pub key: Option<PubKey>,
    /// Signature over the canonical signed portion
    pub sig: Option<Signature>,
}

impl Entry {
    /// Build and sign a new entry.
    ///
    /// Sorts and dedupes `next`, copies the identity's public key into
    /// `key`, and signs through the provider.
    pub fn create(
        log_id: impl Into<String>,
        payload: impl Into<Vec<u8>>,
        mut next: Vec<Hash>,
        clock: LamportClock,
        identity: &Identity,
        identities: &dyn IdentityProvider,
    ) -> Result<Entry, EntryError> {
        next.sort();
        next.dedup();

        let mut entry = Entry {
            log_id: log_id.into(),
            payload: payload.into(),
            next,
            clock,
            identity: identity.clone(),
            key: Some(identity.public_key),
            sig: None,
        };
        let sig = identities.sign(identity, &entry.signed_bytes()?)?;
        entry.sig = Some(sig);
        Ok(entry)
    }

    /// Canonical bytes covered by the signature:
    /// the Borsh tuple `(log_id, payload, next, clock, key)`.
    pub fn signed_bytes(&self) -> Result<Vec<u8>, EntryError> {
        let key = self.key.as_ref().ok_or(EntryError::MissingKey)?;
        let bytes = borsh::to_vec(&(&self.log_id, &self.payload, &self.next, &self.clock, key))
            .expect("borsh serialization cannot fail");
        Ok(bytes)
    }

    /// Serialize to canonical Borsh bytes, the form stored and hashed.
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("borsh serialization cannot fail")
    }

    /// Deserialize from canonical Borsh bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Entry, EntryError> {
        borsh::from_slice(bytes).map_err(EntryError::Decode)
    }

    /// Compute the content address: `blake3(borsh(self))`.
    pub fn hash(&self) -> Hash {
        Hash(blake3::hash(&self.to_bytes()).into())
    }

    /// Structural validity: required fields present, entry targets this log.
    /// The key is checked before the signature.
    pub fn validate(&self, log_id: &str) -> Result<(), EntryError> {
        if self.log_id != log_id {
            return Err(EntryError::WrongLog {
                expected: log_id.to_string(),
                got: self.log_id.clone(),
            });
        }
        if self.key.is_none() {
            return Err(EntryError::MissingKey);
        }
        if self.sig.is_none() {
            return Err(EntryError::MissingSignature);
        }
        Ok(())
    }

    /// Verify the signature against the entry's own `key`.
    pub fn verify(&self, identities: &dyn IdentityProvider) -> Result<(), EntryError> {
        let key = self.key.ok_or(EntryError::MissingKey)?;
        let sig = self.sig.ok_or(EntryError::MissingSignature)?;
        if !identities.verify(&sig, &key, &self.signed_bytes()?) {
            return Err(EntryError::InvalidSignature {
                sig,
                hash: self.hash(),
                key,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::KeystoreProvider;

    fn test_entry(provider: &KeystoreProvider, payload: &str, next: Vec<Hash>) -> Entry {
        let identity = provider.create_identity("alice").unwrap();
        Entry::create(
            "log-a",
            payload,
            next,
            LamportClock::new("alice", 1),
            &identity,
            provider,
        )
        .unwrap()
    }

    #[test]
    fn test_create_signs_and_verifies() {
        let provider = KeystoreProvider::in_memory();
        let entry = test_entry(&provider, "one", vec![]);

        assert!(entry.key.is_some());
        assert!(entry.sig.is_some());
        assert!(entry.verify(&provider).is_ok());
    }

    #[test]
    fn test_hash_is_deterministic() {
        let provider = KeystoreProvider::in_memory();
        let a = test_entry(&provider, "one", vec![]);
        let b = test_entry(&provider, "one", vec![]);
        // Ed25519 signing is deterministic, so identical fields reproduce
        // the identical entry and address.
        assert_eq!(a, b);
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn test_different_payload_different_hash() {
        let provider = KeystoreProvider::in_memory();
        let a = test_entry(&provider, "one", vec![]);
        let b = test_entry(&provider, "two", vec![]);
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_next_is_sorted_and_deduped() {
        let provider = KeystoreProvider::in_memory();
        let h1 = Hash([1u8; 32]);
        let h2 = Hash([2u8; 32]);

        let entry = test_entry(&provider, "one", vec![h2, h1, h2]);
        assert_eq!(entry.next, vec![h1, h2]);
    }

    #[test]
    fn test_tampered_payload_fails_verification() {
        let provider = KeystoreProvider::in_memory();
        let mut entry = test_entry(&provider, "one", vec![]);
        entry.payload = b"two".to_vec();

        assert!(matches!(
            entry.verify(&provider),
            Err(EntryError::InvalidSignature { .. })
        ));
    }

    #[test]
    fn test_tampered_signature_fails_verification() {
        let provider = KeystoreProvider::in_memory();
        let mut entry = test_entry(&provider, "one", vec![]);
        let mut sig = entry.sig.unwrap();
        sig.0[0] ^= 0xFF;
        entry.sig = Some(sig);

        let err = entry.verify(&provider).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!(
                "Could not validate signature \"{}\" for entry \"{}\" and key \"{}\"",
                sig,
                entry.hash(),
                entry.key.unwrap()
            )
        );
    }

    #[test]
    fn test_missing_key_message() {
        let provider = KeystoreProvider::in_memory();
        let mut entry = test_entry(&provider, "one", vec![]);
        entry.key = None;

        let err = entry.verify(&provider).unwrap_err();
        assert_eq!(err.to_string(), "Entry doesn't have a key");
    }

    #[test]
    fn test_missing_signature_message() {
        let provider = KeystoreProvider::in_memory();
        let mut entry = test_entry(&provider, "one", vec![]);
        entry.sig = None;

        let err = entry.verify(&provider).unwrap_err();
        assert_eq!(err.to_string(), "Entry doesn't have a signature");
    }

    #[test]
    fn test_validate_checks_log_id() {
        let provider = KeystoreProvider::in_memory();
        let entry = test_entry(&provider, "one", vec![]);

        assert!(entry.validate("log-a").is_ok());
        assert!(matches!(
            entry.validate("log-b"),
            Err(EntryError::WrongLog { .. })
        ));
    }

    #[test]
    fn test_bytes_roundtrip() {
        let provider = KeystoreProvider::in_memory();
        let entry = test_entry(&provider, "one", vec![Hash([9u8; 32])]);

        let bytes = entry.to_bytes();
        let decoded = Entry::from_bytes(&bytes).unwrap();
        assert_eq!(entry, decoded);
        assert_eq!(entry.hash(), decoded.hash());
    }

    #[test]
    fn test_signature_covers_clock() {
        let provider = KeystoreProvider::in_memory();
        let mut entry = test_entry(&provider, "one", vec![]);
        entry.clock = LamportClock::new("alice", 99);

        assert!(entry.verify(&provider).is_err());
    }
}
