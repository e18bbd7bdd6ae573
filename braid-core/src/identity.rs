//! Identity keys and the identity provider boundary
//!
//! Each writer identity has an Ed25519 keypair:
//! - Private key: held by the local [`Keystore`] (never replicated)
//! - Public key: embedded in the [`Identity`] credential and in every entry
//!
//! The log consumes identities and signatures through [`IdentityProvider`];
//! it never touches private key material itself.

use braid_model::{Identity, IdentitySignatures, PubKey, Signature};
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur during key and identity operations
#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("No signing key for identity \"{0}\"")]
    KeyNotFound(String),
}

/// Provider of identities and the sign/verify primitives around them.
///
/// Signing and verification are CPU-bound in the bundled implementation, so
/// this is a blocking trait; the storage adapter is the async boundary.
pub trait IdentityProvider: Send + Sync {
    /// Create (or re-derive) the credential for an id.
    fn create_identity(&self, id: &str) -> Result<Identity, IdentityError>;

    /// Sign a message on behalf of an identity.
    fn sign(&self, identity: &Identity, message: &[u8]) -> Result<Signature, IdentityError>;

    /// Verify a signature against a public key.
    fn verify(&self, signature: &Signature, key: &PubKey, message: &[u8]) -> bool;

    /// Check the provider-issued signatures binding id and key.
    fn verify_identity(&self, identity: &Identity) -> bool;
}

/// Ed25519 keys indexed by identity id, optionally persisted to a directory.
///
/// With a directory, each key lives in its own seed file named by the BLAKE3
/// hash of the id, and `create_key` loads an existing file rather than
/// generating a fresh key, so identities survive restarts.
pub struct Keystore {
    keys: RwLock<HashMap<String, SigningKey>>,
    dir: Option<PathBuf>,
}

impl Keystore {
    /// Keystore that holds keys in memory only.
    pub fn in_memory() -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
            dir: None,
        }
    }

    /// Keystore persisting one seed file per identity id under `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, IdentityError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            keys: RwLock::new(HashMap::new()),
            dir: Some(dir),
        })
    }

    fn key_path(&self, id: &str) -> Option<PathBuf> {
        self.dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.key", hex::encode(blake3::hash(id.as_bytes()).as_bytes()))))
    }

    /// Get the key for an id, loading or generating it as needed.
    /// Returns the public half. Concurrent calls for the same id all
    /// observe the same key.
    pub fn create_key(&self, id: &str) -> Result<PubKey, IdentityError> {
        // Check and insert hold the same write lock; racing callers must
        // agree on one key per id.
        let mut keys = self.keys.write().expect("lock poisoned");
        if let Some(key) = keys.get(id) {
            return Ok(PubKey::from(key.verifying_key().to_bytes()));
        }

        let key = match self.key_path(id) {
            Some(path) if path.exists() => {
                let key = load_key(&path)?;
                debug!(id, "Loaded signing key");
                key
            }
            Some(path) => {
                let key = SigningKey::generate(&mut OsRng);
                save_key(&path, &key)?;
                debug!(id, "Generated signing key");
                key
            }
            None => SigningKey::generate(&mut OsRng),
        };

        let public_key = PubKey::from(key.verifying_key().to_bytes());
        keys.insert(id.to_string(), key);
        Ok(public_key)
    }

    /// Whether a key exists for the id, in memory or on disk.
    pub fn has_key(&self, id: &str) -> bool {
        if self.keys.read().expect("lock poisoned").contains_key(id) {
            return true;
        }
        self.key_path(id).map(|p| p.exists()).unwrap_or(false)
    }

    /// Sign a message with the key held for `id`.
    pub fn sign_with(&self, id: &str, message: &[u8]) -> Result<Signature, IdentityError> {
        if let Some(key) = self.keys.read().expect("lock poisoned").get(id) {
            return Ok(Signature(key.sign(message).to_bytes()));
        }
        // Not cached yet; the seed file may still exist from a prior run.
        if let Some(path) = self.key_path(id) {
            if path.exists() {
                let key = load_key(&path)?;
                let sig = Signature(key.sign(message).to_bytes());
                self.keys
                    .write()
                    .expect("lock poisoned")
                    .insert(id.to_string(), key);
                return Ok(sig);
            }
        }
        Err(IdentityError::KeyNotFound(id.to_string()))
    }
}

fn load_key(path: &Path) -> Result<SigningKey, IdentityError> {
    use zeroize::Zeroizing;

    // Read file into Zeroizing wrapper to ensure heap memory is wiped
    let bytes = Zeroizing::new(fs::read(path)?);

    if bytes.len() != 32 {
        return Err(IdentityError::InvalidKeyLength(bytes.len()));
    }

    // Copy to stack array, also wrapped in Zeroizing to wipe stack memory
    let mut key_bytes = Zeroizing::new([0u8; 32]);
    key_bytes.copy_from_slice(&bytes);

    Ok(SigningKey::from_bytes(&key_bytes))
}

fn save_key(path: &Path, key: &SigningKey) -> Result<(), IdentityError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::File::create(path)?;
    file.write_all(key.as_bytes())?;
    Ok(())
}

/// Verify an Ed25519 signature against a raw public key.
pub fn verify_signature(signature: &Signature, key: &PubKey, message: &[u8]) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_bytes(key.as_bytes()) else {
        return false;
    };
    let sig = ed25519_dalek::Signature::from_bytes(signature.as_bytes());
    verifying_key.verify_strict(message, &sig).is_ok()
}

/// [`IdentityProvider`] backed by a [`Keystore`].
///
/// Identities are self-signed: `signatures.id` covers the id bytes and
/// `signatures.public_key` covers the public key bytes followed by the id
/// signature. Ed25519 signing is deterministic, so creating the same id
/// twice yields the same credential.
#[derive(Clone)]
pub struct KeystoreProvider {
    keystore: std::sync::Arc<Keystore>,
}

impl KeystoreProvider {
    pub fn new(keystore: std::sync::Arc<Keystore>) -> Self {
        Self { keystore }
    }

    /// Provider over a fresh in-memory keystore.
    pub fn in_memory() -> Self {
        Self::new(std::sync::Arc::new(Keystore::in_memory()))
    }

    pub fn keystore(&self) -> &Keystore {
        &self.keystore
    }
}

impl IdentityProvider for KeystoreProvider {
    fn create_identity(&self, id: &str) -> Result<Identity, IdentityError> {
        let public_key = self.keystore.create_key(id)?;
        let id_sig = self.keystore.sign_with(id, id.as_bytes())?;

        let mut bound = Vec::with_capacity(32 + 64);
        bound.extend_from_slice(public_key.as_bytes());
        bound.extend_from_slice(id_sig.as_bytes());
        let key_sig = self.keystore.sign_with(id, &bound)?;

        Ok(Identity::new(
            id,
            public_key,
            IdentitySignatures {
                id: id_sig,
                public_key: key_sig,
            },
        ))
    }

    fn sign(&self, identity: &Identity, message: &[u8]) -> Result<Signature, IdentityError> {
        self.keystore.sign_with(&identity.id, message)
    }

    fn verify(&self, signature: &Signature, key: &PubKey, message: &[u8]) -> bool {
        verify_signature(signature, key, message)
    }

    fn verify_identity(&self, identity: &Identity) -> bool {
        if !verify_signature(
            &identity.signatures.id,
            &identity.public_key,
            identity.id.as_bytes(),
        ) {
            return false;
        }
        let mut bound = Vec::with_capacity(32 + 64);
        bound.extend_from_slice(identity.public_key.as_bytes());
        bound.extend_from_slice(identity.signatures.id.as_bytes());
        verify_signature(&identity.signatures.public_key, &identity.public_key, &bound)
    }
}
