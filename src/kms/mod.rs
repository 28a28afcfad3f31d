//! Key management.
//!
//! A [KeyManager] is the handle a wallet obtains when it is unlocked. Keys are
//! addressed by a key id derived from their public key, so a verification
//! method found in a DID document always maps to the same key id regardless
//! of which key manager holds the private key.

use std::{fmt, str::FromStr};

use async_trait::async_trait;
use base64::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WalletError};

pub mod keys;
pub mod local;
pub mod remote;
pub mod secret_lock;

pub use local::LocalKms;
pub use remote::RemoteKms;
pub use secret_lock::{PassphraseLock, SecretLock};

const KEY_TYPE_ED25519: &str = "ED25519";
const KEY_TYPE_ECDSA_P256: &str = "ECDSAP256IEEEP1363";

/// Supported key pair algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum KeyType {
    Ed25519,
    /// ECDSA over P-256 with fixed size (IEEE P1363) signatures.
    EcdsaP256,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Ed25519 => KEY_TYPE_ED25519,
            KeyType::EcdsaP256 => KEY_TYPE_ECDSA_P256,
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyType {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            KEY_TYPE_ED25519 => Ok(KeyType::Ed25519),
            KEY_TYPE_ECDSA_P256 => Ok(KeyType::EcdsaP256),
            other => Err(WalletError::UnsupportedKeyType(other.to_owned())),
        }
    }
}

impl TryFrom<String> for KeyType {
    type Error = WalletError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<KeyType> for String {
    fn from(key_type: KeyType) -> Self {
        key_type.as_str().to_owned()
    }
}

/// A key created or imported into a key manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPair {
    pub key_id: String,
    pub key_type: KeyType,
    /// Base64url (unpadded) encoded public key.
    pub public_key: String,
}

impl KeyPair {
    pub(crate) fn from_public_key(key_type: KeyType, public_key: &[u8]) -> Self {
        Self {
            key_id: key_id(public_key),
            key_type,
            public_key: BASE64_URL_SAFE_NO_PAD.encode(public_key),
        }
    }
}

/// Key id for a raw public key.
///
/// Ed25519 keys are 32 raw bytes, P-256 keys are SEC1 compressed points.
pub fn key_id(public_key: &[u8]) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(public_key)
}

/// An unlocked key management backend.
#[async_trait]
pub trait KeyManager: fmt::Debug + Send + Sync {
    /// Create a new key pair.
    async fn create(&self, key_type: KeyType) -> Result<KeyPair>;

    /// Import raw private key material.
    async fn import_private_key(&self, key_type: KeyType, private_key: &[u8]) -> Result<KeyPair>;

    /// Sign `payload` with the key identified by `key_id`.
    ///
    /// Fails with [WalletError::KeyNotFound] if no keyset exists for `key_id`.
    async fn sign(&self, key_id: &str, payload: &[u8]) -> Result<Vec<u8>>;

    /// Return the raw public key for `key_id`.
    async fn public_key(&self, key_id: &str) -> Result<Vec<u8>>;
}
