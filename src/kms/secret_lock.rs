use std::fmt::Debug;

use anyhow::{bail, Context, Result};
use argon2::{Algorithm, Argon2, Params, Version};
use async_trait::async_trait;
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroizing;

const NONCE_SIZE: usize = 24;
const SALT_SIZE: usize = 16;
const KEY_SIZE: usize = 32;

// OWASP minimums for Argon2id.
const ARGON2_M_COST: u32 = 19 * 1024;
const ARGON2_T_COST: u32 = 2;
const ARGON2_P_COST: u32 = 1;

/// Key URI under which a profile's master key is sealed.
pub const MASTER_KEY_URI: &str = "local-lock://vcwallet/master";

/// Protects a key management master key.
#[async_trait]
pub trait SecretLock: Debug + Send + Sync {
    /// Encrypt `plaintext`, binding the ciphertext to `key_uri`.
    async fn encrypt(&self, key_uri: &str, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt a ciphertext produced by [SecretLock::encrypt] for the same `key_uri`.
    async fn decrypt(&self, key_uri: &str, ciphertext: &[u8]) -> Result<Vec<u8>>;
}

/// A 256-bit symmetric key, wiped on drop.
pub type MasterKey = Zeroizing<[u8; KEY_SIZE]>;

pub fn generate_master_key() -> MasterKey {
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    OsRng.fill_bytes(key.as_mut());
    key
}

pub(crate) fn master_key_from_slice(bytes: &[u8]) -> Result<MasterKey> {
    let key: [u8; KEY_SIZE] = bytes
        .try_into()
        .context("master key must be 32 bytes")?;
    Ok(Zeroizing::new(key))
}

/// Encrypt with XChaCha20-Poly1305. Output is `nonce || ciphertext`.
pub(crate) fn seal(key: &[u8; KEY_SIZE], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(key.into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);

    let ciphertext = cipher
        .encrypt(
            XNonce::from_slice(&nonce_bytes),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| anyhow::anyhow!("XChaCha20-Poly1305 encryption failed"))?;

    let mut out = nonce_bytes.to_vec();
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt the output of [seal].
pub(crate) fn open(key: &[u8; KEY_SIZE], aad: &[u8], sealed: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    if sealed.len() < NONCE_SIZE {
        bail!("ciphertext too short")
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);

    XChaCha20Poly1305::new(key.into())
        .decrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map(Zeroizing::new)
        .map_err(|_| anyhow::anyhow!("message authentication failed"))
}

/// A secret lock keyed by a passphrase.
///
/// Each ciphertext carries its own random salt: `salt || nonce || ciphertext`.
/// The encryption key is derived with Argon2id.
pub struct PassphraseLock {
    passphrase: Zeroizing<String>,
}

impl Debug for PassphraseLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassphraseLock").finish_non_exhaustive()
    }
}

impl PassphraseLock {
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self {
            passphrase: Zeroizing::new(passphrase.into()),
        }
    }

    /// Argon2id is memory hard, so it runs on the blocking pool.
    async fn derive_key(&self, salt: &[u8]) -> Result<MasterKey> {
        let passphrase = self.passphrase.clone();
        let salt = salt.to_vec();
        tokio::task::spawn_blocking(move || derive_key(&passphrase, &salt))
            .await
            .context("key derivation task failed")?
    }
}

fn derive_key(passphrase: &str, salt: &[u8]) -> Result<MasterKey> {
    let params = Params::new(ARGON2_M_COST, ARGON2_T_COST, ARGON2_P_COST, Some(KEY_SIZE))
        .map_err(|e| anyhow::anyhow!("invalid Argon2 parameters: {e}"))?;

    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password_into(passphrase.as_bytes(), salt, key.as_mut())
        .map_err(|e| anyhow::anyhow!("key derivation failed: {e}"))?;

    Ok(key)
}

#[async_trait]
impl SecretLock for PassphraseLock {
    async fn encrypt(&self, key_uri: &str, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut salt = [0u8; SALT_SIZE];
        OsRng.fill_bytes(&mut salt);

        let key = self.derive_key(&salt).await?;

        let mut out = salt.to_vec();
        out.extend(seal(&key, key_uri.as_bytes(), plaintext)?);
        Ok(out)
    }

    async fn decrypt(&self, key_uri: &str, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < SALT_SIZE {
            bail!("ciphertext too short")
        }
        let (salt, sealed) = ciphertext.split_at(SALT_SIZE);

        let key = self.derive_key(salt).await?;
        Ok(open(&key, key_uri.as_bytes(), sealed)?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passphrase_round_trip() {
        let lock = PassphraseLock::new("fakepassphrase");
        let sealed = lock.encrypt(MASTER_KEY_URI, b"master").await.unwrap();
        assert_eq!(lock.decrypt(MASTER_KEY_URI, &sealed).await.unwrap(), b"master");
    }

    #[tokio::test]
    async fn wrong_passphrase_fails_authentication() {
        let sealed = PassphraseLock::new("fakepassphrase")
            .encrypt(MASTER_KEY_URI, b"master")
            .await
            .unwrap();

        let err = PassphraseLock::new("fakepassphraseXX")
            .decrypt(MASTER_KEY_URI, &sealed)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "message authentication failed");
    }

    #[test]
    fn sealed_data_is_bound_to_aad() {
        let key = generate_master_key();
        let sealed = seal(&key, b"a", b"secret").unwrap();
        assert_eq!(open(&key, b"a", &sealed).unwrap().as_slice(), b"secret");
        assert!(open(&key, b"b", &sealed).is_err());
        assert!(open(&key, b"a", &sealed[..10]).is_err());
    }
}
