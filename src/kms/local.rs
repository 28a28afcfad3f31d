use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use base64::prelude::*;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::{
    keys::PrivateKey,
    secret_lock::{open, seal, MasterKey},
    KeyManager, KeyPair, KeyType,
};
use crate::{
    error::{Result, WalletError},
    storage::Store,
};

/// Name of the store holding the sealed keysets of a profile.
pub fn kms_store_name(profile_id: &str) -> String {
    format!("vcwallet_kms_{profile_id}")
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Keyset {
    key_type: KeyType,
    private_key: String,
}

/// A key manager keeping private keys in a [Store], each sealed with the
/// profile master key.
pub struct LocalKms {
    store: Arc<dyn Store>,
    master_key: MasterKey,
}

impl std::fmt::Debug for LocalKms {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalKms")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl LocalKms {
    pub fn new(store: Arc<dyn Store>, master_key: MasterKey) -> Self {
        Self { store, master_key }
    }

    async fn store_key(&self, key: &PrivateKey) -> Result<KeyPair> {
        let public_key = key.public_key()?;
        let pair = KeyPair::from_public_key(key.key_type(), &public_key);

        let keyset = Zeroizing::new(serde_json::to_vec(&Keyset {
            key_type: key.key_type(),
            private_key: BASE64_URL_SAFE_NO_PAD.encode(key.as_bytes()),
        })
        .context("failed to serialize keyset")?);

        let sealed = seal(&self.master_key, pair.key_id.as_bytes(), &keyset)?;
        self.store
            .put(&pair.key_id, &sealed, &[])
            .await
            .context("failed to write keyset")?;

        Ok(pair)
    }

    async fn load_key(&self, key_id: &str) -> Result<PrivateKey> {
        let sealed = self
            .store
            .get(key_id)
            .await
            .context("failed to read keyset")?
            .ok_or_else(|| WalletError::KeyNotFound(key_id.to_owned()))?;

        let keyset = open(&self.master_key, key_id.as_bytes(), &sealed)
            .context("failed to read keyset")?;
        let keyset: Keyset =
            serde_json::from_slice(&keyset).context("failed to read json keyset")?;
        let bytes = Zeroizing::new(
            BASE64_URL_SAFE_NO_PAD
                .decode(&keyset.private_key)
                .context("failed to read json keyset")?,
        );

        Ok(PrivateKey::from_bytes(keyset.key_type, &bytes)?)
    }
}

#[async_trait]
impl KeyManager for LocalKms {
    async fn create(&self, key_type: KeyType) -> Result<KeyPair> {
        self.store_key(&PrivateKey::generate(key_type)).await
    }

    async fn import_private_key(&self, key_type: KeyType, private_key: &[u8]) -> Result<KeyPair> {
        let key = PrivateKey::from_bytes(key_type, private_key)
            .map_err(|e| WalletError::InvalidContent(format!("invalid private key: {e}")))?;
        self.store_key(&key).await
    }

    async fn sign(&self, key_id: &str, payload: &[u8]) -> Result<Vec<u8>> {
        Ok(self.load_key(key_id).await?.sign(payload)?)
    }

    async fn public_key(&self, key_id: &str) -> Result<Vec<u8>> {
        Ok(self.load_key(key_id).await?.public_key()?)
    }
}
