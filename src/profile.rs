use std::sync::Arc;

use anyhow::Context;
use base64::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::{
    config::BaseUrl,
    error::{Result, WalletError},
    kms::{
        secret_lock::{generate_master_key, MASTER_KEY_URI},
        PassphraseLock, SecretLock,
    },
    storage::{StorageProvider, Store},
};

const PROFILE_KEY_PREFIX: &str = "vcwallet_usr_";

/// A user's persisted wallet configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub user: String,
    pub kms: KmsConfig,
}

/// The key management strategy of a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum KmsConfig {
    /// Master key sealed by a passphrase derived lock.
    LocalPassphrase { master_lock_cipher: String },
    /// Master key sealed by a caller supplied secret lock.
    LocalSecretLock { master_lock_cipher: String },
    /// Keys held by a remote key server.
    Remote { key_server_url: String },
}

impl KmsConfig {
    pub(crate) fn family(&self) -> &'static str {
        match self {
            KmsConfig::LocalPassphrase { .. } => "passphrase",
            KmsConfig::LocalSecretLock { .. } => "secret lock",
            KmsConfig::Remote { .. } => "remote key server",
        }
    }
}

/// Key management options for creating or updating a profile.
///
/// Exactly one of the fields must be set.
#[derive(Debug, Default, Clone)]
pub struct ProfileOptions {
    pub passphrase: Option<String>,
    pub secret_lock: Option<Arc<dyn SecretLock>>,
    pub key_server_url: Option<String>,
}

impl ProfileOptions {
    pub fn passphrase(passphrase: impl Into<String>) -> Self {
        Self {
            passphrase: Some(passphrase.into()),
            ..Default::default()
        }
    }

    pub fn secret_lock(lock: Arc<dyn SecretLock>) -> Self {
        Self {
            secret_lock: Some(lock),
            ..Default::default()
        }
    }

    pub fn key_server(url: impl Into<String>) -> Self {
        Self {
            key_server_url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Build the persisted [KmsConfig], sealing a fresh master key for local
    /// strategies.
    async fn into_kms_config(self) -> Result<KmsConfig> {
        match (self.passphrase, self.secret_lock, self.key_server_url) {
            (Some(passphrase), None, None) => {
                if passphrase.is_empty() {
                    return Err(WalletError::InvalidProfileOptions(
                        "passphrase must not be empty".into(),
                    ));
                }
                Ok(KmsConfig::LocalPassphrase {
                    master_lock_cipher: seal_master_key(&PassphraseLock::new(passphrase)).await?,
                })
            }
            (None, Some(lock), None) => Ok(KmsConfig::LocalSecretLock {
                master_lock_cipher: seal_master_key(lock.as_ref()).await?,
            }),
            (None, None, Some(url)) => {
                BaseUrl::try_from(url.clone()).map_err(|e| {
                    WalletError::InvalidProfileOptions(format!("invalid key server url: {e}"))
                })?;
                Ok(KmsConfig::Remote {
                    key_server_url: url,
                })
            }
            (None, None, None) => Err(WalletError::InvalidProfileOptions(
                "a key management option is required".into(),
            )),
            _ => Err(WalletError::InvalidProfileOptions(
                "only one key management option may be set".into(),
            )),
        }
    }
}

async fn seal_master_key(lock: &dyn SecretLock) -> Result<String> {
    let master_key = generate_master_key();
    let cipher = lock
        .encrypt(MASTER_KEY_URI, master_key.as_ref())
        .await
        .context("failed to seal master key")?;
    Ok(BASE64_URL_SAFE_NO_PAD.encode(cipher))
}

/// Decode the master lock cipher of a local profile.
pub(crate) fn decode_master_lock_cipher(cipher: &str) -> Result<Vec<u8>> {
    Ok(BASE64_URL_SAFE_NO_PAD
        .decode(cipher)
        .context("profile master lock cipher is not valid base64url")?)
}

/// Persists [Profile]s, one per user.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    store: Arc<dyn Store>,
}

impl ProfileStore {
    pub async fn open(provider: &dyn StorageProvider, name: &str) -> Result<Self> {
        let store = provider
            .open_store(name)
            .await
            .context("failed to open profile store")?;
        Ok(Self { store })
    }

    fn key(user: &str) -> String {
        format!("{PROFILE_KEY_PREFIX}{user}")
    }

    pub async fn get(&self, user: &str) -> Result<Profile> {
        let bytes = self
            .store
            .get(&Self::key(user))
            .await
            .context("failed to read profile")?
            .ok_or(WalletError::ProfileNotFound)?;

        Ok(serde_json::from_slice(&bytes).context("failed to parse profile")?)
    }

    pub async fn exists(&self, user: &str) -> Result<bool> {
        Ok(self
            .store
            .get(&Self::key(user))
            .await
            .context("failed to read profile")?
            .is_some())
    }

    async fn save(&self, profile: &Profile) -> Result<()> {
        let bytes = serde_json::to_vec(profile).context("failed to serialize profile")?;
        self.store
            .put(&Self::key(&profile.user), &bytes, &[])
            .await
            .context("failed to write profile")?;
        Ok(())
    }

    /// Create the profile of `user`.
    pub async fn create(&self, user: &str, options: ProfileOptions) -> Result<Profile> {
        if self.exists(user).await? {
            return Err(WalletError::ProfileAlreadyExists);
        }

        let profile = Profile {
            id: Uuid::new_v4().to_string(),
            user: user.to_owned(),
            kms: options.into_kms_config().await?,
        };
        self.save(&profile).await?;

        debug!(user, kms = profile.kms.family(), "created wallet profile");
        Ok(profile)
    }

    /// Replace the key management strategy of an existing profile.
    ///
    /// Switching to a new local strategy seals a new master key, so keys
    /// created under the previous one are no longer readable.
    pub async fn update(&self, user: &str, options: ProfileOptions) -> Result<Profile> {
        let mut profile = self.get(user).await?;
        profile.kms = options.into_kms_config().await?;
        self.save(&profile).await?;

        debug!(user, kms = profile.kms.family(), "updated wallet profile");
        Ok(profile)
    }
}
