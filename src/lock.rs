use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    config::BaseUrl,
    error::{Result, WalletError},
    kms::{
        local::kms_store_name, remote::HttpClient, secret_lock::master_key_from_slice,
        secret_lock::MASTER_KEY_URI, KeyManager, LocalKms, PassphraseLock, RemoteKms, SecretLock,
    },
    profile::{decode_master_lock_cipher, KmsConfig, Profile, ProfileStore},
    storage::StorageProvider,
};

/// Capability proving a wallet is unlocked.
///
/// Cloning a token is cheap. An operation holding a clone keeps its key
/// manager usable even if the wallet is closed while it runs.
#[derive(Clone)]
pub struct WalletToken {
    inner: Arc<TokenInner>,
}

struct TokenInner {
    id: Uuid,
    key_manager: Arc<dyn KeyManager>,
    expires_at: Option<Instant>,
}

impl fmt::Debug for WalletToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletToken")
            .field("id", &self.inner.id)
            .field("expires_at", &self.inner.expires_at)
            .finish_non_exhaustive()
    }
}

impl WalletToken {
    pub(crate) fn new(key_manager: Arc<dyn KeyManager>, expiry: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(TokenInner {
                id: Uuid::new_v4(),
                key_manager,
                expires_at: expiry.map(|expiry| Instant::now() + expiry),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn key_manager(&self) -> &Arc<dyn KeyManager> {
        &self.inner.key_manager
    }

    pub fn is_expired(&self) -> bool {
        self.inner
            .expires_at
            .is_some_and(|expires_at| Instant::now() >= expires_at)
    }

    fn same_as(&self, other: &WalletToken) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// How to unlock a wallet. Exactly one method must be set, and it must match
/// the key management strategy of the user's profile.
#[derive(Debug, Default, Clone)]
pub struct UnlockOptions {
    pub passphrase: Option<String>,
    pub secret_lock: Option<Arc<dyn SecretLock>>,
    /// Bearer token for the remote key server.
    pub auth_token: Option<String>,
    /// Lifetime of the minted token. `None` means valid until closed.
    pub expiry: Option<Duration>,
}

impl UnlockOptions {
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

    pub fn auth_token(token: impl Into<String>) -> Self {
        Self {
            auth_token: Some(token.into()),
            ..Default::default()
        }
    }

    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = Some(expiry);
        self
    }
}

enum UnlockMethod {
    Passphrase(String),
    SecretLock(Arc<dyn SecretLock>),
    AuthToken(String),
}

impl UnlockOptions {
    fn method(self) -> Result<(UnlockMethod, Option<Duration>)> {
        let method = match (self.passphrase, self.secret_lock, self.auth_token) {
            (Some(passphrase), None, None) => UnlockMethod::Passphrase(passphrase),
            (None, Some(lock), None) => UnlockMethod::SecretLock(lock),
            (None, None, Some(token)) => UnlockMethod::AuthToken(token),
            (None, None, None) => {
                return Err(WalletError::InvalidUnlockOptions(
                    "an unlock method is required".into(),
                ))
            }
            _ => {
                return Err(WalletError::InvalidUnlockOptions(
                    "only one unlock method may be set".into(),
                ))
            }
        };
        Ok((method, self.expiry))
    }
}

/// Open/closed state of one wallet handle.
pub struct LockManager {
    user: String,
    profiles: ProfileStore,
    storage: Arc<dyn StorageProvider>,
    http_client: Option<HttpClient>,
    state: RwLock<Option<WalletToken>>,
}

impl fmt::Debug for LockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockManager")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

impl LockManager {
    pub fn new(
        user: impl Into<String>,
        profiles: ProfileStore,
        storage: Arc<dyn StorageProvider>,
        http_client: Option<HttpClient>,
    ) -> Self {
        Self {
            user: user.into(),
            profiles,
            storage,
            http_client,
            state: RwLock::new(None),
        }
    }

    /// Unlock the wallet and mint a new token.
    ///
    /// Fails with [WalletError::AlreadyUnlocked] while a live token exists,
    /// leaving that token in place.
    pub async fn open(&self, options: UnlockOptions) -> Result<WalletToken> {
        let (method, expiry) = options.method()?;

        if self.require_token().await.is_ok() {
            return Err(WalletError::AlreadyUnlocked);
        }

        // Key derivation is slow, so the state is only locked to install the
        // token. A concurrent open may have won in the meantime.
        let profile = self.profiles.get(&self.user).await?;
        let key_manager = self.key_manager(&profile, method).await?;

        let mut state = self.state.write().await;
        if state.as_ref().is_some_and(|token| !token.is_expired()) {
            return Err(WalletError::AlreadyUnlocked);
        }
        let token = WalletToken::new(key_manager, expiry);
        *state = Some(token.clone());

        info!(user = %self.user, token = %token.id(), "wallet unlocked");
        Ok(token)
    }

    /// Lock the wallet. Returns `true` only if a live token was discarded.
    pub async fn close(&self) -> bool {
        match self.state.write().await.take() {
            Some(token) if !token.is_expired() => {
                info!(user = %self.user, token = %token.id(), "wallet locked");
                true
            }
            _ => false,
        }
    }

    /// Current token, or [WalletError::WalletLocked].
    pub async fn require_token(&self) -> Result<WalletToken> {
        match self.state.read().await.as_ref() {
            Some(token) if !token.is_expired() => Ok(token.clone()),
            Some(token) => {
                debug!(user = %self.user, token = %token.id(), "wallet token expired");
                Err(WalletError::WalletLocked)
            }
            None => Err(WalletError::WalletLocked),
        }
    }

    /// Whether `token` is the wallet's current live token.
    pub async fn is_current(&self, token: &WalletToken) -> bool {
        self.require_token()
            .await
            .is_ok_and(|current| current.same_as(token))
    }

    async fn key_manager(
        &self,
        profile: &Profile,
        method: UnlockMethod,
    ) -> Result<Arc<dyn KeyManager>> {
        match (&profile.kms, method) {
            (KmsConfig::LocalPassphrase { master_lock_cipher }, UnlockMethod::Passphrase(p)) => {
                self.local_kms(profile, master_lock_cipher, &PassphraseLock::new(p))
                    .await
            }
            (KmsConfig::LocalSecretLock { master_lock_cipher }, UnlockMethod::SecretLock(lock)) => {
                self.local_kms(profile, master_lock_cipher, lock.as_ref())
                    .await
            }
            (KmsConfig::Remote { key_server_url }, UnlockMethod::AuthToken(token)) => {
                let client = self
                    .http_client
                    .clone()
                    .ok_or(WalletError::ServiceUnavailable("http client"))?;
                let key_server = BaseUrl::try_from(key_server_url.clone())
                    .map_err(|e| anyhow::anyhow!("invalid key server url: {e}"))?;
                Ok(Arc::new(RemoteKms::new(key_server, token, client)))
            }
            (kms, _) => Err(WalletError::InvalidUnlockOptions(format!(
                "profile requires {} unlock",
                kms.family()
            ))),
        }
    }

    async fn local_kms(
        &self,
        profile: &Profile,
        master_lock_cipher: &str,
        lock: &dyn SecretLock,
    ) -> Result<Arc<dyn KeyManager>> {
        let cipher = decode_master_lock_cipher(master_lock_cipher)?;
        let master_key = lock
            .decrypt(MASTER_KEY_URI, &cipher)
            .await
            .map_err(|e| WalletError::AuthenticationFailed(e.to_string()))?;
        let master_key = master_key_from_slice(&master_key)?;

        let store = self
            .storage
            .open_store(&kms_store_name(&profile.id))
            .await
            .map_err(|e| e.context("failed to open key store"))?;

        Ok(Arc::new(LocalKms::new(store, master_key)))
    }
}
