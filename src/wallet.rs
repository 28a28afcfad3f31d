use serde_json::Value;
use tracing::debug;

use crate::{
    content::{AddOptions, ContentStore, ContentType, GetAllOptions},
    core::did::WalletDidResolver,
    credential::{
        CredentialOps, DeriveOptions, DeriveSource, ProofOptions, ProveSource, VerifySource,
    },
    didcomm::{
        Acknowledgement, ConcludeOptions, ConnectOptions, PendingAction, ProposeOptions,
        ProtocolOrchestrator,
    },
    error::Result,
    kms::{KeyPair, KeyType},
    lock::{LockManager, UnlockOptions, WalletToken},
    manifest::{ManifestResolver, ResolveManifestSource, ResolvedDescriptor},
    profile::{ProfileOptions, ProfileStore},
    provider::Provider,
    query::{QueryEngine, QuerySpec},
};

/// A user's wallet.
///
/// Every operation other than [Wallet::open] and [Wallet::close] requires
/// the wallet to be unlocked, and fails with [WalletError::WalletLocked](crate::WalletError::WalletLocked)
/// before touching any store otherwise.
///
/// Closing the wallet does not interrupt operations already past the lock
/// check. They complete with the key manager they started with.
#[derive(Debug)]
pub struct Wallet {
    user: String,
    lock: LockManager,
    content: ContentStore,
    credentials: CredentialOps,
    queries: QueryEngine,
    protocols: ProtocolOrchestrator,
    manifests: ManifestResolver,
    default_key_type: KeyType,
}

async fn profile_store(provider: &Provider) -> Result<ProfileStore> {
    ProfileStore::open(provider.storage.as_ref(), &provider.config.profile_store).await
}

impl Wallet {
    /// Create the wallet profile of `user`.
    pub async fn create_profile(
        user: &str,
        provider: &Provider,
        options: ProfileOptions,
    ) -> Result<()> {
        profile_store(provider).await?.create(user, options).await?;
        Ok(())
    }

    /// Replace the key management strategy of `user`'s profile.
    pub async fn update_profile(
        user: &str,
        provider: &Provider,
        options: ProfileOptions,
    ) -> Result<()> {
        profile_store(provider).await?.update(user, options).await?;
        Ok(())
    }

    pub async fn profile_exists(user: &str, provider: &Provider) -> Result<bool> {
        profile_store(provider).await?.exists(user).await
    }

    /// Load the wallet of `user`, locked.
    ///
    /// Fails with [WalletError::ProfileNotFound](crate::WalletError::ProfileNotFound) if `user` has no profile.
    pub async fn new(user: &str, provider: &Provider) -> Result<Self> {
        let profiles = profile_store(provider).await?;
        let profile = profiles.get(user).await?;

        let content = ContentStore::open(provider.storage.as_ref(), &profile.id).await?;
        let resolver = WalletDidResolver::new(content.clone(), provider.vdr.clone());
        let credentials = CredentialOps::new(
            content.clone(),
            resolver,
            provider.suites.clone(),
            provider.selective_disclosure.clone(),
        );
        let protocols = ProtocolOrchestrator::new(
            provider.out_of_band.clone(),
            provider.did_exchange.clone(),
            provider.present_proof.clone(),
            provider.issue_credential.clone(),
            Some(provider.connections.clone()),
            provider.config.poll_interval,
        );

        debug!(user, "wallet loaded");
        Ok(Self {
            user: user.to_owned(),
            lock: LockManager::new(
                user,
                profiles,
                provider.storage.clone(),
                provider.http_client.clone(),
            ),
            queries: QueryEngine::new(content.clone(), credentials.clone()),
            manifests: ManifestResolver::new(content.clone()),
            content,
            credentials,
            protocols,
            default_key_type: provider.config.default_key_type,
        })
    }

    /// Load the wallet of `user` and unlock it.
    pub async fn new_unlocked(
        user: &str,
        provider: &Provider,
        options: UnlockOptions,
    ) -> Result<(Self, WalletToken)> {
        let wallet = Self::new(user, provider).await?;
        let token = wallet.open(options).await?;
        Ok((wallet, token))
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// Unlock the wallet.
    pub async fn open(&self, options: UnlockOptions) -> Result<WalletToken> {
        self.lock.open(options).await
    }

    /// Lock the wallet. Returns `true` only if it was unlocked.
    pub async fn close(&self) -> bool {
        self.lock.close().await
    }

    /// Whether `token` is the token of the current unlocked session.
    pub async fn is_current(&self, token: &WalletToken) -> bool {
        self.lock.is_current(token).await
    }

    /// Add content to the wallet, returning its id.
    pub async fn add(
        &self,
        content_type: ContentType,
        content: &[u8],
        options: AddOptions,
    ) -> Result<String> {
        let token = self.lock.require_token().await?;
        self.content
            .add(&token, content_type, content, options)
            .await
    }

    pub async fn get(&self, content_type: ContentType, id: &str) -> Result<Vec<u8>> {
        self.lock.require_token().await?;
        self.content.get(content_type, id).await
    }

    /// All content of `content_type` as `(id, content)` pairs.
    pub async fn get_all(
        &self,
        content_type: ContentType,
        options: GetAllOptions,
    ) -> Result<Vec<(String, Vec<u8>)>> {
        self.lock.require_token().await?;
        self.content.get_all(content_type, options).await
    }

    pub async fn remove(&self, content_type: ContentType, id: &str) -> Result<()> {
        self.lock.require_token().await?;
        self.content.remove(content_type, id).await
    }

    /// Run credential queries, returning one presentation per matching
    /// query.
    pub async fn query(&self, specs: &[QuerySpec]) -> Result<Vec<Value>> {
        self.lock.require_token().await?;
        self.queries.query(specs).await
    }

    /// Sign a credential.
    pub async fn issue(&self, credential: &[u8], options: ProofOptions) -> Result<Value> {
        let token = self.lock.require_token().await?;
        self.credentials.issue(&token, credential, options).await
    }

    /// Produce a signed presentation of `sources`.
    pub async fn prove(&self, options: ProofOptions, sources: Vec<ProveSource>) -> Result<Value> {
        let token = self.lock.require_token().await?;
        self.credentials.prove(&token, options, sources).await
    }

    pub async fn verify(&self, source: VerifySource) -> Result<bool> {
        self.lock.require_token().await?;
        self.credentials.verify(source).await
    }

    pub async fn derive(&self, source: DeriveSource, options: DeriveOptions) -> Result<Value> {
        self.lock.require_token().await?;
        self.credentials.derive(source, options).await
    }

    /// Create a key pair, of the configured default type when `key_type` is
    /// not given.
    pub async fn create_key_pair(&self, key_type: Option<KeyType>) -> Result<KeyPair> {
        let token = self.lock.require_token().await?;
        self.credentials
            .create_key_pair(&token, key_type.unwrap_or(self.default_key_type))
            .await
    }

    /// Accept an out-of-band invitation, returning the connection id once
    /// the DID exchange completed.
    pub async fn connect(&self, invitation: &Value, options: ConnectOptions) -> Result<String> {
        self.lock.require_token().await?;
        self.protocols.connect(invitation, &options).await
    }

    pub async fn propose_presentation(
        &self,
        invitation: &Value,
        options: ProposeOptions,
    ) -> Result<Option<PendingAction>> {
        self.lock.require_token().await?;
        self.protocols
            .propose_presentation(invitation, &options)
            .await
    }

    pub async fn propose_credential(
        &self,
        invitation: &Value,
        options: ProposeOptions,
    ) -> Result<Option<PendingAction>> {
        self.lock.require_token().await?;
        self.protocols.propose_credential(invitation, &options).await
    }

    /// Reply to presentation request `thread_id` with `presentation`.
    pub async fn present_proof(
        &self,
        thread_id: &str,
        presentation: Value,
        options: ConcludeOptions,
    ) -> Result<Acknowledgement> {
        self.lock.require_token().await?;
        self.protocols
            .present_proof(thread_id, presentation, options)
            .await
    }

    /// Accept credential offer `thread_id`.
    pub async fn request_credential(
        &self,
        thread_id: &str,
        presentation: Value,
        options: ConcludeOptions,
    ) -> Result<Acknowledgement> {
        self.lock.require_token().await?;
        self.protocols
            .request_credential(thread_id, presentation, options)
            .await
    }

    pub async fn resolve_credential_manifest(
        &self,
        manifest: &[u8],
        source: ResolveManifestSource,
    ) -> Result<Vec<ResolvedDescriptor>> {
        self.lock.require_token().await?;
        self.manifests.resolve(manifest, source).await
    }
}
