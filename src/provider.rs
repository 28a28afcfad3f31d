use std::{fmt, sync::Arc};

use anyhow::{bail, Context, Result};

use crate::{
    config::Config,
    core::did::DidResolver,
    credential::{JwsSuite, SelectiveDisclosure, SignatureSuite},
    didcomm::{
        ConnectionLookup, MessageEvents, OutOfBandService, ProtocolService, StoreConnectionLookup,
    },
    kms::remote::HttpClient,
    storage::StorageProvider,
};

/// The collaborators shared by every wallet of a deployment.
///
/// Only storage is required. Operations needing a collaborator that was not
/// provided fail with
/// [WalletError::ServiceUnavailable](crate::error::WalletError::ServiceUnavailable).
#[derive(Clone)]
pub struct Provider {
    pub(crate) config: Config,
    pub(crate) storage: Arc<dyn StorageProvider>,
    pub(crate) http_client: Option<HttpClient>,
    pub(crate) vdr: Option<Arc<dyn DidResolver>>,
    pub(crate) suites: Vec<Arc<dyn SignatureSuite>>,
    pub(crate) selective_disclosure: Option<Arc<dyn SelectiveDisclosure>>,
    pub(crate) out_of_band: Option<Arc<dyn OutOfBandService>>,
    pub(crate) did_exchange: Option<Arc<dyn MessageEvents>>,
    pub(crate) present_proof: Option<Arc<dyn ProtocolService>>,
    pub(crate) issue_credential: Option<Arc<dyn ProtocolService>>,
    pub(crate) connections: Arc<dyn ConnectionLookup>,
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("config", &self.config)
            .field("storage", &self.storage)
            .field("suites", &self.suites)
            .finish_non_exhaustive()
    }
}

impl Provider {
    /// Build a new provider.
    pub fn builder() -> ProviderBuilder {
        ProviderBuilder::default()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn StorageProvider> {
        &self.storage
    }
}

/// Builder struct for [Provider].
#[derive(Clone, Default)]
pub struct ProviderBuilder {
    config: Config,
    storage: Option<Arc<dyn StorageProvider>>,
    http_client: Option<HttpClient>,
    vdr: Option<Arc<dyn DidResolver>>,
    suites: Vec<Arc<dyn SignatureSuite>>,
    selective_disclosure: Option<Arc<dyn SelectiveDisclosure>>,
    out_of_band: Option<Arc<dyn OutOfBandService>>,
    did_exchange: Option<Arc<dyn MessageEvents>>,
    present_proof: Option<Arc<dyn ProtocolService>>,
    issue_credential: Option<Arc<dyn ProtocolService>>,
    connections: Option<Arc<dyn ConnectionLookup>>,
}

impl fmt::Debug for ProviderBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderBuilder")
            .field("config", &self.config)
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}

impl ProviderBuilder {
    /// Build the provider.
    ///
    /// Without explicit signature suites, `Ed25519Signature2018` and
    /// `JsonWebSignature2020` are registered. Without a connection lookup,
    /// connection records are read from the DID exchange store of the
    /// storage provider.
    pub async fn build(self) -> Result<Provider> {
        let Self {
            config,
            storage,
            http_client,
            vdr,
            mut suites,
            selective_disclosure,
            out_of_band,
            did_exchange,
            present_proof,
            issue_credential,
            connections,
        } = self;

        let Some(storage) = storage else {
            bail!("storage provider is required, see `with_storage_provider`")
        };

        if suites.is_empty() {
            suites = vec![
                Arc::new(JwsSuite::ed25519_signature_2018()),
                Arc::new(JwsSuite::json_web_signature_2020()),
            ];
        }

        let connections: Arc<dyn ConnectionLookup> = match connections {
            Some(connections) => connections,
            None => Arc::new(
                StoreConnectionLookup::open(storage.as_ref())
                    .await
                    .context("failed to open default connection lookup")?,
            ),
        };

        Ok(Provider {
            config,
            storage,
            http_client,
            vdr,
            suites,
            selective_disclosure,
            out_of_band,
            did_exchange,
            present_proof,
            issue_credential,
            connections,
        })
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Set the [StorageProvider] holding profiles, content and keys.
    pub fn with_storage_provider(mut self, storage: Arc<dyn StorageProvider>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Set the HTTP client used to reach remote key servers.
    pub fn with_http_client(mut self, http_client: HttpClient) -> Self {
        self.http_client = Some(http_client);
        self
    }

    /// Set the registry resolving DIDs not stored in the wallet.
    pub fn with_vdr(mut self, vdr: Arc<dyn DidResolver>) -> Self {
        self.vdr = Some(vdr);
        self
    }

    /// Register a signature suite. Suites are tried in registration order.
    pub fn with_signature_suite(mut self, suite: Arc<dyn SignatureSuite>) -> Self {
        self.suites.push(suite);
        self
    }

    pub fn with_selective_disclosure(mut self, suite: Arc<dyn SelectiveDisclosure>) -> Self {
        self.selective_disclosure = Some(suite);
        self
    }

    pub fn with_out_of_band(mut self, service: Arc<dyn OutOfBandService>) -> Self {
        self.out_of_band = Some(service);
        self
    }

    /// Set the source of DID exchange state events.
    pub fn with_did_exchange(mut self, events: Arc<dyn MessageEvents>) -> Self {
        self.did_exchange = Some(events);
        self
    }

    pub fn with_present_proof(mut self, service: Arc<dyn ProtocolService>) -> Self {
        self.present_proof = Some(service);
        self
    }

    pub fn with_issue_credential(mut self, service: Arc<dyn ProtocolService>) -> Self {
        self.issue_credential = Some(service);
        self
    }

    pub fn with_connection_lookup(mut self, connections: Arc<dyn ConnectionLookup>) -> Self {
        self.connections = Some(connections);
        self
    }
}
