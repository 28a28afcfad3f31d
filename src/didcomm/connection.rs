use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ConnectionLookup;
use crate::storage::{StorageProvider, Store};

/// Store holding the records of the DID exchange protocol.
pub const DID_EXCHANGE_STORE: &str = "didexchange";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    #[serde(rename = "connectionID", alias = "ConnectionID")]
    pub connection_id: String,
    #[serde(default, alias = "State", skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(rename = "myDID", alias = "MyDID")]
    pub my_did: String,
    #[serde(rename = "theirDID", alias = "TheirDID")]
    pub their_did: String,
}

fn connection_key(connection_id: &str) -> String {
    format!("conn_{connection_id}")
}

/// Looks up connection records written to the DID exchange store.
#[derive(Debug, Clone)]
pub struct StoreConnectionLookup {
    store: Arc<dyn Store>,
}

impl StoreConnectionLookup {
    pub async fn open(provider: &dyn StorageProvider) -> Result<Self> {
        let store = provider
            .open_store(DID_EXCHANGE_STORE)
            .await
            .context("failed to open DID exchange store")?;
        Ok(Self { store })
    }

    /// Save `record`, as the DID exchange service does.
    pub async fn save(&self, record: &ConnectionRecord) -> Result<()> {
        let bytes = serde_json::to_vec(record).context("failed to serialize connection record")?;
        self.store
            .put(&connection_key(&record.connection_id), &bytes, &[])
            .await
    }
}

#[async_trait]
impl ConnectionLookup for StoreConnectionLookup {
    async fn get_connection_record(&self, connection_id: &str) -> Result<ConnectionRecord> {
        let bytes = self
            .store
            .get(&connection_key(connection_id))
            .await?
            .with_context(|| format!("connection `{connection_id}` not found"))?;
        serde_json::from_slice(&bytes).context("failed to parse connection record")
    }
}
