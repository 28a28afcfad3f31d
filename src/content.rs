use std::{fmt, str::FromStr, sync::Arc};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    error::{Result, WalletError},
    kms::keys::PrivateKey,
    lock::WalletToken,
    storage::{StorageProvider, Store, StoreConfiguration, Tag},
};

const COLLECTION_TAG: &str = "collectionID";

/// Kinds of data a wallet stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContentType {
    Collection,
    Credential,
    DidResolutionResponse,
    Metadata,
    Connection,
    Key,
}

impl ContentType {
    pub const ALL: [ContentType; 6] = [
        ContentType::Collection,
        ContentType::Credential,
        ContentType::DidResolutionResponse,
        ContentType::Metadata,
        ContentType::Connection,
        ContentType::Key,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Collection => "collection",
            ContentType::Credential => "credential",
            ContentType::DidResolutionResponse => "didResolutionResponse",
            ContentType::Metadata => "metadata",
            ContentType::Connection => "connection",
            ContentType::Key => "key",
        }
    }

    fn allows_overwrite(&self) -> bool {
        !matches!(self, ContentType::Key)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self> {
        ContentType::ALL
            .into_iter()
            .find(|ct| ct.as_str() == s)
            .ok_or_else(|| WalletError::InvalidContentType(s.to_owned()))
    }
}

#[derive(Debug, Default, Clone)]
pub struct AddOptions {
    /// Collection the content belongs to. Must already exist.
    pub collection_id: Option<String>,
    /// Overrides the id found in the payload.
    pub id: Option<String>,
}

impl AddOptions {
    pub fn in_collection(collection_id: impl Into<String>) -> Self {
        Self {
            collection_id: Some(collection_id.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct GetAllOptions {
    pub collection_id: Option<String>,
}

impl GetAllOptions {
    pub fn in_collection(collection_id: impl Into<String>) -> Self {
        Self {
            collection_id: Some(collection_id.into()),
        }
    }
}

/// Store configuration used for every per-user content store.
pub fn store_configuration() -> StoreConfiguration {
    StoreConfiguration {
        tag_names: ContentType::ALL
            .iter()
            .map(|ct| ct.as_str().to_owned())
            .chain([COLLECTION_TAG.to_owned()])
            .collect(),
    }
}

/// Typed wallet content, stored in one store per profile.
#[derive(Debug, Clone)]
pub struct ContentStore {
    store: Arc<dyn Store>,
}

fn storage_key(content_type: ContentType, id: &str) -> String {
    format!("{content_type}_{id}")
}

fn content_id(content_type: ContentType, content: &Value) -> Result<Option<String>> {
    let id = match content_type {
        ContentType::DidResolutionResponse => content
            .pointer("/didDocument/id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                WalletError::InvalidContent("DID resolution response has no DID document id".into())
            })
            .map(Some)?,
        _ => content
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty()),
    };
    Ok(id.map(str::to_owned))
}

/// Name of the content store of a profile.
pub fn content_store_name(profile_id: &str) -> String {
    format!("vcwallet_content_{profile_id}")
}

impl ContentStore {
    /// Configure and open the content store of profile `profile_id`.
    pub async fn open(provider: &dyn StorageProvider, profile_id: &str) -> Result<Self> {
        let name = content_store_name(profile_id);
        provider
            .set_store_config(&name, store_configuration())
            .await
            .context("failed to set store configuration")?;

        let store = provider
            .open_store(&name)
            .await
            .context("failed to open content store")?;

        Ok(Self { store })
    }

    /// Add content, returning its id.
    ///
    /// Content of every type except [ContentType::Key] is replaced when the
    /// id already exists. Key content is also imported into the key manager
    /// of `token`.
    pub async fn add(
        &self,
        token: &WalletToken,
        content_type: ContentType,
        payload: &[u8],
        options: AddOptions,
    ) -> Result<String> {
        let content: Value = serde_json::from_slice(payload)
            .map_err(|e| WalletError::InvalidContent(format!("content is not valid JSON: {e}")))?;

        let resolved = content_id(content_type, &content)?;
        let id = options
            .id
            .filter(|id| !id.is_empty())
            .or(resolved)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let key = storage_key(content_type, &id);

        if let Some(collection_id) = &options.collection_id {
            let collection = self
                .store
                .get(&storage_key(ContentType::Collection, collection_id))
                .await
                .context("failed to read collection")?;
            if collection.is_none() {
                return Err(WalletError::CollectionNotFound(collection_id.clone()));
            }
        }

        if !content_type.allows_overwrite()
            && self
                .store
                .get(&key)
                .await
                .context("failed to read content")?
                .is_some()
        {
            return Err(WalletError::DuplicateContent {
                content_type: content_type.to_string(),
                id,
            });
        }

        let private_key = match content_type {
            ContentType::Key => Some(private_key(&content)?),
            _ => None,
        };

        let mut tags = vec![Tag::new(content_type.as_str(), "")];
        if let Some(collection_id) = options.collection_id {
            tags.push(Tag::new(COLLECTION_TAG, collection_id));
        }

        self.store
            .put(&key, payload, &tags)
            .await
            .context("failed to save content")?;

        // The record goes first so a failed save never leaves an orphan key.
        if let Some(private_key) = private_key {
            if let Err(e) = token
                .key_manager()
                .import_private_key(private_key.key_type(), private_key.as_bytes())
                .await
            {
                if let Err(cleanup) = self.store.delete(&key).await {
                    warn!(id = %id, "failed to remove key content after failed import: {cleanup:#}");
                }
                return Err(e);
            }
        }

        debug!(%content_type, id = %id, "content added");
        Ok(id)
    }

    pub async fn get(&self, content_type: ContentType, id: &str) -> Result<Vec<u8>> {
        self.store
            .get(&storage_key(content_type, id))
            .await
            .context("failed to read content")?
            .ok_or_else(|| WalletError::content_not_found(content_type, id))
    }

    /// Get content parsed as JSON.
    pub async fn get_json(&self, content_type: ContentType, id: &str) -> Result<Value> {
        let bytes = self.get(content_type, id).await?;
        Ok(serde_json::from_slice(&bytes).context("stored content is not valid JSON")?)
    }

    /// All content of one type, in insertion order, as `(id, payload)` pairs.
    pub async fn get_all(
        &self,
        content_type: ContentType,
        options: GetAllOptions,
    ) -> Result<Vec<(String, Vec<u8>)>> {
        let records = match &options.collection_id {
            Some(collection_id) => self.store.query(COLLECTION_TAG, Some(collection_id.as_str())).await,
            None => self.store.query(content_type.as_str(), None).await,
        }
        .context("failed to query content")?;

        let prefix = storage_key(content_type, "");
        Ok(records
            .into_iter()
            .filter_map(|record| {
                let id = record.key.strip_prefix(&prefix)?.to_owned();
                Some((id, record.value))
            })
            .collect())
    }

    /// All content of one type parsed as JSON. Unparsable records are skipped.
    pub async fn get_all_json(&self, content_type: ContentType) -> Result<Vec<(String, Value)>> {
        Ok(self
            .get_all(content_type, GetAllOptions::default())
            .await?
            .into_iter()
            .filter_map(|(id, bytes)| match serde_json::from_slice(&bytes) {
                Ok(value) => Some((id, value)),
                Err(e) => {
                    warn!(%content_type, id = %id, "skipping unparsable content: {e}");
                    None
                }
            })
            .collect())
    }

    /// Remove content. Removing absent content is not an error.
    pub async fn remove(&self, content_type: ContentType, id: &str) -> Result<()> {
        self.store
            .delete(&storage_key(content_type, id))
            .await
            .context("failed to remove content")?;

        debug!(%content_type, id = %id, "content removed");
        Ok(())
    }
}

fn private_key(content: &Value) -> Result<PrivateKey> {
    let jwk = content
        .get("privateKeyJwk")
        .ok_or_else(|| WalletError::InvalidContent("key content has no privateKeyJwk".into()))?;
    PrivateKey::from_jwk(jwk)
        .map_err(|e| WalletError::InvalidContent(format!("invalid private key: {e}")))
}
