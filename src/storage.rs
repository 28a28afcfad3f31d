use std::{
    collections::{BTreeMap, HashMap},
    fmt::Debug,
    sync::Arc,
};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

/// A secondary index entry attached to a stored value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

impl Tag {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Store level configuration: the tag names a store is expected to index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreConfiguration {
    pub tag_names: Vec<String>,
}

/// A stored value, returned by tag queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: String,
    pub value: Vec<u8>,
    pub tags: Vec<Tag>,
}

/// Opens named stores.
#[async_trait]
pub trait StorageProvider: Debug + Send + Sync {
    /// Open the store with the given name, creating it if needed.
    async fn open_store(&self, name: &str) -> Result<Arc<dyn Store>>;

    /// Set the configuration of the store with the given name.
    async fn set_store_config(&self, name: &str, config: StoreConfiguration) -> Result<()>;
}

/// Key-value storage interface with tag based secondary indexing.
#[async_trait]
pub trait Store: Debug + Send + Sync {
    /// Insert or replace a value.
    async fn put(&self, key: &str, value: &[u8], tags: &[Tag]) -> Result<()>;

    /// Get a value, or `None` if no value is stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Delete a value. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Return every record carrying a tag named `name` (and, if given, with
    /// value `value`), in insertion order.
    async fn query(&self, name: &str, value: Option<&str>) -> Result<Vec<Record>>;
}

/// A local in-memory storage provider.
///
/// # Warning
/// This in-memory store should only be used for test purposes or ephemeral
/// wallets, nothing is ever written to disk.
#[derive(Debug, Clone, Default)]
pub struct MemoryStoreProvider {
    stores: Arc<Mutex<HashMap<String, Arc<MemoryStore>>>>,
    configs: Arc<Mutex<HashMap<String, StoreConfiguration>>>,
}

impl MemoryStoreProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the configuration last set on the named store.
    pub async fn store_config(&self, name: &str) -> Option<StoreConfiguration> {
        self.configs.lock().await.get(name).cloned()
    }
}

#[async_trait]
impl StorageProvider for MemoryStoreProvider {
    async fn open_store(&self, name: &str) -> Result<Arc<dyn Store>> {
        let store: Arc<dyn Store> = self
            .stores
            .lock()
            .await
            .entry(name.to_owned())
            .or_default()
            .clone();

        Ok(store)
    }

    async fn set_store_config(&self, name: &str, config: StoreConfiguration) -> Result<()> {
        self.configs.lock().await.insert(name.to_owned(), config);

        Ok(())
    }
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    seq: u64,
    value: Vec<u8>,
    tags: Vec<Tag>,
}

#[derive(Debug, Default)]
struct MemoryEntries {
    next_seq: u64,
    entries: BTreeMap<String, MemoryEntry>,
}

/// A single in-memory store. Replacing a value keeps its insertion position.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryEntries>,
}

#[async_trait]
impl Store for MemoryStore {
    async fn put(&self, key: &str, value: &[u8], tags: &[Tag]) -> Result<()> {
        let mut inner = self.inner.lock().await;

        let seq = match inner.entries.get(key) {
            Some(existing) => existing.seq,
            None => {
                inner.next_seq += 1;
                inner.next_seq
            }
        };

        inner.entries.insert(
            key.to_owned(),
            MemoryEntry {
                seq,
                value: value.to_vec(),
                tags: tags.to_vec(),
            },
        );

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .inner
            .lock()
            .await
            .entries
            .get(key)
            .map(|entry| entry.value.clone()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.lock().await.entries.remove(key);

        Ok(())
    }

    async fn query(&self, name: &str, value: Option<&str>) -> Result<Vec<Record>> {
        let inner = self.inner.lock().await;

        let mut matches: Vec<(u64, Record)> = inner
            .entries
            .iter()
            .filter(|(_, entry)| {
                entry
                    .tags
                    .iter()
                    .any(|tag| tag.name == name && value.map_or(true, |v| tag.value == v))
            })
            .map(|(key, entry)| {
                (
                    entry.seq,
                    Record {
                        key: key.clone(),
                        value: entry.value.clone(),
                        tags: entry.tags.clone(),
                    },
                )
            })
            .collect();

        matches.sort_by_key(|(seq, _)| *seq);

        Ok(matches.into_iter().map(|(_, record)| record).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn query_keeps_insertion_order_across_replace() {
        let provider = MemoryStoreProvider::new();
        let store = provider.open_store("user").await.unwrap();

        let tag = [Tag::new("credential", "")];
        store.put("z", b"1", &tag).await.unwrap();
        store.put("a", b"2", &tag).await.unwrap();
        store.put("m", b"3", &[Tag::new("metadata", "")]).await.unwrap();
        store.put("z", b"4", &tag).await.unwrap();

        let records = store.query("credential", None).await.unwrap();
        let keys: Vec<_> = records.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["z", "a"]);
        assert_eq!(records[0].value, b"4");
    }

    #[tokio::test]
    async fn stores_are_shared_by_name() {
        let provider = MemoryStoreProvider::new();
        provider
            .open_store("s")
            .await
            .unwrap()
            .put("k", b"v", &[])
            .await
            .unwrap();

        let again = provider.open_store("s").await.unwrap();
        assert_eq!(again.get("k").await.unwrap(), Some(b"v".to_vec()));
        again.delete("k").await.unwrap();
        again.delete("k").await.unwrap();
        assert_eq!(again.get("k").await.unwrap(), None);
        assert!(provider.open_store("t").await.unwrap().get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn query_filters_by_tag_value() {
        let provider = MemoryStoreProvider::new();
        let store = provider.open_store("s").await.unwrap();
        store
            .put("a", b"", &[Tag::new("credential", ""), Tag::new("collectionID", "c1")])
            .await
            .unwrap();
        store
            .put("b", b"", &[Tag::new("credential", ""), Tag::new("collectionID", "c2")])
            .await
            .unwrap();

        let records = store.query("collectionID", Some("c2")).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key, "b");
    }
}
