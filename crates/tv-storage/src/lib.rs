pub mod history;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rocksdb::{DB, Direction, IteratorMode, Options};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use tv_api_types::{Preferences, PreferencesPatch};

pub use history::{RecentTxHashes, TransactionHistory};

/// Every key written through [`Storage`] carries this prefix.
pub const KEY_PREFIX: &str = "timevault_";

const PREFERENCES_KEY: &str = "preferences";
const AVAILABILITY_CHECK_KEY: &str = "__storage_test__";

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

#[derive(Default)]
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let guard = self.entries.read().await;
        Ok(guard.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let mut guard = self.entries.write().await;
        guard.insert(key.to_owned(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut guard = self.entries.write().await;
        guard.remove(key);
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let guard = self.entries.read().await;
        Ok(guard.keys().filter(|key| key.starts_with(prefix)).cloned().collect())
    }
}

pub struct RocksDbStore {
    db: Arc<DB>,
}

impl RocksDbStore {
    pub fn open_default(path: &str) -> Result<Self> {
        let mut options = Options::default();
        options.create_if_missing(true);
        let db = DB::open(&options, path).with_context(|| format!("open rocksdb at {path}"))?;
        Ok(Self { db: Arc::new(db) })
    }
}

#[async_trait]
impl KeyValueStore for RocksDbStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key.as_bytes())?)
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.db.put(key.as_bytes(), value)?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.db.delete(key.as_bytes())?;
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for item in self.db.iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward)) {
            let (key, _) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            keys.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(keys)
    }
}

/// JSON values under the `timevault_` namespace.
///
/// Reads never fail: a missing or undecodable value yields the caller's
/// default. Writes report their error.
#[derive(Clone)]
pub struct Storage {
    store: Arc<dyn KeyValueStore>,
}

impl Storage {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::default()))
    }

    fn key(name: &str) -> String {
        format!("{KEY_PREFIX}{name}")
    }

    pub async fn get_item<T: DeserializeOwned>(&self, name: &str, default: T) -> T {
        match self.store.get(&Self::key(name)).await {
            Ok(Some(raw)) => match serde_json::from_slice(&raw) {
                Ok(value) => value,
                Err(err) => {
                    warn!("discarding undecodable {name}: {err}");
                    default
                }
            },
            Ok(None) => default,
            Err(err) => {
                warn!("storage read of {name} failed: {err:#}");
                default
            }
        }
    }

    pub async fn set_item<T: Serialize + Sync>(&self, name: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_vec(value).with_context(|| format!("encode {name}"))?;
        self.store
            .set(&Self::key(name), raw)
            .await
            .with_context(|| format!("write {name}"))
    }

    pub async fn remove_item(&self, name: &str) -> Result<()> {
        self.store
            .remove(&Self::key(name))
            .await
            .with_context(|| format!("remove {name}"))
    }

    /// Removes every prefixed key; foreign keys in the same store survive.
    pub async fn clear(&self) -> Result<()> {
        let keys = self.store.keys_with_prefix(KEY_PREFIX).await?;
        debug!("clearing {} stored values", keys.len());
        for key in keys {
            self.store.remove(&key).await?;
        }
        Ok(())
    }

    pub async fn is_available(&self) -> bool {
        let round_trip = async {
            self.set_item(AVAILABILITY_CHECK_KEY, &AVAILABILITY_CHECK_KEY).await?;
            self.remove_item(AVAILABILITY_CHECK_KEY).await
        };
        match round_trip.await {
            Ok(()) => true,
            Err(err) => {
                warn!("storage unavailable: {err:#}");
                false
            }
        }
    }

    pub async fn preferences(&self) -> Preferences {
        self.get_item(PREFERENCES_KEY, Preferences::default()).await
    }

    pub async fn update_preferences(&self, patch: PreferencesPatch) -> Result<Preferences> {
        let merged = self.preferences().await.merge(patch);
        self.set_item(PREFERENCES_KEY, &merged).await?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_and_corrupt_values_fall_back_to_default() {
        let store = Arc::new(InMemoryStore::default());
        let storage = Storage::new(store.clone());

        assert_eq!(storage.get_item("count", 5_u32).await, 5);

        store.set("timevault_count", b"not json".to_vec()).await.unwrap();
        assert_eq!(storage.get_item("count", 5_u32).await, 5);

        storage.set_item("count", &9_u32).await.unwrap();
        assert_eq!(storage.get_item("count", 5_u32).await, 9);
    }

    #[tokio::test]
    async fn clear_only_touches_prefixed_keys() {
        let store = Arc::new(InMemoryStore::default());
        let storage = Storage::new(store.clone());

        storage.set_item("a", &1_u8).await.unwrap();
        storage.set_item("b", &2_u8).await.unwrap();
        store.set("other_app", b"1".to_vec()).await.unwrap();

        storage.clear().await.unwrap();
        assert!(store.keys_with_prefix(KEY_PREFIX).await.unwrap().is_empty());
        assert!(store.get("other_app").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn preferences_merge_and_persist() {
        let storage = Storage::in_memory();
        assert_eq!(storage.preferences().await, Preferences::default());

        let updated = storage
            .update_preferences(PreferencesPatch {
                theme: Some("light".to_owned()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(updated.theme, "light");
        assert!(updated.sounds);
        assert_eq!(storage.preferences().await, updated);
    }

    #[tokio::test]
    async fn availability_check_leaves_no_trace() {
        let store = Arc::new(InMemoryStore::default());
        let storage = Storage::new(store.clone());
        assert!(storage.is_available().await);
        assert!(store.keys_with_prefix(KEY_PREFIX).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rocksdb_store_scans_by_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksDbStore::open_default(dir.path().to_str().unwrap()).unwrap();

        store.set("timevault_a", b"1".to_vec()).await.unwrap();
        store.set("timevault_b", b"2".to_vec()).await.unwrap();
        store.set("zzz", b"3".to_vec()).await.unwrap();

        let mut keys = store.keys_with_prefix(KEY_PREFIX).await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["timevault_a", "timevault_b"]);

        store.remove("timevault_a").await.unwrap();
        assert_eq!(store.get("timevault_a").await.unwrap(), None);
        assert_eq!(store.get("timevault_b").await.unwrap(), Some(b"2".to_vec()));
    }
}
