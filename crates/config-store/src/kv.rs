//! String-keyed JSON value stores with byte quotas.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::StoreError;

/// Byte limits applied on every write. Sizes are measured as key length plus the
/// compact JSON encoding of the value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quota {
    pub per_item_bytes: usize,
    pub total_bytes: usize,
}

impl Default for Quota {
    fn default() -> Self {
        Self {
            per_item_bytes: 8_192,
            total_bytes: 102_400,
        }
    }
}

impl Quota {
    fn item_size(key: &str, value: &Value) -> usize {
        key.len() + value.to_string().len()
    }

    fn check(
        &self,
        current: &BTreeMap<String, Value>,
        key: &str,
        value: &Value,
    ) -> Result<(), StoreError> {
        let size = Self::item_size(key, value);
        if size > self.per_item_bytes {
            return Err(StoreError::QuotaExceeded {
                key: key.to_string(),
                size,
                limit: self.per_item_bytes,
            });
        }
        let others: usize = current
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| Self::item_size(k, v))
            .sum();
        if others + size > self.total_bytes {
            return Err(StoreError::QuotaExceeded {
                key: key.to_string(),
                size: others + size,
                limit: self.total_bytes,
            });
        }
        Ok(())
    }
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Process-local store; contents vanish with the process.
#[derive(Default)]
pub struct InMemoryKv {
    quota: Quota,
    data: Mutex<BTreeMap<String, Value>>,
}

impl InMemoryKv {
    pub fn new(quota: Quota) -> Self {
        Self {
            quota,
            data: Mutex::new(BTreeMap::new()),
        }
    }
}

#[async_trait]
impl KvStore for InMemoryKv {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.data.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut data = self.data.lock();
        self.quota.check(&data, key, &value)?;
        data.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.data.lock().remove(key);
        Ok(())
    }
}

/// Single JSON document on disk. Every write replaces the file atomically through a
/// sibling temp file, so a crash leaves either the old or the new document.
pub struct JsonFileKv {
    path: PathBuf,
    quota: Quota,
    data: Mutex<BTreeMap<String, Value>>,
}

impl JsonFileKv {
    /// Opens `path`, starting empty when the file does not exist yet. A corrupt file is
    /// moved aside rather than failing startup.
    pub fn open(path: impl Into<PathBuf>, quota: Quota) -> Result<Self, StoreError> {
        let path = path.into();
        let data = match std::fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(map) => map,
                Err(err) => {
                    let aside = path.with_extension("corrupt");
                    warn!(path = %path.display(), %err, "store file unreadable; moving aside");
                    std::fs::rename(&path, &aside)?;
                    BTreeMap::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path,
            quota,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, data: &BTreeMap<String, Value>) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, data)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .map_err(|err| StoreError::Io(err.error.to_string()))?;
        debug!(path = %self.path.display(), keys = data.len(), "store persisted");
        Ok(())
    }
}

#[async_trait]
impl KvStore for JsonFileKv {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.data.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut data = self.data.lock();
        self.quota.check(&data, key, &value)?;
        let mut next = data.clone();
        next.insert(key.to_string(), value);
        self.persist(&next)?;
        *data = next;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut data = self.data.lock();
        if !data.contains_key(key) {
            return Ok(());
        }
        let mut next = data.clone();
        next.remove(key);
        self.persist(&next)?;
        *data = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn per_item_quota_rejects_large_values() {
        let kv = InMemoryKv::new(Quota {
            per_item_bytes: 16,
            total_bytes: 1024,
        });
        let err = kv
            .set("config", json!({"long": "xxxxxxxxxxxxxxxx"}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::QuotaExceeded { limit: 16, .. }));
        assert!(kv.get("config").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn total_quota_counts_other_keys_but_not_the_replaced_one() {
        let kv = InMemoryKv::new(Quota {
            per_item_bytes: 64,
            total_bytes: 30,
        });
        kv.set("a", json!("0123456789")).await.unwrap();
        kv.set("a", json!("0123456789abcdef")).await.unwrap();
        let err = kv.set("b", json!("0123456789abcdef")).await.unwrap_err();
        assert!(matches!(err, StoreError::QuotaExceeded { limit: 30, .. }));
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");
        {
            let kv = JsonFileKv::open(&path, Quota::default()).unwrap();
            kv.set("meetings", json!([])).await.unwrap();
            kv.set("config", json!({"exitMode": "peak"})).await.unwrap();
            kv.remove("meetings").await.unwrap();
        }
        let kv = JsonFileKv::open(&path, Quota::default()).unwrap();
        assert_eq!(
            kv.get("config").await.unwrap(),
            Some(json!({"exitMode": "peak"}))
        );
        assert!(kv.get("meetings").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_file_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{not json").unwrap();
        let kv = JsonFileKv::open(&path, Quota::default()).unwrap();
        assert!(kv.get("config").await.unwrap().is_none());
        assert!(dir.path().join("store.corrupt").exists());
    }
}
