//! In-memory object store.
//!
//! Behaves like a single S3 bucket with strong per-key consistency. Used by
//! tests and by the CLI's `--memory` mode. Failures can be injected into
//! deletes to reproduce a crash between the write and delete halves of a
//! transition.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::error::StorageError;
use super::store::{ObjectStore, StoreCapabilities, VersionedObject};

/// A bucket held in a `BTreeMap`, so listing returns keys in lexical order like S3.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, Stored>>,
    conditional_writes: AtomicBool,
    failing_deletes: AtomicUsize,
    writes: AtomicU64,
}

#[derive(Debug)]
struct Stored {
    body: Vec<u8>,
    etag: String,
}

impl MemoryStore {
    /// Creates an empty store without conditional-write support.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store that honors `put_if_absent`.
    #[must_use]
    pub fn with_conditional_writes() -> Self {
        let store = Self::default();
        store.conditional_writes.store(true, Ordering::SeqCst);
        store
    }

    /// Makes the next `count` deletes fail with a connection error.
    pub fn fail_next_deletes(&self, count: usize) {
        self.failing_deletes.store(count, Ordering::SeqCst);
    }

    /// Returns every key currently stored.
    pub async fn keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }

    /// Returns the number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Returns true if the store holds no objects.
    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    /// Every write gets a fresh tag, so rewriting a key with the same bytes
    /// still invalidates earlier reads.
    fn stored(&self, body: Vec<u8>) -> Stored {
        let version = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
        Stored {
            body,
            etag: format!("\"{version}\""),
        }
    }

    fn require_conditional(&self, what: &str) -> Result<(), StorageError> {
        if self.conditional_writes.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::ConfigurationError(format!(
                "{what} are not enabled for this memory store"
            )))
        }
    }

    fn take_delete_failure(&self) -> bool {
        self.failing_deletes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), StorageError> {
        let stored = self.stored(body);
        self.objects.write().await.insert(key.to_string(), stored);
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, body: Vec<u8>) -> Result<(), StorageError> {
        self.require_conditional("conditional writes")?;
        let mut objects = self.objects.write().await;
        if objects.contains_key(key) {
            return Err(StorageError::AlreadyExists {
                key: key.to_string(),
            });
        }
        let stored = self.stored(body);
        objects.insert(key.to_string(), stored);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        Ok(self.get_versioned(key).await?.body)
    }

    async fn get_versioned(&self, key: &str) -> Result<VersionedObject, StorageError> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|stored| VersionedObject {
                body: stored.body.clone(),
                etag: Some(stored.etag.clone()),
            })
            .ok_or_else(|| StorageError::NotFound {
                key: key.to_string(),
            })
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        if self.take_delete_failure() {
            return Err(StorageError::ConnectionError(format!(
                "injected failure deleting {key}"
            )));
        }
        self.objects.write().await.remove(key);
        Ok(())
    }

    async fn delete_if_match(&self, key: &str, etag: &str) -> Result<(), StorageError> {
        self.require_conditional("conditional deletes")?;
        if self.take_delete_failure() {
            return Err(StorageError::ConnectionError(format!(
                "injected failure deleting {key}"
            )));
        }
        let mut objects = self.objects.write().await;
        match objects.get(key) {
            None => Err(StorageError::NotFound {
                key: key.to_string(),
            }),
            Some(stored) if stored.etag != etag => Err(StorageError::PreconditionFailed {
                key: key.to_string(),
            }),
            Some(_) => {
                objects.remove(key);
                Ok(())
            }
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .objects
            .read()
            .await
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities {
            conditional_writes: self.conditional_writes.load(Ordering::SeqCst),
        }
    }
}
