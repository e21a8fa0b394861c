//! The object store seam consumed by the queue.

use async_trait::async_trait;

use super::error::StorageError;

/// What an object store can guarantee beyond plain PUT/GET/DELETE/LIST.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCapabilities {
    /// The store honors create-only writes (`If-None-Match: *`) and
    /// entity-tag guarded deletes (`If-Match`).
    pub conditional_writes: bool,
}

/// An object body along with the entity tag it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedObject {
    /// The object bytes.
    pub body: Vec<u8>,
    /// Opaque version token, if the store exposes one.
    pub etag: Option<String>,
}

/// A flat key/value object store over a single bucket.
///
/// Implementations must give read-after-write consistency for a single key.
/// Nothing else is assumed: no atomic rename, no multi-key transactions.
#[async_trait]
pub trait ObjectStore: std::fmt::Debug + Send + Sync {
    /// Writes `body` at `key`, replacing any existing object.
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), StorageError>;

    /// Writes `body` at `key` only if no object exists there.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadyExists` if the key is taken, and
    /// `StorageError::ConfigurationError` if the store lacks the capability.
    async fn put_if_absent(&self, key: &str, body: Vec<u8>) -> Result<(), StorageError>;

    /// Reads the object at `key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if there is no such object.
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Reads the object at `key` together with its entity tag.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if there is no such object.
    async fn get_versioned(&self, key: &str) -> Result<VersionedObject, StorageError> {
        Ok(VersionedObject {
            body: self.get(key).await?,
            etag: None,
        })
    }

    /// Deletes the object at `key`. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Deletes the object at `key` only while its entity tag is still `etag`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the object is gone,
    /// `StorageError::PreconditionFailed` if it was rewritten since it was
    /// read, and `StorageError::ConfigurationError` if the store lacks the
    /// capability.
    async fn delete_if_match(&self, key: &str, _etag: &str) -> Result<(), StorageError> {
        Err(StorageError::ConfigurationError(format!(
            "conditional deletes are not supported by this store (key '{key}')"
        )))
    }

    /// Lists every key starting with `prefix`, in the store's native order.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Reports what this store supports.
    fn capabilities(&self) -> StoreCapabilities;
}
