//! File-storage collaborator contract.
//!
//! The workflow touches storage only when images are created and when a
//! batch is deleted; it never inspects file content.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

/// Error raised by the storage backend.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct StorageError {
    pub message: String,
}

impl StorageError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Where uploaded image files live.
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Persist `bytes` under `path`, returning the stored path.
    async fn save(&self, path: &str, bytes: &[u8]) -> Result<String, StorageError>;

    async fn exists(&self, path: &str) -> Result<bool, StorageError>;

    async fn delete(&self, path: &str) -> Result<(), StorageError>;
}

/// In-memory storage for tests and single-process embedding.
#[derive(Default)]
pub struct MemoryStorage {
    files: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Vec<u8>>> {
        match self.files.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl FileStorage for MemoryStorage {
    async fn save(&self, path: &str, bytes: &[u8]) -> Result<String, StorageError> {
        self.lock().insert(path.to_string(), bytes.to_vec());
        Ok(path.to_string())
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self.lock().contains_key(path))
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        self.lock().remove(path);
        Ok(())
    }
}
