//! Blob storage for rendered exam documents.
//!
//! Blobs are content-addressed: the reference returned by [`BlobStore::write`]
//! is the SHA-256 of the bytes, so writing the same document twice stores it
//! once and returns the same reference. That makes blob restoration during
//! import safe to repeat.

mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use sqlite::{BlobMetadata, SqliteBlobStore, DEFAULT_NAMESPACE};

/// Result type for blob store operations.
pub type BlobStoreResult<T> = Result<T, BlobStoreError>;

/// Errors that can occur in blob store operations.
#[derive(Debug, Error)]
pub enum BlobStoreError {
    /// No blob with this id exists in the namespace.
    #[error("blob not found: {0}/{1}")]
    NotFound(String, String),

    /// Underlying storage failure.
    #[error("blob storage error: {0}")]
    Storage(String),

    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Opaque reference to a stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobRef(String);

impl BlobRef {
    #[must_use]
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for BlobRef {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Blob store collaborator consumed by assembly (read) and import (write).
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Persists `bytes` and returns a reference to them.
    async fn write(&self, bytes: &[u8]) -> BlobStoreResult<BlobRef>;

    /// Reads the bytes behind a reference.
    async fn read(&self, reference: &BlobRef) -> BlobStoreResult<Vec<u8>>;
}

/// Lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(bytes))
}
