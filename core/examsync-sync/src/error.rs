//! Error types for the sync layer.
//!
//! Every variant maps to a stable, machine-readable code through
//! [`SyncError::code`]. Callers branch on the code; the message is for humans.

use examsync_blobstore::BlobStoreError;
use examsync_storage::StorageError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The package declares a schema version this build cannot read.
    #[error("unsupported schema version: {0}")]
    SchemaUnsupported(String),

    /// The payload digest differs from the one the caller expected.
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// A payload is larger than the configured ceiling.
    #[error("payload of {actual} bytes exceeds the {limit} byte limit")]
    SizeExceeded { limit: u64, actual: u64 },

    /// The package belongs to another account, or mixes owners.
    #[error("identity mismatch: {0}")]
    IdentityMismatch(String),

    /// The export scope does not name a usable owner or period.
    #[error("scope not found: {0}")]
    ScopeNotFound(String),

    /// The `since` filter is not an RFC 3339 instant.
    #[error("invalid date filter: {0}")]
    DateFilterInvalid(String),

    /// Backup metadata is missing its expiry or cannot be parsed.
    #[error("invalid backup metadata: {0}")]
    BackupMetaInvalid(String),

    /// The backup is past its expiry instant.
    #[error("backup expired at {0}")]
    BackupExpired(String),

    /// The backup was produced under different merge rules.
    #[error("backup invalidated: produced under {found}, current rules are {current}")]
    BackupInvalidated { found: String, current: String },

    /// No backup with this id exists in the archive.
    #[error("backup not found: {0}")]
    BackupNotFound(String),

    /// The package decoded but does not have the expected shape.
    #[error("malformed package: {0}")]
    Malformed(String),

    /// The identity directory could not be consulted.
    #[error("identity lookup failed: {0}")]
    IdentityLookup(String),

    /// Record store error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Blob store error.
    #[error("blob store error: {0}")]
    BlobStore(#[from] BlobStoreError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Audit log persistence error.
    #[error("audit log error: {0}")]
    Audit(String),
}

impl SyncError {
    /// Stable error code for callers and audit entries.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::SchemaUnsupported(_) => "SCHEMA_UNSUPPORTED",
            SyncError::ChecksumMismatch { .. } => "CHECKSUM_MISMATCH",
            SyncError::SizeExceeded { .. } => "SIZE_EXCEEDED",
            SyncError::IdentityMismatch(_) => "IDENTITY_MISMATCH",
            SyncError::ScopeNotFound(_) => "SCOPE_NOT_FOUND",
            SyncError::DateFilterInvalid(_) => "DATE_FILTER_INVALID",
            SyncError::BackupMetaInvalid(_) => "BACKUP_META_INVALID",
            SyncError::BackupExpired(_) => "BACKUP_EXPIRED",
            SyncError::BackupInvalidated { .. } => "BACKUP_INVALIDATED",
            SyncError::BackupNotFound(_) => "BACKUP_NOT_FOUND",
            SyncError::Malformed(_) => "PACKAGE_MALFORMED",
            SyncError::IdentityLookup(_) => "IDENTITY_LOOKUP_FAILED",
            SyncError::Storage(_) => "STORAGE_FAILED",
            SyncError::BlobStore(_) => "BLOB_STORE_FAILED",
            SyncError::Serialization(_) => "SERIALIZATION_FAILED",
            SyncError::Io(_) => "IO_FAILED",
            SyncError::Audit(_) => "AUDIT_FAILED",
        }
    }
}
