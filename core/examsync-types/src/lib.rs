//! Core type definitions for examsync.
//!
//! This crate defines the plain data types shared by storage and sync:
//! - Identifiers for audit attempts and local backups (UUID v7)
//! - RFC 3339 instant parsing and mutation stamps
//! - One explicit record struct per synchronized collection
//! - The `SyncPackage` wire contract and its `PdfAsset` blobs
//! - Backup metadata and audit records
//!
//! Nothing here performs I/O. Stored documents are loosely typed JSON; these
//! structs are the boundary where they become checked values.

mod audit;
mod backup;
mod ids;
mod package;
mod records;
mod timestamp;

pub use audit::{AuditKind, AuditStatus, SyncAuditRecord};
pub use backup::BackupMeta;
pub use ids::{AttemptId, BackupId};
pub use package::{
    CollectionCounts, PackageScope, PdfAsset, SyncPackage, CURRENT_SCHEMA_VERSION,
    SUPPORTED_SCHEMA_VERSIONS,
};
pub use records::{
    Collection, Delivery, Flag, GeneratedExam, Grade, Period, QuestionBankItem, Student,
    SyncRecord, Template,
};
pub use timestamp::{parse_instant, MutationStamp};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}
