//! Offline-first export, import and backup engine for examsync.
//!
//! One owner's dataset travels as a `SyncPackage`: a versioned,
//! gzip-compressed, canonically serialized snapshot with two digests.
//!
//! # Architecture
//!
//! Storage is reached only through collaborator traits (`RecordStore`,
//! `BlobStore`, `IdentityDirectory`, `AuditSink`), so the engine runs the same
//! against SQLite, an in-memory double or a host application's own stores.
//!
//! ## Components
//!
//! - **Codec**: canonical JSON, gzip, SHA-256 digests
//! - **Resolver**: document-level last-writer-wins
//! - **Identity**: decides whether a package may be imported by an owner
//! - **Assembler**: scoped export with bounded blob embedding
//! - **Processor**: validated, idempotent import
//! - **Backup**: local backup archive, rotation and gated restore
//! - **Scheduler**: explicit-state periodic triggers
//! - **Audit**: append-only operability log
//!
//! ## Import Process
//!
//! 1. **Guard**: reject oversized payloads before decompressing
//! 2. **Decode**: bounded gunzip, schema version check, digest check
//! 3. **Identity**: reconcile the declared owner, refuse foreign records
//! 4. **Merge**: upsert collections in dependency order through LWW
//! 5. **Blobs**: restore each PDF independently and report per-blob outcomes
//!
//! # Example
//!
//! ```
//! use examsync_sync::{validate_backup_meta, IntegrityCodec};
//! use examsync_types::{BackupMeta, SyncPackage};
//! use chrono::Utc;
//!
//! let package = SyncPackage::new("T1", Utc::now());
//! let encoded = IntegrityCodec::encode(&package).unwrap();
//! assert!(IntegrityCodec::verify_compressed(&encoded.bytes, &encoded.digest_compressed));
//!
//! let meta = BackupMeta::issue(Utc::now(), std::time::Duration::from_secs(60), "v2-lww");
//! assert!(validate_backup_meta(Some(&meta), Utc::now()).is_ok());
//! ```

mod assembler;
pub mod audit;
pub mod backup;
pub mod codec;
mod config;
mod error;
pub mod identity;
mod processor;
pub mod resolver;
pub mod scheduler;

pub use assembler::{AssembledPackage, PackageAssembler};
pub use audit::{AuditAttempt, AuditLog, AuditSink, MemoryAuditSink, SqliteAuditSink};
pub use backup::{
    restore_local_backup, validate_backup_meta, BackupArchive, BackupMetaValidator,
    BackupRotationJob, DirectoryBackupArchive, LocalBackup,
};
pub use codec::{EncodedPackage, IntegrityCodec};
pub use config::{SyncConfig, BUSINESS_LOGIC_FINGERPRINT, MAX_BLOBS_PER_PACKAGE, MAX_BLOB_BYTES};
pub use error::{SyncError, SyncResult};
pub use identity::{
    normalize_email, IdentityDirectory, IdentityReconciler, Reconciliation,
    StaticIdentityDirectory,
};
pub use processor::{
    BlobFailure, BlobOutcome, CollectionTally, ImportRequest, ImportResult, PackageProcessor,
};
pub use resolver::{ConflictResolver, Resolution};
pub use scheduler::{ScheduledJob, Scheduler, SchedulerState, TickOutcome};
