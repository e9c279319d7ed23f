//! Record storage for examsync.
//!
//! The sync subsystem treats persistence as an external collaborator and only
//! needs three operations per collection: filtered reads, reads by id, and
//! upserts by id. [`RecordStore`] is that seam.
//!
//! # Architecture
//!
//! - Documents are stored as schemaless JSON, one row per (collection, id)
//! - The owner id is extracted into its own column for tenant-scoped reads
//! - [`RecordFilter`] matches top-level document fields; backends may push
//!   part of it down and evaluate the rest in memory
//!
//! [`SqliteRecordStore`] is the bundled backend.

mod error;
mod filter;
mod record_store;

use async_trait::async_trait;
use examsync_types::Collection;
use serde_json::Value;

pub use error::{StorageError, StorageResult};
pub use filter::RecordFilter;
pub use record_store::SqliteRecordStore;

/// Per-collection document repository consumed by assembly and import.
///
/// Every upsert is independently durable; there is no transaction spanning
/// calls.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Returns every document in `collection` matching `filter`, ordered by id.
    async fn find_by_filter(
        &self,
        collection: Collection,
        filter: &RecordFilter,
    ) -> StorageResult<Vec<Value>>;

    /// Returns the document with `id`, if present.
    async fn find_by_id(&self, collection: Collection, id: &str) -> StorageResult<Option<Value>>;

    /// Inserts or wholesale replaces the document with `id`.
    async fn upsert_by_id(
        &self,
        collection: Collection,
        id: &str,
        document: Value,
    ) -> StorageResult<()>;
}
