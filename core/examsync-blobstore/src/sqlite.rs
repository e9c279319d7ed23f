use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{sha256_hex, BlobRef, BlobStore, BlobStoreError, BlobStoreResult};

/// Namespace used for exam PDFs unless another is configured.
pub const DEFAULT_NAMESPACE: &str = "exam-pdfs";

/// Listing entry for a stored blob.
#[derive(Debug, Clone, Serialize)]
pub struct BlobMetadata {
    pub namespace: String,
    pub blob_id: String,
    pub size: i64,
    pub content_hash: String,
    pub created_at: i64,
}

/// SQLite-backed, namespace-scoped, content-addressed blob store.
pub struct SqliteBlobStore {
    conn: Arc<Mutex<Connection>>,
    namespace: String,
}

impl SqliteBlobStore {
    /// Opens (or creates) a blob store at the given path.
    pub fn open(path: &Path) -> BlobStoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::open_with_conn(Arc::new(Mutex::new(conn)))
    }

    /// Opens an in-memory blob store (for testing).
    pub fn open_in_memory() -> BlobStoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::open_with_conn(Arc::new(Mutex::new(conn)))
    }

    /// Uses an existing connection with the default namespace.
    pub fn open_with_conn(conn: Arc<Mutex<Connection>>) -> BlobStoreResult<Self> {
        let store = Self {
            conn,
            namespace: DEFAULT_NAMESPACE.to_string(),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Returns a handle scoped to another namespace over the same connection.
    #[must_use]
    pub fn with_namespace(&self, namespace: impl Into<String>) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
            namespace: namespace.into(),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn lock(&self) -> BlobStoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| BlobStoreError::Storage("blob store lock poisoned".to_string()))
    }

    fn init_schema(&self) -> BlobStoreResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS blobs (
                namespace TEXT NOT NULL,
                blob_id TEXT NOT NULL,
                data BLOB NOT NULL,
                size INTEGER NOT NULL,
                content_hash TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (namespace, blob_id)
            );
            ",
        )?;
        Ok(())
    }

    /// Lists blobs in this namespace, oldest first.
    pub fn list(&self) -> BlobStoreResult<Vec<BlobMetadata>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT namespace, blob_id, size, content_hash, created_at
             FROM blobs WHERE namespace = ?1 ORDER BY created_at, blob_id",
        )?;
        let rows = stmt.query_map(params![self.namespace], |row| {
            Ok(BlobMetadata {
                namespace: row.get(0)?,
                blob_id: row.get(1)?,
                size: row.get(2)?,
                content_hash: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?;
        let items = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// Deletes a blob. Fails if it does not exist.
    pub fn delete(&self, reference: &BlobRef) -> BlobStoreResult<()> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM blobs WHERE namespace = ?1 AND blob_id = ?2",
            params![self.namespace, reference.as_str()],
        )?;
        if removed == 0 {
            return Err(BlobStoreError::NotFound(
                self.namespace.clone(),
                reference.to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for SqliteBlobStore {
    async fn write(&self, bytes: &[u8]) -> BlobStoreResult<BlobRef> {
        let hash = sha256_hex(bytes);
        let size = i64::try_from(bytes.len())
            .map_err(|_| BlobStoreError::Storage("blob too large".to_string()))?;
        let now = chrono::Utc::now().timestamp_millis();

        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO blobs (namespace, blob_id, data, size, content_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?2, ?5)",
            params![self.namespace, hash, bytes, size, now],
        )?;
        Ok(BlobRef::new(hash))
    }

    async fn read(&self, reference: &BlobRef) -> BlobStoreResult<Vec<u8>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT data FROM blobs WHERE namespace = ?1 AND blob_id = ?2",
            params![self.namespace, reference.as_str()],
            |row| row.get::<_, Vec<u8>>(0),
        )
        .optional()?
        .ok_or_else(|| BlobStoreError::NotFound(self.namespace.clone(), reference.to_string()))
    }
}
