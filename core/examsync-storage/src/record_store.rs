//! SQLite-backed record store.

use async_trait::async_trait;
use examsync_types::Collection;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::{RecordFilter, RecordStore, StorageError, StorageResult};

/// Stores every collection in one `records` table keyed by (collection, id).
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    /// Opens (or creates) a record store at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        Self::open_with_conn(Arc::new(Mutex::new(conn)))
    }

    /// Opens an in-memory record store (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::open_with_conn(Arc::new(Mutex::new(conn)))
    }

    /// Uses an existing connection, so records can share a database file
    /// with the blob store and audit log.
    pub fn open_with_conn(conn: Arc<Mutex<Connection>>) -> StorageResult<Self> {
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    fn init_schema(&self) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS records (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                doc TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            );

            CREATE INDEX IF NOT EXISTS idx_records_owner
                ON records (collection, owner_id);
            ",
        )?;
        Ok(())
    }

    /// Number of stored documents in a collection.
    pub fn count(&self, collection: Collection) -> StorageResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM records WHERE collection = ?1",
            params![collection.name()],
            |row| row.get(0),
        )?;
        usize::try_from(count).map_err(|e| StorageError::InvalidData(e.to_string()))
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn find_by_filter(
        &self,
        collection: Collection,
        filter: &RecordFilter,
    ) -> StorageResult<Vec<Value>> {
        let conn = self.lock()?;
        let raw: Vec<String> = match filter.owner_id() {
            Some(owner) => {
                let mut stmt = conn.prepare(
                    "SELECT doc FROM records WHERE collection = ?1 AND owner_id = ?2 ORDER BY id",
                )?;
                let rows = stmt.query_map(params![collection.name(), owner], |row| row.get(0))?;
                let docs = rows.collect::<Result<Vec<String>, _>>()?;
                docs
            }
            None => {
                let mut stmt =
                    conn.prepare("SELECT doc FROM records WHERE collection = ?1 ORDER BY id")?;
                let rows = stmt.query_map(params![collection.name()], |row| row.get(0))?;
                let docs = rows.collect::<Result<Vec<String>, _>>()?;
                docs
            }
        };

        let mut documents = Vec::with_capacity(raw.len());
        for doc in raw {
            let value: Value = serde_json::from_str(&doc)?;
            if filter.matches(&value) {
                documents.push(value);
            }
        }

        debug!(
            "find_by_filter {} matched {} documents",
            collection,
            documents.len()
        );
        Ok(documents)
    }

    async fn find_by_id(&self, collection: Collection, id: &str) -> StorageResult<Option<Value>> {
        let conn = self.lock()?;
        let doc: Option<String> = conn
            .query_row(
                "SELECT doc FROM records WHERE collection = ?1 AND id = ?2",
                params![collection.name(), id],
                |row| row.get(0),
            )
            .optional()?;

        doc.map(|d| serde_json::from_str(&d).map_err(StorageError::from))
            .transpose()
    }

    async fn upsert_by_id(
        &self,
        collection: Collection,
        id: &str,
        document: Value,
    ) -> StorageResult<()> {
        if !document.is_object() {
            return Err(StorageError::InvalidData(format!(
                "{collection}/{id}: document must be a JSON object"
            )));
        }
        let owner_id = document
            .get("ownerId")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let doc = serde_json::to_string(&document)?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO records (collection, id, owner_id, doc) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (collection, id) DO UPDATE SET owner_id = excluded.owner_id, doc = excluded.doc",
            params![collection.name(), id, owner_id, doc],
        )?;
        Ok(())
    }
}
