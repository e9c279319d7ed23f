//! Append-only audit trail for export and import attempts.
//!
//! The log exists for operability only. A sink that fails is reported at
//! `warn` and otherwise ignored; it never fails or rolls back the operation
//! being audited.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use examsync_types::{AttemptId, AuditKind, AuditStatus, SyncAuditRecord};
use rusqlite::{params, Connection};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

use crate::error::{SyncError, SyncResult};

/// Destination for audit entries.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, record: &SyncAuditRecord) -> SyncResult<()>;
}

/// Front end over an [`AuditSink`] that never surfaces sink failures.
#[derive(Clone)]
pub struct AuditLog {
    sink: Arc<dyn AuditSink>,
}

impl AuditLog {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Appends a single entry for a new attempt.
    pub async fn record(
        &self,
        kind: AuditKind,
        owner_id: &str,
        status: AuditStatus,
        details: Value,
    ) -> AttemptId {
        let attempt_id = AttemptId::new();
        self.append_quietly(SyncAuditRecord::new(
            attempt_id, kind, owner_id, status, details,
        ))
        .await;
        attempt_id
    }

    /// Appends a `pending` entry and returns the attempt to finish later.
    pub async fn begin(&self, kind: AuditKind, owner_id: &str) -> AuditAttempt {
        let attempt = AuditAttempt {
            log: self.clone(),
            id: AttemptId::new(),
            kind,
            owner_id: owner_id.to_string(),
        };
        self.append_quietly(SyncAuditRecord::new(
            attempt.id,
            kind,
            owner_id,
            AuditStatus::Pending,
            Value::Object(serde_json::Map::new()),
        ))
        .await;
        attempt
    }

    async fn append_quietly(&self, record: SyncAuditRecord) {
        if let Err(e) = self.sink.append(&record).await {
            warn!(
                "Failed to append audit entry {} ({} {}): {}",
                record.attempt_id, record.kind, record.status, e
            );
        }
    }
}

/// An attempt that has been logged as `pending`.
///
/// `finish` consumes the attempt, so a terminal entry is written at most once.
pub struct AuditAttempt {
    log: AuditLog,
    id: AttemptId,
    kind: AuditKind,
    owner_id: String,
}

impl AuditAttempt {
    #[must_use]
    pub fn id(&self) -> AttemptId {
        self.id
    }

    /// Appends the terminal entry for this attempt.
    pub async fn finish(self, status: AuditStatus, details: Value) {
        if !status.is_terminal() {
            warn!("Audit attempt {} finished with non-terminal status", self.id);
        }
        let record = SyncAuditRecord::new(self.id, self.kind, &self.owner_id, status, details);
        self.log.append_quietly(record).await;
    }
}

/// Keeps entries in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<SyncAuditRecord>>,
}

impl MemoryAuditSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything appended so far, in order.
    #[must_use]
    pub fn records(&self) -> Vec<SyncAuditRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, record: &SyncAuditRecord) -> SyncResult<()> {
        self.records
            .lock()
            .map_err(|_| SyncError::Audit("audit buffer lock poisoned".to_string()))?
            .push(record.clone());
        Ok(())
    }
}

/// Persists entries to the `sync_audit_log` table.
pub struct SqliteAuditSink {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteAuditSink {
    /// Opens (or creates) an audit log at the given path.
    pub fn open(path: &Path) -> SyncResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| SyncError::Audit(format!("failed to open audit log: {e}")))?;
        Self::open_with_conn(Arc::new(Mutex::new(conn)))
    }

    /// Opens an in-memory audit log (for testing).
    pub fn open_in_memory() -> SyncResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SyncError::Audit(format!("failed to open in-memory audit log: {e}")))?;
        Self::open_with_conn(Arc::new(Mutex::new(conn)))
    }

    /// Uses an existing connection.
    pub fn open_with_conn(conn: Arc<Mutex<Connection>>) -> SyncResult<Self> {
        let sink = Self { conn };
        sink.init_schema()?;
        Ok(sink)
    }

    fn lock(&self) -> SyncResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| SyncError::Audit("audit log lock poisoned".to_string()))
    }

    fn init_schema(&self) -> SyncResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS sync_audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                attempt_id TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                status TEXT NOT NULL,
                kind TEXT NOT NULL,
                details TEXT NOT NULL,
                executed_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sync_audit_owner
                ON sync_audit_log (owner_id, id);
            ",
        )
        .map_err(|e| SyncError::Audit(format!("failed to create audit schema: {e}")))?;
        Ok(())
    }

    /// Loads an owner's entries, newest first, with pagination.
    pub fn load(
        &self,
        owner_id: &str,
        limit: usize,
        offset: usize,
    ) -> SyncResult<Vec<SyncAuditRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT attempt_id, owner_id, status, kind, details, executed_at
                 FROM sync_audit_log WHERE owner_id = ?1
                 ORDER BY id DESC LIMIT ?2 OFFSET ?3",
            )
            .map_err(|e| SyncError::Audit(format!("failed to prepare audit query: {e}")))?;

        let rows = stmt
            .query_map(params![owner_id, limit as i64, offset as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .map_err(|e| SyncError::Audit(format!("failed to query audit log: {e}")))?;

        let mut result = Vec::new();
        for row in rows {
            let (attempt_str, owner_id, status_str, kind_str, details_str, ts_str) =
                row.map_err(|e| SyncError::Audit(format!("failed to read audit row: {e}")))?;

            let attempt_id: AttemptId = attempt_str
                .parse()
                .map_err(|e| SyncError::Audit(format!("invalid attempt_id in audit: {e}")))?;
            let status: AuditStatus = status_str.parse().map_err(SyncError::Audit)?;
            let kind: AuditKind = kind_str.parse().map_err(SyncError::Audit)?;
            let details: Value = serde_json::from_str(&details_str)?;
            let executed_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&ts_str)
                .map_err(|e| SyncError::Audit(format!("invalid timestamp in audit: {e}")))?
                .with_timezone(&Utc);

            result.push(SyncAuditRecord {
                attempt_id,
                owner_id,
                status,
                kind,
                details,
                executed_at,
            });
        }
        Ok(result)
    }
}

#[async_trait]
impl AuditSink for SqliteAuditSink {
    async fn append(&self, record: &SyncAuditRecord) -> SyncResult<()> {
        let details = serde_json::to_string(&record.details)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sync_audit_log (attempt_id, owner_id, status, kind, details, executed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.attempt_id.to_string(),
                record.owner_id,
                record.status.as_str(),
                record.kind.as_str(),
                details,
                record.executed_at.to_rfc3339(),
            ],
        )
        .map_err(|e| SyncError::Audit(format!("failed to save audit entry: {e}")))?;
        Ok(())
    }
}
