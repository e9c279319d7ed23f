use async_trait::async_trait;
use examsync_sync::{AuditLog, AuditSink, MemoryAuditSink, SqliteAuditSink, SyncError, SyncResult};
use examsync_types::{AuditKind, AuditStatus, SyncAuditRecord};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct CountingFailSink {
    calls: AtomicUsize,
}

#[async_trait]
impl AuditSink for CountingFailSink {
    async fn append(&self, _record: &SyncAuditRecord) -> SyncResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(SyncError::Audit("sink unavailable".to_string()))
    }
}

// ── AuditLog ─────────────────────────────────────────────────────

#[tokio::test]
async fn record_appends_one_entry() {
    let sink = Arc::new(MemoryAuditSink::new());
    let log = AuditLog::new(sink.clone());

    let id = log
        .record(AuditKind::Export, "T1", AuditStatus::Success, json!({ "n": 1 }))
        .await;

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].attempt_id, id);
    assert_eq!(records[0].details["n"], 1);
}

#[tokio::test]
async fn attempt_shares_id_between_pending_and_terminal() {
    let sink = Arc::new(MemoryAuditSink::new());
    let log = AuditLog::new(sink.clone());

    let attempt = log.begin(AuditKind::Import, "T1").await;
    let id = attempt.id();
    attempt
        .finish(AuditStatus::Failed, json!({ "code": "IDENTITY_MISMATCH" }))
        .await;

    let records = sink.records();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.attempt_id == id));
    assert_eq!(records[0].status, AuditStatus::Pending);
    assert_eq!(records[1].status, AuditStatus::Failed);
    assert_eq!(records[1].kind, AuditKind::Import);
}

#[tokio::test]
async fn separate_attempts_get_distinct_ids() {
    let log = AuditLog::new(Arc::new(MemoryAuditSink::new()));
    let a = log.begin(AuditKind::Import, "T1").await;
    let b = log.begin(AuditKind::Import, "T1").await;
    assert_ne!(a.id(), b.id());
}

#[tokio::test]
async fn sink_failures_are_swallowed() {
    let sink = Arc::new(CountingFailSink {
        calls: AtomicUsize::new(0),
    });
    let log = AuditLog::new(sink.clone());

    log.record(AuditKind::Export, "T1", AuditStatus::Success, json!({}))
        .await;
    log.begin(AuditKind::Import, "T1")
        .await
        .finish(AuditStatus::Success, json!({}))
        .await;

    assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
}

// ── SqliteAuditSink ──────────────────────────────────────────────

#[tokio::test]
async fn sqlite_sink_round_trips_entries() {
    let sink = Arc::new(SqliteAuditSink::open_in_memory().unwrap());
    let log = AuditLog::new(sink.clone());

    let attempt = log.begin(AuditKind::Validate, "T1").await;
    attempt
        .finish(AuditStatus::Success, json!({ "counts": { "students": 3 } }))
        .await;

    let loaded = sink.load("T1", 10, 0).unwrap();
    assert_eq!(loaded.len(), 2);
    // Newest first.
    assert_eq!(loaded[0].status, AuditStatus::Success);
    assert_eq!(loaded[1].status, AuditStatus::Pending);
    assert_eq!(loaded[0].attempt_id, loaded[1].attempt_id);
    assert_eq!(loaded[0].kind, AuditKind::Validate);
    assert_eq!(loaded[0].details["counts"]["students"], 3);
}

#[tokio::test]
async fn sqlite_sink_filters_by_owner_and_paginates() {
    let sink = Arc::new(SqliteAuditSink::open_in_memory().unwrap());
    let log = AuditLog::new(sink.clone());
    for n in 0..5 {
        log.record(AuditKind::Export, "T1", AuditStatus::Success, json!({ "n": n }))
            .await;
    }
    log.record(AuditKind::Export, "T2", AuditStatus::Success, json!({}))
        .await;

    assert_eq!(sink.load("T1", 100, 0).unwrap().len(), 5);
    assert_eq!(sink.load("T2", 100, 0).unwrap().len(), 1);

    let page = sink.load("T1", 2, 1).unwrap();
    let ns: Vec<i64> = page
        .iter()
        .map(|r| r.details["n"].as_i64().unwrap())
        .collect();
    assert_eq!(ns, vec![3, 2]);
}

#[tokio::test]
async fn sqlite_sink_persists_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.db");
    {
        let sink = SqliteAuditSink::open(&path).unwrap();
        let record = SyncAuditRecord::new(
            examsync_types::AttemptId::new(),
            AuditKind::Import,
            "T1",
            AuditStatus::Success,
            json!({}),
        );
        sink.append(&record).await.unwrap();
    }
    let sink = SqliteAuditSink::open(&path).unwrap();
    assert_eq!(sink.load("T1", 10, 0).unwrap().len(), 1);
}
