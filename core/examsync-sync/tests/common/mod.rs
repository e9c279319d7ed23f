//! Shared fixtures for sync integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use examsync_blobstore::{BlobRef, BlobStore, BlobStoreError, BlobStoreResult, SqliteBlobStore};
use examsync_storage::{RecordStore, SqliteRecordStore};
use examsync_sync::{
    AuditLog, AuditSink, MemoryAuditSink, PackageAssembler, PackageProcessor,
    StaticIdentityDirectory, SyncConfig, SyncError, SyncResult,
};
use examsync_types::{parse_instant, Collection, SyncAuditRecord};
use serde_json::{json, Value};
use std::sync::Arc;

pub const OWNER: &str = "T1";
pub const OWNER_EMAIL: &str = "ana.teacher@example.com";
pub const OTHER_OWNER: &str = "T2";
pub const OTHER_EMAIL: &str = "bruno@example.com";

/// Contents of the PDF stored for exam `e1`.
pub const E1_PDF: &[u8] = b"%PDF-1.4 exam e1 answer sheet";

pub const CREATED: &str = "2026-01-05T10:00:00Z";
pub const EDITED: &str = "2026-02-10T09:00:00Z";

/// Routes crate logs to the test harness; `RUST_LOG` picks the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn at(raw: &str) -> DateTime<Utc> {
    parse_instant(raw).unwrap()
}

/// In-memory stores plus the collaborators wired around them.
pub struct Harness {
    pub records: Arc<SqliteRecordStore>,
    pub blobs: Arc<SqliteBlobStore>,
    pub audit: Arc<MemoryAuditSink>,
    pub directory: Arc<StaticIdentityDirectory>,
    pub config: SyncConfig,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(SyncConfig::default())
    }

    pub fn with_config(config: SyncConfig) -> Self {
        init_tracing();
        Self {
            records: Arc::new(SqliteRecordStore::open_in_memory().unwrap()),
            blobs: Arc::new(SqliteBlobStore::open_in_memory().unwrap()),
            audit: Arc::new(MemoryAuditSink::new()),
            directory: Arc::new(
                StaticIdentityDirectory::new()
                    .with(OWNER, OWNER_EMAIL)
                    .with(OTHER_OWNER, OTHER_EMAIL),
            ),
            config,
        }
    }

    pub fn with_directory(mut self, directory: StaticIdentityDirectory) -> Self {
        self.directory = Arc::new(directory);
        self
    }

    pub fn assembler(&self) -> PackageAssembler {
        PackageAssembler::new(
            self.records.clone(),
            self.blobs.clone(),
            self.directory.clone(),
            AuditLog::new(self.audit.clone()),
            self.config.clone(),
        )
    }

    pub fn processor(&self) -> PackageProcessor {
        self.processor_with_blobs(self.blobs.clone())
    }

    pub fn processor_with_blobs(&self, blobs: Arc<dyn BlobStore>) -> PackageProcessor {
        PackageProcessor::new(
            self.records.clone(),
            blobs,
            self.directory.clone(),
            AuditLog::new(self.audit.clone()),
            self.config.clone(),
        )
    }

    pub async fn put(&self, collection: Collection, document: Value) {
        let id = document["id"].as_str().unwrap().to_string();
        self.records
            .upsert_by_id(collection, &id, document)
            .await
            .unwrap();
    }

    pub async fn get(&self, collection: Collection, id: &str) -> Option<Value> {
        self.records.find_by_id(collection, id).await.unwrap()
    }

    pub fn count(&self, collection: Collection) -> usize {
        self.records.count(collection).unwrap()
    }

    /// Total documents across every collection.
    pub fn total_records(&self) -> usize {
        Collection::ALL.into_iter().map(|c| self.count(c)).sum()
    }
}

/// Seeds owner `T1` with two periods and owner `T2` with one.
///
/// Period `P1` holds students s1-s3, question q1, template t1 and exam e1
/// (with a stored PDF), deliveries d1, grades g1-g2. Period `P2` holds s4,
/// q3, t2, exam e2, d2, g3 and flag f1. q2 is owner-wide. s1, e1 and g1 were
/// edited on `EDITED`; everything else only carries `CREATED`.
pub async fn seed_dataset(h: &Harness) {
    let pdf_ref = h.blobs.write(E1_PDF).await.unwrap();

    for (id, name) in [("P1", "2026 Spring"), ("P2", "2026 Fall")] {
        h.put(
            Collection::Periods,
            json!({ "id": id, "ownerId": OWNER, "name": name, "archived": false, "createdAt": CREATED }),
        )
        .await;
    }

    for (id, period, name) in [
        ("s1", "P1", "Ana Lima"),
        ("s2", "P1", "Beto Souza"),
        ("s3", "P1", "Carla Reis"),
        ("s4", "P2", "Davi Alves"),
    ] {
        let mut doc = json!({ "id": id, "ownerId": OWNER, "periodId": period, "fullName": name, "createdAt": CREATED });
        if id == "s1" {
            doc["updatedAt"] = json!(EDITED);
        }
        h.put(Collection::Students, doc).await;
    }

    h.put(
        Collection::QuestionBank,
        json!({ "id": "q1", "ownerId": OWNER, "periodId": "P1", "prompt": "2 + 2?", "options": ["3", "4"], "answerKey": "4", "createdAt": CREATED }),
    )
    .await;
    h.put(
        Collection::QuestionBank,
        json!({ "id": "q2", "ownerId": OWNER, "prompt": "Capital of Peru?", "options": ["Lima", "Quito"], "createdAt": CREATED }),
    )
    .await;
    h.put(
        Collection::QuestionBank,
        json!({ "id": "q3", "ownerId": OWNER, "periodId": "P2", "prompt": "3 * 3?", "options": ["6", "9"], "createdAt": CREATED }),
    )
    .await;

    h.put(
        Collection::Templates,
        json!({ "id": "t1", "ownerId": OWNER, "periodId": "P1", "title": "Midterm", "questionIds": ["q1", "q2"], "totalPoints": 10.0, "createdAt": CREATED }),
    )
    .await;
    h.put(
        Collection::Templates,
        json!({ "id": "t2", "ownerId": OWNER, "periodId": "P2", "title": "Final", "questionIds": ["q3"], "createdAt": CREATED }),
    )
    .await;

    h.put(
        Collection::GeneratedExams,
        json!({ "id": "e1", "ownerId": OWNER, "periodId": "P1", "templateId": "t1", "folio": "A-001", "pdfRef": pdf_ref.as_str(), "createdAt": CREATED, "updatedAt": EDITED }),
    )
    .await;
    h.put(
        Collection::GeneratedExams,
        json!({ "id": "e2", "ownerId": OWNER, "periodId": "P2", "templateId": "t2", "createdAt": CREATED }),
    )
    .await;

    h.put(
        Collection::Deliveries,
        json!({ "id": "d1", "ownerId": OWNER, "examId": "e1", "studentId": "s1", "createdAt": CREATED }),
    )
    .await;
    h.put(
        Collection::Deliveries,
        json!({ "id": "d2", "ownerId": OWNER, "examId": "e2", "studentId": "s4", "createdAt": CREATED }),
    )
    .await;

    h.put(
        Collection::Grades,
        json!({ "id": "g1", "ownerId": OWNER, "examId": "e1", "studentId": "s1", "score": 8.5, "maxScore": 10.0, "createdAt": CREATED, "updatedAt": EDITED }),
    )
    .await;
    h.put(
        Collection::Grades,
        json!({ "id": "g2", "ownerId": OWNER, "examId": "e1", "studentId": "s2", "score": 6.0, "maxScore": 10.0, "createdAt": CREATED }),
    )
    .await;
    h.put(
        Collection::Grades,
        json!({ "id": "g3", "ownerId": OWNER, "examId": "e2", "studentId": "s4", "score": 9.0, "createdAt": CREATED }),
    )
    .await;

    h.put(
        Collection::Flags,
        json!({ "id": "f1", "ownerId": OWNER, "examId": "e2", "studentId": "s4", "reason": "unreadable answer sheet", "createdAt": CREATED }),
    )
    .await;

    // Another tenant sharing the same store.
    h.put(
        Collection::Periods,
        json!({ "id": "P9", "ownerId": OTHER_OWNER, "name": "Other school", "archived": false, "createdAt": CREATED }),
    )
    .await;
    h.put(
        Collection::Students,
        json!({ "id": "s9", "ownerId": OTHER_OWNER, "periodId": "P9", "fullName": "Eva Costa", "createdAt": CREATED }),
    )
    .await;
    h.put(
        Collection::Grades,
        json!({ "id": "g9", "ownerId": OTHER_OWNER, "examId": "e1", "studentId": "s9", "score": 1.0, "createdAt": CREATED }),
    )
    .await;
}

/// Audit sink that always fails.
pub struct FailingAuditSink;

#[async_trait]
impl AuditSink for FailingAuditSink {
    async fn append(&self, _record: &SyncAuditRecord) -> SyncResult<()> {
        Err(SyncError::Audit("disk full".to_string()))
    }
}

/// Blob store whose writes always fail.
pub struct FailingBlobStore;

#[async_trait]
impl BlobStore for FailingBlobStore {
    async fn write(&self, _bytes: &[u8]) -> BlobStoreResult<BlobRef> {
        Err(BlobStoreError::Storage("quota exceeded".to_string()))
    }

    async fn read(&self, reference: &BlobRef) -> BlobStoreResult<Vec<u8>> {
        Err(BlobStoreError::NotFound(
            "exam-pdfs".to_string(),
            reference.to_string(),
        ))
    }
}
