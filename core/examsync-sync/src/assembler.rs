//! Builds a `SyncPackage` from one owner's stored data.
//!
//! Assembly narrows the dataset by an optional period and an optional `since`
//! instant. Exam-dependent collections are always fetched through the ids of
//! the exams that survived filtering, never by owner alone, so nothing outside
//! the scope leaks into the package.

use chrono::{DateTime, Utc};
use examsync_blobstore::{BlobRef, BlobStore};
use examsync_storage::{RecordFilter, RecordStore};
use examsync_types::{
    parse_instant, AuditKind, AuditStatus, Collection, CollectionCounts, Delivery, Flag,
    GeneratedExam, Grade, PackageScope, PdfAsset, Period, QuestionBankItem, Student,
    SyncPackage, SyncRecord, Template,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::audit::AuditLog;
use crate::codec::IntegrityCodec;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::identity::{normalize_email, IdentityDirectory};

/// An encoded package together with its digests.
#[derive(Debug, Clone)]
pub struct AssembledPackage {
    pub package: SyncPackage,
    /// gzip(canonical JSON).
    pub bytes: Vec<u8>,
    pub digest_json: String,
    pub digest_compressed: String,
    pub counts: CollectionCounts,
    pub exported_at: DateTime<Utc>,
}

/// Scope after validation.
struct ResolvedScope {
    period_id: Option<String>,
    since: Option<DateTime<Utc>>,
}

impl ResolvedScope {
    fn admits<R: SyncRecord>(&self, record: &R) -> bool {
        match self.since {
            Some(since) => record.mutation_stamp().is_some_and(|stamp| stamp >= since),
            None => true,
        }
    }
}

/// Exports an owner's dataset.
pub struct PackageAssembler {
    records: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
    identity: Arc<dyn IdentityDirectory>,
    audit: AuditLog,
    config: SyncConfig,
}

impl PackageAssembler {
    pub fn new(
        records: Arc<dyn RecordStore>,
        blobs: Arc<dyn BlobStore>,
        identity: Arc<dyn IdentityDirectory>,
        audit: AuditLog,
        config: SyncConfig,
    ) -> Self {
        Self {
            records,
            blobs,
            identity,
            audit,
            config,
        }
    }

    /// Assembles, encodes and audits a package for `owner_id`.
    pub async fn assemble(
        &self,
        owner_id: &str,
        scope: &PackageScope,
        include_blobs: bool,
    ) -> SyncResult<AssembledPackage> {
        let resolved = self.resolve_scope(owner_id, scope).await?;
        let owned = || RecordFilter::owned_by(owner_id);
        let in_period = |filter: RecordFilter| match &resolved.period_id {
            Some(period_id) => filter.field_eq("periodId", period_id.as_str()),
            None => filter,
        };
        let period_filter = match &resolved.period_id {
            Some(period_id) => owned().field_eq("id", period_id.as_str()),
            None => owned(),
        };

        let owner_filter = owned();
        let scoped_filter = in_period(owned());

        let (periods, students, question_bank, templates, generated_exams) = tokio::try_join!(
            self.load::<Period>(&period_filter),
            self.load::<Student>(&scoped_filter),
            self.load::<QuestionBankItem>(&owner_filter),
            self.load::<Template>(&scoped_filter),
            self.load::<GeneratedExam>(&scoped_filter),
        )?;

        let mut package = SyncPackage::new(owner_id, Utc::now());
        package.scope = scope.clone();
        package.owner_email = self.owner_email(owner_id).await;
        package.periods = self.narrow(periods, &resolved);
        package.students = self.narrow(students, &resolved);
        package.question_bank = self
            .narrow(question_bank, &resolved)
            .into_iter()
            .filter(|item| match (&resolved.period_id, item.period_id.as_deref()) {
                (Some(scoped), Some(own)) => scoped == own,
                _ => true,
            })
            .collect();
        package.templates = self.narrow(templates, &resolved);
        package.generated_exams = self.narrow(generated_exams, &resolved);

        let exam_ids: Vec<String> = package
            .generated_exams
            .iter()
            .map(|exam| exam.id.clone())
            .collect();
        let dependents = owned().field_in("examId", exam_ids);
        let (deliveries, grades, flags) = tokio::try_join!(
            self.load::<Delivery>(&dependents),
            self.load::<Grade>(&dependents),
            self.load::<Flag>(&dependents),
        )?;
        package.deliveries = self.narrow(deliveries, &resolved);
        package.grades = self.narrow(grades, &resolved);
        package.flags = self.narrow(flags, &resolved);

        if include_blobs {
            package.pdfs = self.collect_pdfs(&package.generated_exams).await;
        }
        package.counts = package.computed_counts();

        let encoded = IntegrityCodec::encode(&package)?;
        let counts = package.counts.clone();
        let exported_at = package.exported_at;

        info!(
            "Assembled package for {} ({} bytes, {} pdfs)",
            owner_id,
            encoded.bytes.len(),
            package.pdfs.len()
        );
        self.audit
            .record(
                AuditKind::Export,
                owner_id,
                AuditStatus::Success,
                json!({
                    "scope": scope,
                    "counts": counts,
                    "digestJson": encoded.digest_json,
                    "bytes": encoded.bytes.len(),
                }),
            )
            .await;

        Ok(AssembledPackage {
            package,
            bytes: encoded.bytes,
            digest_json: encoded.digest_json,
            digest_compressed: encoded.digest_compressed,
            counts,
            exported_at,
        })
    }

    async fn resolve_scope(&self, owner_id: &str, scope: &PackageScope) -> SyncResult<ResolvedScope> {
        if owner_id.trim().is_empty() {
            return Err(SyncError::ScopeNotFound("owner id is required".to_string()));
        }

        let since = match scope.since.as_deref() {
            Some(raw) => Some(
                parse_instant(raw)
                    .map_err(|e| SyncError::DateFilterInvalid(format!("{raw}: {e}")))?,
            ),
            None => None,
        };

        if let Some(period_id) = scope.period_id.as_deref() {
            let owned = self
                .records
                .find_by_id(Collection::Periods, period_id)
                .await?
                .is_some_and(|doc| doc.get("ownerId").and_then(|v| v.as_str()) == Some(owner_id));
            if !owned {
                return Err(SyncError::ScopeNotFound(format!(
                    "period {period_id} not found for owner {owner_id}"
                )));
            }
        }

        Ok(ResolvedScope {
            period_id: scope.period_id.clone(),
            since,
        })
    }

    /// Reads and types one collection. Documents that do not fit the record
    /// type are left out of the package.
    async fn load<R: SyncRecord>(&self, filter: &RecordFilter) -> SyncResult<Vec<R>> {
        let documents = self.records.find_by_filter(R::COLLECTION, filter).await?;
        let mut records = Vec::with_capacity(documents.len());
        for document in documents {
            match serde_json::from_value::<R>(document) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping malformed {} document: {}", R::COLLECTION, e),
            }
        }
        Ok(records)
    }

    fn narrow<R: SyncRecord>(&self, records: Vec<R>, scope: &ResolvedScope) -> Vec<R> {
        let before = records.len();
        let kept: Vec<R> = records.into_iter().filter(|r| scope.admits(r)).collect();
        if kept.len() != before {
            debug!(
                "Date filter kept {} of {} {}",
                kept.len(),
                before,
                R::COLLECTION
            );
        }
        kept
    }

    async fn owner_email(&self, owner_id: &str) -> Option<String> {
        match self.identity.email_for(owner_id).await {
            Ok(email) => email.as_deref().and_then(normalize_email),
            Err(e) => {
                warn!("Could not look up email for {}: {}", owner_id, e);
                None
            }
        }
    }

    /// Embeds exam PDFs up to the blob count and byte ceilings.
    async fn collect_pdfs(&self, exams: &[GeneratedExam]) -> Vec<PdfAsset> {
        let mut pdfs = Vec::new();
        let mut total_bytes: u64 = 0;

        for exam in exams {
            if pdfs.len() >= self.config.max_blobs {
                info!("Blob count limit of {} reached", self.config.max_blobs);
                break;
            }
            let Some(reference) = exam.pdf_ref.as_deref() else {
                continue;
            };

            let raw = match self.blobs.read(&BlobRef::new(reference)).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("Skipping pdf for exam {}: {}", exam.id, e);
                    continue;
                }
            };
            let compressed = match IntegrityCodec::compress_blob(&raw) {
                Ok(compressed) => compressed,
                Err(e) => {
                    warn!("Skipping pdf for exam {}: {}", exam.id, e);
                    continue;
                }
            };

            let size = compressed.len() as u64;
            if total_bytes + size > self.config.max_blob_bytes {
                info!(
                    "Blob byte ceiling of {} reached after {} pdfs",
                    self.config.max_blob_bytes,
                    pdfs.len()
                );
                break;
            }
            total_bytes += size;

            pdfs.push(PdfAsset {
                generated_exam_id: exam.id.clone(),
                compressed_payload: compressed,
                content_hash: Some(IntegrityCodec::content_hash(&raw)),
            });
        }
        pdfs
    }
}
