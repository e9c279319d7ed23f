//! Imports a `SyncPackage` into storage.
//!
//! Every structural, integrity and identity check runs before the first
//! write, so a rejected package leaves storage untouched. Merging then goes
//! collection by collection in dependency order. Each upsert is durable on
//! its own: an import interrupted by an infrastructure error converges when
//! retried, because re-applying the same records resolves to `Skip`.

use examsync_blobstore::{BlobRef, BlobStore};
use examsync_storage::RecordStore;
use examsync_types::{
    AuditKind, AuditStatus, Collection, CollectionCounts, PdfAsset, SyncPackage, SyncRecord,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::audit::AuditLog;
use crate::codec::IntegrityCodec;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::identity::{IdentityDirectory, IdentityReconciler};
use crate::resolver::{ConflictResolver, Resolution};

/// Input to [`PackageProcessor::process`].
#[derive(Debug, Clone)]
pub struct ImportRequest {
    /// The owner performing the import.
    pub owner_id: String,
    /// gzip(canonical JSON) as produced by assembly.
    pub bytes: Vec<u8>,
    /// `digest_json` published alongside the bytes, if known.
    pub expected_digest: Option<String>,
    /// Validate only; write nothing.
    pub dry_run: bool,
}

impl ImportRequest {
    pub fn new(owner_id: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            owner_id: owner_id.into(),
            bytes,
            expected_digest: None,
            dry_run: false,
        }
    }

    #[must_use]
    pub fn with_digest(mut self, digest: impl Into<String>) -> Self {
        self.expected_digest = Some(digest.into());
        self
    }

    #[must_use]
    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }
}

/// Per-collection merge counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionTally {
    pub collection: Collection,
    pub received: u64,
    pub applied: u64,
    pub skipped: u64,
    /// Dependent records whose parent exam is not in the package.
    pub dropped: u64,
}

impl CollectionTally {
    fn new(collection: Collection) -> Self {
        Self {
            collection,
            received: 0,
            applied: 0,
            skipped: 0,
            dropped: 0,
        }
    }
}

/// Why a single blob was not restored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum BlobFailure {
    /// The payload is not gzip or is too large.
    Decompress { message: String },
    /// The decompressed bytes do not hash to the declared `contentHash`.
    HashMismatch { expected: String, actual: String },
    /// Neither the package nor the importing owner's storage has this exam.
    ExamMissing,
    /// The blob store or record store failed.
    Storage { message: String },
}

impl fmt::Display for BlobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobFailure::Decompress { message } => write!(f, "cannot decompress: {message}"),
            BlobFailure::HashMismatch { expected, actual } => {
                write!(f, "content hash mismatch: expected {expected}, got {actual}")
            }
            BlobFailure::ExamMissing => f.write_str("owning exam not found"),
            BlobFailure::Storage { message } => write!(f, "storage failed: {message}"),
        }
    }
}

/// Result of restoring one embedded PDF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum BlobOutcome {
    #[serde(rename_all = "camelCase")]
    Restored {
        generated_exam_id: String,
        reference: BlobRef,
    },
    #[serde(rename_all = "camelCase")]
    Failed {
        generated_exam_id: String,
        code: &'static str,
        reason: BlobFailure,
    },
    /// The stored exam won the merge, so its own `pdfRef` stays.
    #[serde(rename_all = "camelCase")]
    Skipped { generated_exam_id: String },
}

impl BlobOutcome {
    /// Code carried by every failed blob outcome.
    pub const RESTORE_FAILED: &'static str = "BLOB_RESTORE_FAILED";

    #[must_use]
    pub fn generated_exam_id(&self) -> &str {
        match self {
            BlobOutcome::Restored {
                generated_exam_id, ..
            }
            | BlobOutcome::Failed {
                generated_exam_id, ..
            }
            | BlobOutcome::Skipped { generated_exam_id } => generated_exam_id,
        }
    }

    #[must_use]
    pub fn is_restored(&self) -> bool {
        matches!(self, BlobOutcome::Restored { .. })
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, BlobOutcome::Failed { .. })
    }
}

/// What an import (or dry run) did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub message: String,
    pub dry_run: bool,
    /// Owner the records were written under.
    pub owner_id: String,
    /// Whether records were rebound from the declared owner.
    pub rebound: bool,
    /// Recomputed canonical digest of the package.
    pub digest_json: String,
    /// Counts computed from the received package.
    pub counts: CollectionCounts,
    /// One entry per collection, in merge order. Empty for a dry run.
    pub tally: Vec<CollectionTally>,
    pub blobs_restored: usize,
    pub blobs: Vec<BlobOutcome>,
}

impl ImportResult {
    #[must_use]
    pub fn tally_for(&self, collection: Collection) -> Option<&CollectionTally> {
        self.tally.iter().find(|t| t.collection == collection)
    }

    /// Blobs that could not be restored.
    pub fn failed_blobs(&self) -> impl Iterator<Item = &BlobOutcome> {
        self.blobs.iter().filter(|b| b.is_failed())
    }
}

/// Validates and merges packages into storage.
pub struct PackageProcessor {
    records: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
    identity: IdentityReconciler,
    audit: AuditLog,
    config: SyncConfig,
}

impl PackageProcessor {
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
            identity: IdentityReconciler::new(identity),
            audit,
            config,
        }
    }

    /// Runs an import, auditing it as `pending` then `success` or `failed`.
    pub async fn process(&self, request: ImportRequest) -> SyncResult<ImportResult> {
        let kind = if request.dry_run {
            AuditKind::Validate
        } else {
            AuditKind::Import
        };
        let attempt = self.audit.begin(kind, &request.owner_id).await;

        match self.run(&request).await {
            Ok(result) => {
                info!(
                    "Processed package for {} (dry_run={}, blobs restored={})",
                    result.owner_id, result.dry_run, result.blobs_restored
                );
                attempt
                    .finish(AuditStatus::Success, audit_details(&result))
                    .await;
                Ok(result)
            }
            Err(e) => {
                warn!("Import for {} rejected: {}", request.owner_id, e);
                attempt
                    .finish(
                        AuditStatus::Failed,
                        json!({ "code": e.code(), "message": e.to_string() }),
                    )
                    .await;
                Err(e)
            }
        }
    }

    async fn run(&self, request: &ImportRequest) -> SyncResult<ImportResult> {
        let expected = request.expected_digest.as_deref();

        let size = request.bytes.len() as u64;
        if size > self.config.max_payload_bytes {
            return Err(SyncError::SizeExceeded {
                limit: self.config.max_payload_bytes,
                actual: size,
            });
        }

        let value = match IntegrityCodec::decode(&request.bytes, self.config.max_decompressed_bytes) {
            Ok(value) => value,
            Err(SyncError::Malformed(reason)) => {
                return Err(match expected {
                    Some(expected) => SyncError::ChecksumMismatch {
                        expected: expected.to_string(),
                        actual: format!("undecodable payload ({reason})"),
                    },
                    None => SyncError::Malformed(reason),
                });
            }
            Err(e) => return Err(e),
        };

        check_schema_version(&value)?;

        let digest_json = IntegrityCodec::digest_value(&value)?;
        if let Some(expected) = expected {
            if !IntegrityCodec::digests_match(expected, &digest_json) {
                return Err(SyncError::ChecksumMismatch {
                    expected: expected.to_string(),
                    actual: digest_json,
                });
            }
        }

        let mut package: SyncPackage = serde_json::from_value(value)
            .map_err(|e| SyncError::Malformed(e.to_string()))?;
        check_blob_limits(&package, &self.config)?;

        let reconciliation = self
            .identity
            .reconcile(
                &request.owner_id,
                &package.owner_id,
                package.owner_email.as_deref(),
            )
            .await?;

        if let Some((collection, id)) = package.find_foreign_record(&package.owner_id) {
            return Err(SyncError::IdentityMismatch(format!(
                "{collection}/{id} is not owned by package owner {}",
                package.owner_id
            )));
        }

        if reconciliation.rebind_required {
            package.rebind_owner(&reconciliation.final_owner_id);
        }

        let counts = package.computed_counts();
        let owner_id = reconciliation.final_owner_id;

        if request.dry_run {
            return Ok(ImportResult {
                message: "Package is valid; nothing was written".to_string(),
                dry_run: true,
                owner_id,
                rebound: reconciliation.rebind_required,
                digest_json,
                counts,
                tally: Vec::new(),
                blobs_restored: 0,
                blobs: Vec::new(),
            });
        }

        let mut tally = Vec::with_capacity(Collection::ALL.len());
        tally.push(self.merge(&package.periods, &owner_id).await?);
        tally.push(self.merge(&package.students, &owner_id).await?);
        tally.push(self.merge(&package.question_bank, &owner_id).await?);
        tally.push(self.merge(&package.templates, &owner_id).await?);
        let (exam_tally, written_exams) = self
            .merge_collecting(&package.generated_exams, &owner_id)
            .await?;
        tally.push(exam_tally);

        let exam_ids = package.exam_ids();
        tally.push(self.merge_dependents(&package.deliveries, &exam_ids, &owner_id).await?);
        tally.push(self.merge_dependents(&package.grades, &exam_ids, &owner_id).await?);
        tally.push(self.merge_dependents(&package.flags, &exam_ids, &owner_id).await?);

        let mut blobs = Vec::with_capacity(package.pdfs.len());
        for asset in &package.pdfs {
            let exam_id = asset.generated_exam_id.as_str();
            let outcome = if !exam_ids.contains(exam_id) {
                blob_failed(asset, BlobFailure::ExamMissing)
            } else if !written_exams.contains(exam_id) {
                debug!("Keeping local pdf of exam {}: stored exam won the merge", exam_id);
                BlobOutcome::Skipped {
                    generated_exam_id: asset.generated_exam_id.clone(),
                }
            } else {
                self.restore_blob(asset, &owner_id).await
            };
            blobs.push(outcome);
        }
        let blobs_restored = blobs.iter().filter(|b| b.is_restored()).count();

        let applied: u64 = tally.iter().map(|t| t.applied).sum();
        Ok(ImportResult {
            message: format!(
                "Imported {applied} records and {blobs_restored} of {} pdfs",
                blobs.len()
            ),
            dry_run: false,
            owner_id,
            rebound: reconciliation.rebind_required,
            digest_json,
            counts,
            tally,
            blobs_restored,
            blobs,
        })
    }

    /// Upserts one collection through the conflict resolver.
    async fn merge<R: SyncRecord>(&self, records: &[R], owner_id: &str) -> SyncResult<CollectionTally> {
        Ok(self.merge_collecting(records, owner_id).await?.0)
    }

    /// Like [`Self::merge`], also returning the ids that were written.
    async fn merge_collecting<R: SyncRecord>(
        &self,
        records: &[R],
        owner_id: &str,
    ) -> SyncResult<(CollectionTally, HashSet<String>)> {
        let mut tally = CollectionTally::new(R::COLLECTION);
        let mut written = HashSet::new();
        for record in records {
            tally.received += 1;
            match self.merge_one(record, owner_id).await? {
                Resolution::Apply => {
                    tally.applied += 1;
                    written.insert(record.id().to_string());
                }
                Resolution::Skip => tally.skipped += 1,
            }
        }
        debug!(
            "Merged {}: {} applied, {} skipped",
            R::COLLECTION,
            tally.applied,
            tally.skipped
        );
        Ok((tally, written))
    }

    /// Upserts records whose parent exam is carried by the package; drops the rest.
    async fn merge_dependents<R: SyncRecord>(
        &self,
        records: &[R],
        exam_ids: &HashSet<String>,
        owner_id: &str,
    ) -> SyncResult<CollectionTally> {
        let mut tally = CollectionTally::new(R::COLLECTION);
        for record in records {
            tally.received += 1;
            let contained = record
                .parent_exam_id()
                .is_some_and(|exam_id| exam_ids.contains(exam_id));
            if !contained {
                debug!(
                    "Dropping {}/{}: parent exam not in package",
                    R::COLLECTION,
                    record.id()
                );
                tally.dropped += 1;
                continue;
            }
            match self.merge_one(record, owner_id).await? {
                Resolution::Apply => tally.applied += 1,
                Resolution::Skip => tally.skipped += 1,
            }
        }
        Ok(tally)
    }

    async fn merge_one<R: SyncRecord>(&self, record: &R, owner_id: &str) -> SyncResult<Resolution> {
        let existing = self.records.find_by_id(R::COLLECTION, record.id()).await?;

        let existing_stamp = match existing {
            None => None,
            Some(document) => {
                if document.get("ownerId").and_then(Value::as_str) != Some(owner_id) {
                    warn!(
                        "Not overwriting {}/{}: stored copy belongs to another owner",
                        R::COLLECTION,
                        record.id()
                    );
                    return Ok(Resolution::Skip);
                }
                Some(match serde_json::from_value::<R>(document.clone()) {
                    Ok(local) => local.mutation_stamp(),
                    Err(e) => {
                        warn!(
                            "Stored {}/{} does not parse ({}); comparing raw stamps",
                            R::COLLECTION,
                            record.id(),
                            e
                        );
                        ConflictResolver::document_stamp(&document)
                    }
                })
            }
        };

        let resolution = ConflictResolver::resolve(existing_stamp, record.mutation_stamp());
        if resolution == Resolution::Apply {
            let document = serde_json::to_value(record)?;
            self.records
                .upsert_by_id(R::COLLECTION, record.id(), document)
                .await?;
        }
        Ok(resolution)
    }

    async fn restore_blob(&self, asset: &PdfAsset, owner_id: &str) -> BlobOutcome {
        match self.try_restore_blob(asset, owner_id).await {
            Ok(reference) => BlobOutcome::Restored {
                generated_exam_id: asset.generated_exam_id.clone(),
                reference,
            },
            Err(reason) => blob_failed(asset, reason),
        }
    }

    async fn try_restore_blob(&self, asset: &PdfAsset, owner_id: &str) -> Result<BlobRef, BlobFailure> {
        let raw = IntegrityCodec::decompress_blob(
            &asset.compressed_payload,
            self.config.max_decompressed_bytes,
        )
        .map_err(|e| BlobFailure::Decompress {
            message: e.to_string(),
        })?;

        if let Some(expected) = asset.content_hash.as_deref() {
            let actual = IntegrityCodec::content_hash(&raw);
            if !IntegrityCodec::digests_match(expected, &actual) {
                return Err(BlobFailure::HashMismatch {
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        let mut exam = self
            .records
            .find_by_id(Collection::GeneratedExams, &asset.generated_exam_id)
            .await
            .map_err(storage_failure)?
            .filter(|doc| doc.get("ownerId").and_then(Value::as_str) == Some(owner_id))
            .ok_or(BlobFailure::ExamMissing)?;

        let reference = self.blobs.write(&raw).await.map_err(storage_failure)?;

        let fields = exam.as_object_mut().ok_or_else(|| BlobFailure::Storage {
            message: "stored exam is not a JSON object".to_string(),
        })?;
        if fields.get("pdfRef").and_then(Value::as_str) != Some(reference.as_str()) {
            fields.insert("pdfRef".to_string(), Value::String(reference.to_string()));
            self.records
                .upsert_by_id(Collection::GeneratedExams, &asset.generated_exam_id, exam)
                .await
                .map_err(storage_failure)?;
        }
        Ok(reference)
    }
}

fn blob_failed(asset: &PdfAsset, reason: BlobFailure) -> BlobOutcome {
    warn!(
        "Could not restore pdf for exam {}: {}",
        asset.generated_exam_id, reason
    );
    BlobOutcome::Failed {
        generated_exam_id: asset.generated_exam_id.clone(),
        code: BlobOutcome::RESTORE_FAILED,
        reason,
    }
}

fn storage_failure(e: impl fmt::Display) -> BlobFailure {
    BlobFailure::Storage {
        message: e.to_string(),
    }
}

/// Applies the export-side blob limits to an incoming package.
fn check_blob_limits(package: &SyncPackage, config: &SyncConfig) -> SyncResult<()> {
    let count = package.pdfs.len();
    if count > config.max_blobs {
        return Err(SyncError::SizeExceeded {
            limit: config.max_blobs as u64,
            actual: count as u64,
        });
    }
    let total: u64 = package
        .pdfs
        .iter()
        .map(|asset| asset.compressed_payload.len() as u64)
        .sum();
    if total > config.max_blob_bytes {
        return Err(SyncError::SizeExceeded {
            limit: config.max_blob_bytes,
            actual: total,
        });
    }
    Ok(())
}

fn check_schema_version(value: &Value) -> SyncResult<()> {
    match value.get("schemaVersion") {
        Some(version) if version.as_u64().is_some_and(SyncPackage::is_supported_version) => Ok(()),
        Some(version) => Err(SyncError::SchemaUnsupported(version.to_string())),
        None if value.is_object() => Err(SyncError::SchemaUnsupported("missing".to_string())),
        None => Err(SyncError::Malformed("package is not a JSON object".to_string())),
    }
}

fn audit_details(result: &ImportResult) -> Value {
    json!({
        "dryRun": result.dry_run,
        "rebound": result.rebound,
        "digestJson": result.digest_json,
        "counts": result.counts,
        "tally": result.tally,
        "blobsRestored": result.blobs_restored,
        "blobsFailed": result.failed_blobs().count(),
    })
}
