//! The `SyncPackage` wire contract.
//!
//! Field names, nesting and the `schemaVersion` discriminator are the only
//! bit-exact contract of the sync subsystem. Versions are not compatible
//! with each other: a reader rejects any version it does not list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::records::{
    Collection, Delivery, Flag, GeneratedExam, Grade, Period, QuestionBankItem, Student,
    SyncRecord, Template,
};

/// Schema version written by this build.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Schema versions this build can read. v1 lacks `ownerEmail` and blob hashes.
pub const SUPPORTED_SCHEMA_VERSIONS: &[u32] = &[1, 2];

/// Per-collection record counts, keyed by wire name.
pub type CollectionCounts = BTreeMap<String, u64>;

/// The (period, since) pair narrowing an export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageScope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
}

/// A rendered exam document shipped inside a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfAsset {
    pub generated_exam_id: String,
    /// Gzip-compressed document bytes, base64 on the wire.
    #[serde(with = "base64_bytes")]
    pub compressed_payload: Vec<u8>,
    /// Lowercase hex SHA-256 of the decompressed document (v2+).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

/// A versioned snapshot of one owner's dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPackage {
    pub schema_version: u32,
    pub exported_at: DateTime<Utc>,
    pub owner_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_email: Option<String>,
    #[serde(default)]
    pub scope: PackageScope,
    #[serde(default)]
    pub counts: CollectionCounts,
    #[serde(default)]
    pub periods: Vec<Period>,
    #[serde(default)]
    pub students: Vec<Student>,
    #[serde(default)]
    pub question_bank: Vec<QuestionBankItem>,
    #[serde(default)]
    pub templates: Vec<Template>,
    #[serde(default)]
    pub generated_exams: Vec<GeneratedExam>,
    #[serde(default)]
    pub deliveries: Vec<Delivery>,
    #[serde(default)]
    pub grades: Vec<Grade>,
    #[serde(default)]
    pub flags: Vec<Flag>,
    #[serde(default)]
    pub pdfs: Vec<PdfAsset>,
}

impl SyncPackage {
    /// Creates an empty package at the current schema version.
    #[must_use]
    pub fn new(owner_id: impl Into<String>, exported_at: DateTime<Utc>) -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            exported_at,
            owner_id: owner_id.into(),
            owner_email: None,
            scope: PackageScope::default(),
            counts: CollectionCounts::new(),
            periods: Vec::new(),
            students: Vec::new(),
            question_bank: Vec::new(),
            templates: Vec::new(),
            generated_exams: Vec::new(),
            deliveries: Vec::new(),
            grades: Vec::new(),
            flags: Vec::new(),
            pdfs: Vec::new(),
        }
    }

    /// Whether `version` is readable by this build.
    #[must_use]
    pub fn is_supported_version(version: u64) -> bool {
        SUPPORTED_SCHEMA_VERSIONS
            .iter()
            .any(|v| u64::from(*v) == version)
    }

    /// Number of records carried for a collection.
    #[must_use]
    pub fn len_of(&self, collection: Collection) -> usize {
        match collection {
            Collection::Periods => self.periods.len(),
            Collection::Students => self.students.len(),
            Collection::QuestionBank => self.question_bank.len(),
            Collection::Templates => self.templates.len(),
            Collection::GeneratedExams => self.generated_exams.len(),
            Collection::Deliveries => self.deliveries.len(),
            Collection::Grades => self.grades.len(),
            Collection::Flags => self.flags.len(),
        }
    }

    /// Counts computed from the carried collections, plus `pdfs`.
    #[must_use]
    pub fn computed_counts(&self) -> CollectionCounts {
        let mut counts: CollectionCounts = Collection::ALL
            .into_iter()
            .map(|c| (c.name().to_string(), self.len_of(c) as u64))
            .collect();
        counts.insert("pdfs".to_string(), self.pdfs.len() as u64);
        counts
    }

    /// Ids of every generated exam carried by the package.
    #[must_use]
    pub fn exam_ids(&self) -> HashSet<String> {
        self.generated_exams.iter().map(|e| e.id.clone()).collect()
    }

    /// Finds the first record whose owner differs from `owner_id`.
    ///
    /// Returns the collection and record id of the offender.
    #[must_use]
    pub fn find_foreign_record(&self, owner_id: &str) -> Option<(Collection, String)> {
        fn scan<R: SyncRecord>(records: &[R], owner_id: &str) -> Option<(Collection, String)> {
            records
                .iter()
                .find(|r| r.owner_id() != owner_id)
                .map(|r| (R::COLLECTION, r.id().to_string()))
        }

        scan(&self.periods, owner_id)
            .or_else(|| scan(&self.students, owner_id))
            .or_else(|| scan(&self.question_bank, owner_id))
            .or_else(|| scan(&self.templates, owner_id))
            .or_else(|| scan(&self.generated_exams, owner_id))
            .or_else(|| scan(&self.deliveries, owner_id))
            .or_else(|| scan(&self.grades, owner_id))
            .or_else(|| scan(&self.flags, owner_id))
    }

    /// Rewrites the owner of the package and of every record it carries.
    pub fn rebind_owner(&mut self, owner_id: &str) {
        fn rebind<R: SyncRecord>(records: &mut [R], owner_id: &str) {
            for record in records {
                record.set_owner_id(owner_id);
            }
        }

        self.owner_id = owner_id.to_string();
        rebind(&mut self.periods, owner_id);
        rebind(&mut self.students, owner_id);
        rebind(&mut self.question_bank, owner_id);
        rebind(&mut self.templates, owner_id);
        rebind(&mut self.generated_exams, owner_id);
        rebind(&mut self.deliveries, owner_id);
        rebind(&mut self.grades, owner_id);
        rebind(&mut self.flags, owner_id);
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.trim())
            .map_err(serde::de::Error::custom)
    }
}
