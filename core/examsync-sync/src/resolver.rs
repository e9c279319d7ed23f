//! Document-level last-writer-wins.
//!
//! An incoming record replaces the stored one only when its mutation stamp is
//! strictly newer. Ties keep the local copy. Records are never merged field by
//! field.

use examsync_types::{parse_instant, MutationStamp, SyncRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of resolving one incoming record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// Write the incoming record (insert or wholesale replace).
    Apply,
    /// Keep the stored record.
    Skip,
}

/// Pure LWW comparison.
pub struct ConflictResolver;

impl ConflictResolver {
    /// Resolves against the stamp of the stored record, `None` when absent.
    #[must_use]
    pub fn resolve(existing: Option<MutationStamp>, incoming: MutationStamp) -> Resolution {
        match existing {
            None => Resolution::Apply,
            Some(local) if local >= incoming => Resolution::Skip,
            Some(_) => Resolution::Apply,
        }
    }

    /// Resolves two typed records of the same collection.
    #[must_use]
    pub fn upsert<R: SyncRecord>(existing: Option<&R>, incoming: &R) -> Resolution {
        Self::resolve(
            existing.map(SyncRecord::mutation_stamp),
            incoming.mutation_stamp(),
        )
    }

    /// Stamp of a raw stored document that no longer fits its record type.
    ///
    /// Unparsable timestamps count as absent.
    #[must_use]
    pub fn document_stamp(document: &Value) -> MutationStamp {
        let read = |field: &str| {
            document
                .get(field)
                .and_then(Value::as_str)
                .and_then(|raw| parse_instant(raw).ok())
        };
        read("updatedAt").or_else(|| read("createdAt"))
    }
}
