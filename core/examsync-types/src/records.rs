//! Typed records for every synchronized collection.
//!
//! Stored documents are schemaless JSON. Each collection gets an explicit
//! struct here so assembly and import validate shape at the boundary instead
//! of trusting whatever the store returns. Fields this version does not know
//! about are kept in `extra` and written back unchanged.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::MutationStamp;

/// A logical collection carried by a sync package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Collection {
    Periods,
    Students,
    QuestionBank,
    Templates,
    GeneratedExams,
    Deliveries,
    Grades,
    Flags,
}

impl Collection {
    /// All collections in import dependency order.
    pub const ALL: [Collection; 8] = [
        Collection::Periods,
        Collection::Students,
        Collection::QuestionBank,
        Collection::Templates,
        Collection::GeneratedExams,
        Collection::Deliveries,
        Collection::Grades,
        Collection::Flags,
    ];

    /// Wire name of the collection inside a package (and its `counts` key).
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Collection::Periods => "periods",
            Collection::Students => "students",
            Collection::QuestionBank => "questionBank",
            Collection::Templates => "templates",
            Collection::GeneratedExams => "generatedExams",
            Collection::Deliveries => "deliveries",
            Collection::Grades => "grades",
            Collection::Flags => "flags",
        }
    }

    /// Whether records of this collection hang off a generated exam.
    #[must_use]
    pub const fn is_exam_dependent(self) -> bool {
        matches!(
            self,
            Collection::Deliveries | Collection::Grades | Collection::Flags
        )
    }

    /// Looks a collection up by its wire name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Behaviour shared by every synchronized record.
pub trait SyncRecord: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// The collection this record type lives in.
    const COLLECTION: Collection;

    fn id(&self) -> &str;

    fn owner_id(&self) -> &str;

    fn set_owner_id(&mut self, owner_id: &str);

    fn created_at(&self) -> Option<DateTime<Utc>>;

    fn updated_at(&self) -> Option<DateTime<Utc>>;

    /// Period the record belongs to, if the collection is period-scoped.
    fn period_id(&self) -> Option<&str> {
        None
    }

    /// Parent generated exam, for exam-dependent collections.
    fn parent_exam_id(&self) -> Option<&str> {
        None
    }

    /// The stamp used for last-writer-wins comparison.
    fn mutation_stamp(&self) -> MutationStamp {
        self.updated_at().or_else(|| self.created_at())
    }
}

macro_rules! impl_sync_record {
    ($ty:ty, $collection:expr, { $($extra:tt)* }) => {
        impl SyncRecord for $ty {
            const COLLECTION: Collection = $collection;

            fn id(&self) -> &str {
                &self.id
            }

            fn owner_id(&self) -> &str {
                &self.owner_id
            }

            fn set_owner_id(&mut self, owner_id: &str) {
                self.owner_id = owner_id.to_string();
            }

            fn created_at(&self) -> Option<DateTime<Utc>> {
                self.created_at
            }

            fn updated_at(&self) -> Option<DateTime<Utc>> {
                self.updated_at
            }

            $($extra)*
        }
    };
}

/// An academic period (term). Scope root for exports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Period {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts_on: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends_on: Option<String>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl_sync_record!(Period, Collection::Periods, {
    fn period_id(&self) -> Option<&str> {
        Some(&self.id)
    }
});

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub owner_id: String,
    pub period_id: String,
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrollment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl_sync_record!(Student, Collection::Students, {
    fn period_id(&self) -> Option<&str> {
        Some(&self.period_id)
    }
});

/// A reusable question. Items without a period are shared across the
/// owner's periods.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionBankItem {
    pub id: String,
    pub owner_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    pub prompt: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl_sync_record!(QuestionBankItem, Collection::QuestionBank, {
    fn period_id(&self) -> Option<&str> {
        self.period_id.as_deref()
    }
});

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: String,
    pub owner_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub question_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_points: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl_sync_record!(Template, Collection::Templates, {
    fn period_id(&self) -> Option<&str> {
        self.period_id.as_deref()
    }
});

/// A concrete exam generated from a template. `pdf_ref` points at the
/// rendered document in the blob store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedExam {
    pub id: String,
    pub owner_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_id: Option<String>,
    pub template_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl_sync_record!(GeneratedExam, Collection::GeneratedExams, {
    fn period_id(&self) -> Option<&str> {
        self.period_id.as_deref()
    }
});

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub id: String,
    pub owner_id: String,
    pub exam_id: String,
    pub student_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl_sync_record!(Delivery, Collection::Deliveries, {
    fn parent_exam_id(&self) -> Option<&str> {
        Some(&self.exam_id)
    }
});

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    pub id: String,
    pub owner_id: String,
    pub exam_id: String,
    pub student_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl_sync_record!(Grade, Collection::Grades, {
    fn parent_exam_id(&self) -> Option<&str> {
        Some(&self.exam_id)
    }
});

/// A review flag raised on an exam (unreadable sheet, suspected copy, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flag {
    pub id: String,
    pub owner_id: String,
    pub exam_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl_sync_record!(Flag, Collection::Flags, {
    fn parent_exam_id(&self) -> Option<&str> {
        Some(&self.exam_id)
    }
});
