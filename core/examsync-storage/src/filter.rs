//! Field filters over stored documents.

use serde_json::Value;
use std::collections::BTreeMap;

/// Matches documents on top-level fields.
///
/// All conditions must hold. An `owner_id` condition compares against the
/// document's `ownerId`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    owner_id: Option<String>,
    equals: BTreeMap<String, Value>,
    any_of: BTreeMap<String, Vec<Value>>,
}

impl RecordFilter {
    /// A filter matching every document.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// A filter matching documents owned by `owner_id`.
    #[must_use]
    pub fn owned_by(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: Some(owner_id.into()),
            ..Self::default()
        }
    }

    /// Requires `field` to equal `value`.
    #[must_use]
    pub fn field_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.equals.insert(field.into(), value.into());
        self
    }

    /// Requires `field` to equal one of `values`. An empty set matches nothing.
    #[must_use]
    pub fn field_in<I, V>(mut self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.any_of
            .insert(field.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// The owner condition, if any.
    #[must_use]
    pub fn owner_id(&self) -> Option<&str> {
        self.owner_id.as_deref()
    }

    /// Evaluates the filter against a document.
    #[must_use]
    pub fn matches(&self, document: &Value) -> bool {
        if let Some(owner) = &self.owner_id {
            if document.get("ownerId").and_then(Value::as_str) != Some(owner.as_str()) {
                return false;
            }
        }

        let equals_ok = self
            .equals
            .iter()
            .all(|(field, expected)| document.get(field) == Some(expected));

        equals_ok
            && self.any_of.iter().all(|(field, candidates)| {
                document
                    .get(field)
                    .is_some_and(|actual| candidates.contains(actual))
            })
    }
}
