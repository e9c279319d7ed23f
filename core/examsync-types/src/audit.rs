//! Audit records for assemble/process attempts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::AttemptId;

/// Lifecycle state of an audited attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Pending,
    Success,
    Failed,
}

impl AuditStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            AuditStatus::Pending => "pending",
            AuditStatus::Success => "success",
            AuditStatus::Failed => "failed",
        }
    }

    /// Whether no further entry may follow this one for the same attempt.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, AuditStatus::Pending)
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AuditStatus::Pending),
            "success" => Ok(AuditStatus::Success),
            "failed" => Ok(AuditStatus::Failed),
            other => Err(format!("unknown audit status: {other}")),
        }
    }
}

/// What kind of operation an audit entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditKind {
    Export,
    Import,
    /// A dry-run import.
    Validate,
}

impl AuditKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            AuditKind::Export => "export",
            AuditKind::Import => "import",
            AuditKind::Validate => "validate",
        }
    }
}

impl fmt::Display for AuditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "export" => Ok(AuditKind::Export),
            "import" => Ok(AuditKind::Import),
            "validate" => Ok(AuditKind::Validate),
            other => Err(format!("unknown audit kind: {other}")),
        }
    }
}

/// One append-only audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncAuditRecord {
    pub attempt_id: AttemptId,
    pub owner_id: String,
    pub status: AuditStatus,
    pub kind: AuditKind,
    pub details: Value,
    pub executed_at: DateTime<Utc>,
}

impl SyncAuditRecord {
    /// Creates an entry stamped with the current time.
    #[must_use]
    pub fn new(
        attempt_id: AttemptId,
        kind: AuditKind,
        owner_id: impl Into<String>,
        status: AuditStatus,
        details: Value,
    ) -> Self {
        Self {
            attempt_id,
            owner_id: owner_id.into(),
            status,
            kind,
            details,
            executed_at: Utc::now(),
        }
    }
}
