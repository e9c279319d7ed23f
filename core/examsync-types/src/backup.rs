//! Metadata stored next to a local backup artifact.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::CURRENT_SCHEMA_VERSION;

/// Expiry and logic-version marker for a local backup.
///
/// `expires_at` stays a raw string so a restore can tell "missing" and
/// "unparsable" apart from a valid instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupMeta {
    #[serde(default)]
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default)]
    pub ttl_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_logic_fingerprint: Option<String>,
}

impl BackupMeta {
    /// Builds metadata for a backup created at `now` that lives for `ttl`.
    #[must_use]
    pub fn issue(now: DateTime<Utc>, ttl: std::time::Duration, fingerprint: &str) -> Self {
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        let expires = Duration::try_milliseconds(i64::try_from(ttl_ms).unwrap_or(i64::MAX))
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            created_at: Some(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
            ttl_ms,
            expires_at: Some(expires.to_rfc3339_opts(SecondsFormat::Millis, true)),
            business_logic_fingerprint: Some(fingerprint.to_string()),
        }
    }
}
