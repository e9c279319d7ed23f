//! Limits and settings for assembly, import and local backups.

use serde::{Deserialize, Serialize};

/// Marker for the merge and validation rules implemented by this build.
///
/// Backups carry the fingerprint they were produced under; a restore refuses
/// any backup whose fingerprint differs.
pub const BUSINESS_LOGIC_FINGERPRINT: &str = "v2-lww";

/// Maximum number of PDF blobs embedded in one package.
pub const MAX_BLOBS_PER_PACKAGE: usize = 120;

/// Cumulative ceiling for compressed blob bytes in one package.
pub const MAX_BLOB_BYTES: u64 = 25 * 1024 * 1024;

/// Configuration for the sync subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncConfig {
    /// Largest encoded package accepted by import, checked before decompression.
    pub max_payload_bytes: u64,
    /// Largest decompressed size of a package or a single blob.
    pub max_decompressed_bytes: u64,
    /// Maximum blobs embedded by assembly.
    pub max_blobs: usize,
    /// Cumulative compressed blob bytes embedded by assembly.
    pub max_blob_bytes: u64,
    /// Fingerprint written into new backups and required on restore.
    pub business_logic_fingerprint: String,
    /// How long a local backup stays restorable (ms).
    pub backup_ttl_ms: u64,
    /// Number of newest local backups kept by rotation.
    pub backups_to_keep: usize,
    /// Interval between scheduled backups (ms).
    pub backup_interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: 40 * 1024 * 1024,
            max_decompressed_bytes: 200 * 1024 * 1024,
            max_blobs: MAX_BLOBS_PER_PACKAGE,
            max_blob_bytes: MAX_BLOB_BYTES,
            business_logic_fingerprint: BUSINESS_LOGIC_FINGERPRINT.to_string(),
            backup_ttl_ms: 7 * 24 * 60 * 60 * 1000, // 7 days
            backups_to_keep: 5,
            backup_interval_ms: 24 * 60 * 60 * 1000, // daily
        }
    }
}

impl SyncConfig {
    /// Backup lifetime as a `Duration`.
    #[must_use]
    pub fn backup_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.backup_ttl_ms)
    }

    /// Backup interval as a `Duration`.
    #[must_use]
    pub fn backup_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.backup_interval_ms)
    }
}
