//! Local backups: metadata validation, archive storage, rotation and restore.

mod archive;
mod rotation;

use chrono::{DateTime, Utc};
use examsync_types::{parse_instant, BackupMeta};
use tracing::debug;

use crate::config::BUSINESS_LOGIC_FINGERPRINT;
use crate::error::{SyncError, SyncResult};

pub use archive::{BackupArchive, DirectoryBackupArchive, LocalBackup};
pub use rotation::{restore_local_backup, BackupRotationJob};

/// Decides whether a local backup may still be restored.
#[derive(Debug, Clone)]
pub struct BackupMetaValidator {
    current_fingerprint: String,
}

impl Default for BackupMetaValidator {
    fn default() -> Self {
        Self::new(BUSINESS_LOGIC_FINGERPRINT)
    }
}

impl BackupMetaValidator {
    pub fn new(current_fingerprint: impl Into<String>) -> Self {
        Self {
            current_fingerprint: current_fingerprint.into(),
        }
    }

    #[must_use]
    pub fn current_fingerprint(&self) -> &str {
        &self.current_fingerprint
    }

    /// Accepts absent metadata (backups written before metadata existed).
    /// Otherwise the backup must not be past `expiresAt` and must carry the
    /// current fingerprint, if it carries one at all.
    pub fn validate(&self, meta: Option<&BackupMeta>, now: DateTime<Utc>) -> SyncResult<()> {
        let Some(meta) = meta else {
            debug!("Backup has no metadata; accepting");
            return Ok(());
        };

        let raw = meta
            .expires_at
            .as_deref()
            .ok_or_else(|| SyncError::BackupMetaInvalid("expiresAt is missing".to_string()))?;
        let expires_at = parse_instant(raw)
            .map_err(|e| SyncError::BackupMetaInvalid(format!("expiresAt {raw:?}: {e}")))?;

        if now > expires_at {
            return Err(SyncError::BackupExpired(raw.to_string()));
        }

        if let Some(found) = meta.business_logic_fingerprint.as_deref() {
            if found != self.current_fingerprint {
                return Err(SyncError::BackupInvalidated {
                    found: found.to_string(),
                    current: self.current_fingerprint.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Validates against the built-in fingerprint.
pub fn validate_backup_meta(meta: Option<&BackupMeta>, now: DateTime<Utc>) -> SyncResult<()> {
    BackupMetaValidator::default().validate(meta, now)
}
