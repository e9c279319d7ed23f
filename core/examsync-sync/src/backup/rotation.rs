use async_trait::async_trait;
use chrono::{DateTime, Utc};
use examsync_types::{BackupId, BackupMeta, PackageScope};
use std::sync::Arc;
use tracing::info;

use super::{BackupArchive, BackupMetaValidator, LocalBackup};
use crate::assembler::PackageAssembler;
use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::processor::{ImportRequest, ImportResult, PackageProcessor};
use crate::scheduler::ScheduledJob;

/// Scheduled job that snapshots one owner's full dataset and prunes old
/// snapshots.
pub struct BackupRotationJob {
    owner_id: String,
    assembler: Arc<PackageAssembler>,
    archive: Arc<dyn BackupArchive>,
    ttl: std::time::Duration,
    keep_last: usize,
    fingerprint: String,
}

impl BackupRotationJob {
    pub fn new(
        owner_id: impl Into<String>,
        assembler: Arc<PackageAssembler>,
        archive: Arc<dyn BackupArchive>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            assembler,
            archive,
            ttl: config.backup_ttl(),
            keep_last: config.backups_to_keep.max(1),
            fingerprint: config.business_logic_fingerprint.clone(),
        }
    }

    /// Writes one backup and returns its id.
    pub async fn backup_now(&self, now: DateTime<Utc>) -> SyncResult<BackupId> {
        let assembled = self
            .assembler
            .assemble(&self.owner_id, &PackageScope::default(), true)
            .await?;

        let backup = LocalBackup {
            id: BackupId::new(),
            owner_id: self.owner_id.clone(),
            meta: Some(BackupMeta::issue(now, self.ttl, &self.fingerprint)),
            payload: assembled.bytes,
            digest_json: assembled.digest_json,
        };
        self.archive.save(&backup).await?;
        self.prune().await?;
        Ok(backup.id)
    }

    /// Removes the oldest backups beyond `keep_last`.
    async fn prune(&self) -> SyncResult<()> {
        let ids = self.archive.list(&self.owner_id).await?;
        let excess = ids.len().saturating_sub(self.keep_last);
        for id in ids.into_iter().take(excess) {
            self.archive.remove(id).await?;
            info!("Pruned backup {} for {}", id, self.owner_id);
        }
        Ok(())
    }
}

#[async_trait]
impl ScheduledJob for BackupRotationJob {
    fn name(&self) -> &str {
        "backup-rotation"
    }

    async fn run(&self, now: DateTime<Utc>) -> SyncResult<()> {
        let id = self.backup_now(now).await?;
        info!("Backup {} written for {}", id, self.owner_id);
        Ok(())
    }
}

/// Restores a local backup after checking its metadata.
///
/// The stored digest is passed to the processor, so a payload altered on
/// disk fails with a checksum mismatch.
pub async fn restore_local_backup(
    archive: &dyn BackupArchive,
    id: BackupId,
    validator: &BackupMetaValidator,
    processor: &PackageProcessor,
    owner_id: &str,
    now: DateTime<Utc>,
) -> SyncResult<ImportResult> {
    let backup = archive.load(id).await?;
    validator.validate(backup.meta.as_ref(), now)?;

    let request = ImportRequest::new(owner_id, backup.payload).with_digest(backup.digest_json);
    processor.process(request).await
}
