use async_trait::async_trait;
use examsync_types::{BackupId, BackupMeta};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};

const PAYLOAD_SUFFIX: &str = ".sync.gz";
const MANIFEST_SUFFIX: &str = ".meta.json";

/// A package saved on this device.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalBackup {
    pub id: BackupId,
    pub owner_id: String,
    /// `None` for backups written before metadata existed.
    pub meta: Option<BackupMeta>,
    /// Encoded package bytes.
    pub payload: Vec<u8>,
    /// Canonical digest published when the package was assembled.
    pub digest_json: String,
}

/// Storage for local backups.
#[async_trait]
pub trait BackupArchive: Send + Sync {
    async fn save(&self, backup: &LocalBackup) -> SyncResult<()>;

    /// Ids of an owner's backups, oldest first.
    async fn list(&self, owner_id: &str) -> SyncResult<Vec<BackupId>>;

    async fn load(&self, id: BackupId) -> SyncResult<LocalBackup>;

    async fn remove(&self, id: BackupId) -> SyncResult<()>;
}

/// Sidecar written next to each payload.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Manifest {
    id: BackupId,
    owner_id: String,
    digest_json: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    meta: Option<BackupMeta>,
}

/// Keeps backups as `<id>.sync.gz` plus `<id>.meta.json` in one directory.
#[derive(Debug, Clone)]
pub struct DirectoryBackupArchive {
    root: PathBuf,
}

impl DirectoryBackupArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn payload_path(&self, id: BackupId) -> PathBuf {
        self.root.join(format!("{id}{PAYLOAD_SUFFIX}"))
    }

    fn manifest_path(&self, id: BackupId) -> PathBuf {
        self.root.join(format!("{id}{MANIFEST_SUFFIX}"))
    }

    async fn read_manifest(&self, path: &Path) -> SyncResult<Manifest> {
        let raw = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

#[async_trait]
impl BackupArchive for DirectoryBackupArchive {
    async fn save(&self, backup: &LocalBackup) -> SyncResult<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        let manifest = Manifest {
            id: backup.id,
            owner_id: backup.owner_id.clone(),
            digest_json: backup.digest_json.clone(),
            meta: backup.meta.clone(),
        };
        // Payload first: a manifest is only listed once its payload exists.
        tokio::fs::write(self.payload_path(backup.id), &backup.payload).await?;
        tokio::fs::write(
            self.manifest_path(backup.id),
            serde_json::to_vec_pretty(&manifest)?,
        )
        .await?;
        debug!("Saved backup {} ({} bytes)", backup.id, backup.payload.len());
        Ok(())
    }

    async fn list(&self, owner_id: &str) -> SyncResult<Vec<BackupId>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_manifest = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(MANIFEST_SUFFIX));
            if !is_manifest {
                continue;
            }
            match self.read_manifest(&path).await {
                Ok(manifest) if manifest.owner_id == owner_id => ids.push(manifest.id),
                Ok(_) => {}
                Err(e) => warn!("Ignoring unreadable backup manifest {}: {}", path.display(), e),
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn load(&self, id: BackupId) -> SyncResult<LocalBackup> {
        let manifest = match self.read_manifest(&self.manifest_path(id)).await {
            Ok(manifest) => manifest,
            Err(SyncError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SyncError::BackupNotFound(id.to_string()));
            }
            Err(e) => return Err(e),
        };
        let payload = match tokio::fs::read(self.payload_path(id)).await {
            Ok(payload) => payload,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SyncError::BackupNotFound(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(LocalBackup {
            id: manifest.id,
            owner_id: manifest.owner_id,
            meta: manifest.meta,
            payload,
            digest_json: manifest.digest_json,
        })
    }

    async fn remove(&self, id: BackupId) -> SyncResult<()> {
        let mut found = false;
        for path in [self.manifest_path(id), self.payload_path(id)] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => found = true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        if !found {
            return Err(SyncError::BackupNotFound(id.to_string()));
        }
        debug!("Removed backup {}", id);
        Ok(())
    }
}
