//! Per-job resource cleanup.
//!
//! Every job owns a unique temporary directory and a registry of files
//! uploaded to the provider. [`CleanupManager::run`] consumes the manager, so
//! cleanup happens at most once; if the job future is dropped before that,
//! `Drop` still removes the directory and schedules remote deletions.

use crate::error::Result;
use crate::provider::{AssetUploader, RemoteAsset};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tracing::{debug, info, warn};
use uuid::Uuid;

type Registered = (Arc<dyn AssetUploader>, RemoteAsset);

/// What a cleanup pass did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub assets_deleted: usize,
    pub assets_failed: usize,
    pub temp_dir_removed: bool,
}

pub struct CleanupManager {
    temp_dir: Option<TempDir>,
    path: PathBuf,
    assets: Mutex<Vec<Registered>>,
}

impl CleanupManager {
    /// Create the job's working directory under `parent`.
    pub fn create(parent: &Path, job_id: &Uuid) -> Result<Self> {
        std::fs::create_dir_all(parent)?;
        let temp_dir = tempfile::Builder::new()
            .prefix(&format!("job-{}-", job_id))
            .tempdir_in(parent)?;
        let path = temp_dir.path().to_path_buf();
        debug!("Created job directory {}", path.display());

        Ok(Self {
            temp_dir: Some(temp_dir),
            path,
            assets: Mutex::new(Vec::new()),
        })
    }

    /// Root of the job's working directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Track a remote asset for deletion.
    pub fn register(&self, uploader: Arc<dyn AssetUploader>, asset: RemoteAsset) {
        self.lock_assets().push((uploader, asset));
    }

    pub fn registered(&self) -> usize {
        self.lock_assets().len()
    }

    fn lock_assets(&self) -> std::sync::MutexGuard<'_, Vec<Registered>> {
        self.assets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Delete every registered asset, then the working directory.
    ///
    /// Failures are logged and counted, never returned.
    pub async fn run(mut self) -> CleanupReport {
        let assets = std::mem::take(&mut *self.lock_assets());
        let mut report = CleanupReport::default();

        let deletions = assets.iter().map(|(uploader, asset)| async move {
            (asset, uploader.delete(asset).await)
        });
        for (asset, outcome) in futures::future::join_all(deletions).await {
            match outcome {
                Ok(()) => {
                    debug!("Deleted remote asset {}", asset.handle);
                    report.assets_deleted += 1;
                }
                Err(e) => {
                    warn!("Failed to delete remote asset {}: {}", asset.handle, e);
                    report.assets_failed += 1;
                }
            }
        }

        if let Some(dir) = self.temp_dir.take() {
            match dir.close() {
                Ok(()) => report.temp_dir_removed = true,
                Err(e) => {
                    warn!("Failed to remove {}: {}", self.path.display(), e);
                    report.temp_dir_removed = std::fs::remove_dir_all(&self.path).is_ok()
                        || !self.path.exists();
                }
            }
        }

        info!(
            "Cleanup finished: {} assets deleted, {} failed",
            report.assets_deleted, report.assets_failed
        );
        report
    }
}

impl Drop for CleanupManager {
    fn drop(&mut self) {
        let assets = std::mem::take(&mut *self.lock_assets());
        if assets.is_empty() {
            return;
        }

        warn!(
            "Job ended without cleanup, scheduling deletion of {} remote assets",
            assets.len()
        );
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    for (uploader, asset) in assets {
                        if let Err(e) = uploader.delete(&asset).await {
                            warn!("Failed to delete remote asset {}: {}", asset.handle, e);
                        }
                    }
                });
            }
            Err(_) => {
                for (_, asset) in assets {
                    warn!("Remote asset {} was not deleted", asset.handle);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VidlensError;
    use async_trait::async_trait;

    #[derive(Default)]
    struct TrackingUploader {
        deleted: Mutex<Vec<String>>,
        fail_on: Option<String>,
    }

    #[async_trait]
    impl AssetUploader for TrackingUploader {
        async fn upload(&self, _path: &Path, _mime_type: &str) -> Result<RemoteAsset> {
            Err(VidlensError::Upload("unused".into()))
        }

        async fn delete(&self, asset: &RemoteAsset) -> Result<()> {
            if self.fail_on.as_deref() == Some(asset.handle.as_str()) {
                return Err(VidlensError::ProviderFatal("delete refused".into()));
            }
            self.deleted.lock().unwrap().push(asset.handle.clone());
            Ok(())
        }
    }

    fn asset(handle: &str) -> RemoteAsset {
        RemoteAsset {
            handle: handle.to_string(),
            uri: format!("https://files.example/{}", handle),
            mime_type: "audio/mp3".to_string(),
        }
    }

    #[tokio::test]
    async fn test_run_deletes_assets_and_directory() {
        let parent = tempfile::tempdir().unwrap();
        let manager = CleanupManager::create(parent.path(), &Uuid::new_v4()).unwrap();
        let path = manager.path().to_path_buf();
        std::fs::create_dir_all(path.join("segment_000")).unwrap();
        std::fs::write(path.join("segment_000/frame-0001.jpg"), b"x").unwrap();

        let uploader = Arc::new(TrackingUploader {
            fail_on: Some("files/b".into()),
            ..Default::default()
        });
        manager.register(uploader.clone(), asset("files/a"));
        manager.register(uploader.clone(), asset("files/b"));
        manager.register(uploader.clone(), asset("files/c"));

        let report = manager.run().await;

        assert_eq!(report.assets_deleted, 2);
        assert_eq!(report.assets_failed, 1);
        assert!(report.temp_dir_removed);
        assert!(!path.exists());
        let mut deleted = uploader.deleted.lock().unwrap().clone();
        deleted.sort();
        assert_eq!(deleted, vec!["files/a", "files/c"]);
    }

    #[tokio::test]
    async fn test_job_directories_are_unique() {
        let parent = tempfile::tempdir().unwrap();
        let id = Uuid::new_v4();
        let a = tokio_test::assert_ok!(CleanupManager::create(parent.path(), &id));
        let b = tokio_test::assert_ok!(CleanupManager::create(parent.path(), &id));
        assert_ne!(a.path(), b.path());
        a.run().await;
        assert!(b.path().exists());
        b.run().await;
    }

    #[tokio::test]
    async fn test_drop_without_run_still_cleans() {
        let parent = tempfile::tempdir().unwrap();
        let uploader = Arc::new(TrackingUploader::default());
        let path = {
            let manager = CleanupManager::create(parent.path(), &Uuid::new_v4()).unwrap();
            manager.register(uploader.clone(), asset("files/orphan"));
            manager.path().to_path_buf()
        };

        assert!(!path.exists());
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(*uploader.deleted.lock().unwrap(), vec!["files/orphan".to_string()]);
    }
}
