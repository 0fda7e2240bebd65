//! Backup reconciliation engine: snapshot, restore, and bidirectional sync
//! between the local archive directory and the remote bucket.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures_util::{stream, StreamExt, TryStreamExt};
use serde::Serialize;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

use super::archive_store::{ArchiveStore, StoreError};
use super::lifecycle::LifecycleManager;
use super::progress::ProgressReader;
use super::zipper::{self, ZipperError};
use crate::models::archive::{archive_name, is_valid_label};
use crate::models::transfer::{ReconciliationPlan, TransferRecord};
use crate::models::workload::LifecycleStatus;
use crate::remote::{RemoteBucket, RemoteError};

/// Label used for the safety snapshot taken before a restore clears the
/// live directory.
const SAFETY_LABEL: &str = "pre-restore";

const DEFAULT_LABEL: &str = "server";

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("synchronization bucket information not complete")]
    RemoteNotConfigured,

    #[error("invalid backup label: {0}")]
    InvalidLabel(String),

    #[error("workload lifecycle failed with status {status:?}: {message}")]
    Lifecycle {
        status: LifecycleStatus,
        message: String,
    },

    #[error("restore failed: {reason}; live data was recovered from safety archive {safety}")]
    RestoreRecovered { reason: String, safety: String },

    #[error(
        "restore failed: {reason}; live data could not be recovered, \
         manual recovery from safety archive {safety} is required"
    )]
    RestoreUnrecovered { reason: String, safety: String },

    #[error("sync cancelled")]
    Cancelled,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Zip(#[from] ZipperError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Result payload of one sync invocation.
#[derive(Debug, Serialize)]
pub struct SyncOutcome {
    pub plan: ReconciliationPlan,
    pub transfers: Vec<TransferRecord>,
}

/// Result payload of a restore.
#[derive(Debug, Serialize)]
pub struct RestoreOutcome {
    /// The archive that was expanded into the live directory.
    pub restored: String,
    /// The safety snapshot of the pre-restore live data.
    pub safety_archive: TransferRecord,
}

pub struct BackupReconciliationEngine {
    store: ArchiveStore,
    live_data_dir: PathBuf,
    lifecycle: Arc<LifecycleManager>,
    remote: Option<Arc<dyn RemoteBucket>>,
    max_concurrent_transfers: usize,
}

impl BackupReconciliationEngine {
    pub fn new(
        store: ArchiveStore,
        live_data_dir: PathBuf,
        lifecycle: Arc<LifecycleManager>,
        remote: Option<Arc<dyn RemoteBucket>>,
        max_concurrent_transfers: usize,
    ) -> Self {
        Self {
            store,
            live_data_dir,
            lifecycle,
            remote,
            max_concurrent_transfers: max_concurrent_transfers.max(1),
        }
    }

    /// Hot snapshot of the live data directory into a fresh timestamped
    /// archive. The workload keeps running; callers needing a consistent
    /// snapshot stop it first.
    pub async fn backup(&self, label: Option<String>) -> Result<TransferRecord> {
        let label = label.unwrap_or_else(|| DEFAULT_LABEL.to_string());
        if !is_valid_label(&label) {
            return Err(EngineError::InvalidLabel(label));
        }

        tokio::fs::create_dir_all(self.store.dir()).await?;
        let name = archive_name(&label, Utc::now());
        let target = self.store.join(&name)?;
        let source = self.live_data_dir.clone();

        tracing::info!(archive = %name, "creating backup");
        let started = Instant::now();
        tokio::task::spawn_blocking(move || zipper::zip_dir(&source, &target))
            .await
            .map_err(|e| EngineError::Io(std::io::Error::other(e)))??;
        let elapsed = started.elapsed();

        let size = self.store.size(&name)?;
        tracing::info!(archive = %name, size, elapsed_ms = elapsed.as_millis() as u64, "backup created");
        Ok(TransferRecord::uploaded(name, size, elapsed))
    }

    /// Stop the workload, snapshot the current live data, replace it with
    /// the named archive's content, and start the workload again.
    ///
    /// The live directory is cleared only once the safety snapshot is
    /// durably on disk; if expanding the named archive fails, the safety
    /// snapshot is re-expanded before the error is returned.
    pub async fn restore(&self, archive: &str) -> Result<RestoreOutcome> {
        let archive_path = self.store.join(archive)?;
        if !self.store.contains(archive)? {
            return Err(StoreError::NotFound(archive.to_string()).into());
        }

        let stop = self.lifecycle.stop().await;
        if !stop.status.is_stop_success() {
            return Err(EngineError::Lifecycle {
                status: stop.status,
                message: stop.error.unwrap_or_default(),
            });
        }

        tracing::info!(archive, "restoring backup");
        let started = Instant::now();
        tokio::fs::create_dir_all(self.store.dir()).await?;
        tokio::fs::create_dir_all(&self.live_data_dir).await?;

        // Safety snapshot first; zip_dir fsyncs before returning.
        let safety_name = archive_name(SAFETY_LABEL, Utc::now());
        let safety_path = self.store.join(&safety_name)?;
        {
            let source = self.live_data_dir.clone();
            let target = safety_path.clone();
            tokio::task::spawn_blocking(move || zipper::zip_dir(&source, &target))
                .await
                .map_err(|e| EngineError::Io(std::io::Error::other(e)))??;
        }

        let live = self.live_data_dir.clone();
        let result = tokio::task::spawn_blocking({
            let live = live.clone();
            let archive_path = archive_path.clone();
            move || -> std::result::Result<(), ZipperError> {
                zipper::clear_dir(&live)?;
                zipper::unzip(&archive_path, &live)?;
                Ok(())
            }
        })
        .await
        .map_err(|e| EngineError::Io(std::io::Error::other(e)))?;

        if let Err(reason) = result {
            tracing::error!(archive, error = %reason, "restore failed, re-expanding safety archive");
            let recovery = tokio::task::spawn_blocking({
                let live = live.clone();
                let safety_path = safety_path.clone();
                move || -> std::result::Result<(), ZipperError> {
                    zipper::clear_dir(&live)?;
                    zipper::unzip(&safety_path, &live)?;
                    Ok(())
                }
            })
            .await
            .map_err(|e| EngineError::Io(std::io::Error::other(e)))?;

            return Err(match recovery {
                Ok(()) => EngineError::RestoreRecovered {
                    reason: reason.to_string(),
                    safety: safety_name,
                },
                Err(e) => {
                    tracing::error!(error = %e, "safety archive recovery failed");
                    EngineError::RestoreUnrecovered {
                        reason: reason.to_string(),
                        safety: safety_name,
                    }
                }
            });
        }

        let start = self.lifecycle.start().await;
        if !start.status.is_start_success() {
            return Err(EngineError::Lifecycle {
                status: start.status,
                message: start.error.unwrap_or_default(),
            });
        }

        let size = self.store.size(&safety_name)?;
        tracing::info!(archive, safety = %safety_name, "restore complete");
        Ok(RestoreOutcome {
            restored: archive.to_string(),
            safety_archive: TransferRecord::uploaded(safety_name, size, started.elapsed()),
        })
    }

    /// Write an externally supplied byte stream verbatim into the archive
    /// directory under `name`. No content validation beyond the name.
    ///
    /// The bytes are staged under a `.partial` suffix that the naming
    /// convention never matches, and renamed into place only once the
    /// stream ended and the file is on disk. An aborted upload leaves no
    /// enumerable archive behind.
    pub async fn upload_from_stream<R>(
        &self,
        reader: R,
        name: &str,
        total_bytes: Option<u64>,
    ) -> Result<TransferRecord>
    where
        R: AsyncRead + Unpin,
    {
        tokio::fs::create_dir_all(self.store.dir()).await?;
        let dest = self.store.join(name)?;
        let staging = self.store.join(&format!("{name}.partial"))?;

        tracing::info!(archive = %name, "receiving uploaded archive");
        let started = Instant::now();
        let mut progress = ProgressReader::new(reader, total_bytes);
        let mut file = tokio::fs::File::create(&staging).await?;

        let stored = match tokio::io::copy(&mut progress, &mut file).await {
            Ok(written) => file.sync_all().await.map(|()| written),
            Err(e) => Err(e),
        };
        let written = match stored {
            Ok(written) => written,
            Err(e) => {
                drop(file);
                if let Err(cleanup) = tokio::fs::remove_file(&staging).await {
                    tracing::warn!(path = %staging.display(), error = %cleanup, "partial upload left behind");
                }
                return Err(e.into());
            }
        };
        drop(file);
        tokio::fs::rename(&staging, &dest).await?;

        tracing::info!(archive = %name, bytes = written, "upload stored");
        Ok(TransferRecord::uploaded(name, written, started.elapsed()))
    }

    /// Convention-matching archive names in the local directory.
    pub fn list(&self) -> Result<Vec<String>> {
        Ok(self.store.list()?)
    }

    pub fn delete(&self, name: &str) -> Result<crate::models::archive::ArchiveRecord> {
        Ok(self.store.delete(name)?)
    }

    /// Make the local archive set and the remote object set equal by
    /// transferring the difference in both directions.
    ///
    /// Fail-fast: the first transfer error aborts the remainder. A retried
    /// sync recomputes the smaller difference and proceeds with what is
    /// still missing.
    pub async fn sync(&self, cancel: &CancellationToken) -> Result<SyncOutcome> {
        let remote = self
            .remote
            .as_ref()
            .ok_or(EngineError::RemoteNotConfigured)?;

        remote.ensure_bucket().await?;

        let local = self.store.list()?;
        let remote_names = remote.list().await?;
        let plan = ReconciliationPlan::compute(&local, &remote_names);
        tracing::info!(
            missing_on_remote = plan.missing_on_remote.len(),
            missing_on_local = plan.missing_on_local.len(),
            "reconciliation plan computed"
        );
        if plan.is_empty() {
            tracing::info!("local and remote archives already match");
            return Ok(SyncOutcome {
                plan,
                transfers: Vec::new(),
            });
        }

        let uploads: Vec<TransferRecord> = stream::iter(plan.missing_on_remote.clone())
            .map(|name| self.upload_one(remote.as_ref(), name, cancel))
            .buffered(self.max_concurrent_transfers)
            .try_collect()
            .await?;

        let downloads: Vec<TransferRecord> = stream::iter(plan.missing_on_local.clone())
            .map(|name| self.download_one(remote.as_ref(), name, cancel))
            .buffered(self.max_concurrent_transfers)
            .try_collect()
            .await?;

        let mut transfers = uploads;
        transfers.extend(downloads);
        tracing::info!(transfers = transfers.len(), "sync complete");
        Ok(SyncOutcome { plan, transfers })
    }

    async fn upload_one(
        &self,
        remote: &dyn RemoteBucket,
        name: String,
        cancel: &CancellationToken,
    ) -> Result<TransferRecord> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        // Tolerate a concurrent sync having uploaded it in the meantime.
        if remote.object_exists(&name).await? {
            tracing::info!(archive = %name, "already on remote, skipping upload");
            let size = self.store.size(&name).unwrap_or(0);
            return Ok(TransferRecord::skipped(name, size));
        }

        let path = self.store.join(&name)?;
        let size = self.store.size(&name)?;
        let started = Instant::now();
        tokio::select! {
            _ = cancel.cancelled() => Err(EngineError::Cancelled),
            result = remote.upload(&path) => {
                result?;
                tracing::info!(archive = %name, size, "uploaded");
                Ok(TransferRecord::uploaded(name, size, started.elapsed()))
            }
        }
    }

    async fn download_one(
        &self,
        remote: &dyn RemoteBucket,
        name: String,
        cancel: &CancellationToken,
    ) -> Result<TransferRecord> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        if self.store.contains(&name)? {
            tracing::info!(archive = %name, "already on disk, skipping download");
            let size = self.store.size(&name).unwrap_or(0);
            return Ok(TransferRecord::skipped(name, size));
        }

        let dest = self.store.join(&name)?;
        let started = Instant::now();
        tokio::select! {
            _ = cancel.cancelled() => Err(EngineError::Cancelled),
            result = remote.download(&name, &dest) => {
                let size = result?;
                tracing::info!(archive = %name, size, "downloaded");
                Ok(TransferRecord::downloaded(name, size, started.elapsed()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::models::workload::WorkloadSpec;
    use crate::remote::memory::MemoryBucket;
    use crate::runtime::fakes::{FakeConnector, FakeState};
    use std::fs;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Harness {
        _dirs: (TempDir, TempDir),
        live: PathBuf,
        bucket: Arc<MemoryBucket>,
        runtime: Arc<FakeState>,
        engine: BackupReconciliationEngine,
    }

    fn harness(bucket: Option<Arc<MemoryBucket>>) -> Harness {
        let archive_dir = TempDir::new().unwrap();
        let live_dir = TempDir::new().unwrap();
        let live = live_dir.path().to_path_buf();

        let runtime = Arc::new(FakeState::default());
        let mut config = AppConfig::from_env();
        config.container_name = "game-server".into();
        config.network_name = "gamenet-1".into();
        config.live_data_dir = live.clone();
        let lifecycle = Arc::new(LifecycleManager::new(
            Arc::new(FakeConnector(runtime.clone())),
            WorkloadSpec::from_config(&config),
        ));

        let bucket = bucket.unwrap_or_default();
        let remote: Option<Arc<dyn RemoteBucket>> = Some(bucket.clone());
        let engine = BackupReconciliationEngine::new(
            ArchiveStore::new(archive_dir.path()),
            live.clone(),
            lifecycle,
            remote,
            2,
        );

        Harness {
            _dirs: (archive_dir, live_dir),
            live,
            bucket,
            runtime,
            engine,
        }
    }

    fn unconfigured_harness() -> Harness {
        let mut h = harness(None);
        let archive_dir = h.engine.store.dir().to_path_buf();
        h.engine = BackupReconciliationEngine::new(
            ArchiveStore::new(archive_dir),
            h.live.clone(),
            h.engine.lifecycle.clone(),
            None,
            2,
        );
        h
    }

    fn write_local(h: &Harness, name: &str, data: &[u8]) {
        fs::write(h.engine.store.dir().join(name), data).unwrap();
    }

    // ── Sync ──

    #[tokio::test]
    async fn sync_converges_local_and_remote_sets() {
        let bucket = Arc::new(MemoryBucket::with_object("b_20240101_010101.zip", b"bbb"));
        let h = harness(Some(bucket.clone()));
        write_local(&h, "a_20240101_010101.zip", b"aaa");

        let outcome = h.engine.sync(&CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.transfers.len(), 2);
        let upload = &outcome.transfers[0];
        let download = &outcome.transfers[1];
        assert_eq!(upload.file_name, "a_20240101_010101.zip");
        assert_eq!(upload.download_duration, Duration::ZERO);
        assert_eq!(download.file_name, "b_20240101_010101.zip");
        assert_eq!(download.upload_duration, Duration::ZERO);
        assert_eq!(download.size, 3);

        // converged: local and remote name sets are equal
        let local = h.engine.list().unwrap();
        let remote = bucket.list().await.unwrap();
        assert_eq!(local, remote);
        assert_eq!(local.len(), 2);
    }

    #[tokio::test]
    async fn sync_is_idempotent() {
        let h = harness(None);
        write_local(&h, "a_20240101_010101.zip", b"aaa");

        let first = h.engine.sync(&CancellationToken::new()).await.unwrap();
        assert_eq!(first.transfers.len(), 1);

        let second = h.engine.sync(&CancellationToken::new()).await.unwrap();
        assert!(second.plan.is_empty());
        assert!(second.transfers.is_empty());
    }

    #[tokio::test]
    async fn sync_never_reuploads_an_object_already_present() {
        let bucket = Arc::new(MemoryBucket::with_object("a_20240101_010101.zip", b"aaa"));
        let h = harness(Some(bucket));
        write_local(&h, "a_20240101_010101.zip", b"aaa");

        let outcome = h.engine.sync(&CancellationToken::new()).await.unwrap();
        assert!(outcome.plan.is_empty());
        assert!(outcome.transfers.is_empty());
    }

    #[tokio::test]
    async fn sync_without_remote_configuration_fails_fast() {
        let h = unconfigured_harness();
        write_local(&h, "foo_20240101_010101.zip", b"data");

        let err = h.engine.sync(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, EngineError::RemoteNotConfigured));
    }

    #[tokio::test]
    async fn sync_provisions_the_bucket() {
        let h = harness(None);
        h.engine.sync(&CancellationToken::new()).await.unwrap();
        assert!(h.bucket.provisioned.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn sync_aborts_on_first_transfer_failure() {
        let h = harness(None);
        write_local(&h, "a_20240101_010101.zip", b"aaa");
        h.bucket.fail_transfers.store(true, Ordering::SeqCst);

        let err = h.engine.sync(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, EngineError::Remote(_)));
    }

    #[tokio::test]
    async fn cancelled_sync_moves_nothing() {
        let h = harness(None);
        write_local(&h, "a_20240101_010101.zip", b"aaa");

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = h.engine.sync(&cancel).await.unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
        assert!(h.bucket.objects.lock().unwrap().is_empty());
    }

    // ── Backup ──

    #[tokio::test]
    async fn backup_creates_a_conventional_archive() {
        let h = harness(None);
        fs::write(h.live.join("level.dat"), b"world data").unwrap();

        let record = h.engine.backup(None).await.unwrap();
        assert!(record.file_name.starts_with("server_"));
        assert!(record.file_name.ends_with(".zip"));
        assert!(record.size > 0);
        assert_eq!(h.engine.list().unwrap(), vec![record.file_name.clone()]);
    }

    #[tokio::test]
    async fn backup_rejects_invalid_labels() {
        let h = harness(None);
        let err = h.engine.backup(Some("../evil".into())).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidLabel(_)));
    }

    // ── Delete ──

    #[tokio::test]
    async fn delete_missing_archive_is_classified() {
        let h = harness(None);
        let err = h.engine.delete("gone_20240101_010101.zip").unwrap_err();
        assert!(matches!(err, EngineError::Store(StoreError::NotFound(_))));
    }

    // ── Upload from stream ──

    #[tokio::test]
    async fn upload_from_stream_writes_verbatim() {
        let h = harness(None);
        let data = b"uploaded archive bytes".to_vec();

        let record = h
            .engine
            .upload_from_stream(&data[..], "up_20240101_010101.zip", Some(data.len() as u64))
            .await
            .unwrap();

        assert_eq!(record.size, data.len() as u64);
        let stored = fs::read(h.engine.store.dir().join("up_20240101_010101.zip")).unwrap();
        assert_eq!(stored, data);
    }

    /// Reader that delivers one chunk and then fails, like a client
    /// dropping the connection mid-upload.
    struct DroppedConnection {
        chunk: Option<&'static [u8]>,
    }

    impl tokio::io::AsyncRead for DroppedConnection {
        fn poll_read(
            mut self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            match self.chunk.take() {
                Some(data) => {
                    buf.put_slice(data);
                    std::task::Poll::Ready(Ok(()))
                }
                None => std::task::Poll::Ready(Err(std::io::Error::other("connection reset"))),
            }
        }
    }

    #[tokio::test]
    async fn aborted_upload_leaves_no_enumerable_archive() {
        let h = harness(None);
        let reader = DroppedConnection {
            chunk: Some(b"partial bytes"),
        };

        let err = h
            .engine
            .upload_from_stream(reader, "part_20240101_010101.zip", Some(1024))
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Io(_)));
        assert!(h.engine.list().unwrap().is_empty());
        assert!(!h.engine.store.contains("part_20240101_010101.zip").unwrap());
    }

    // ── Restore ──

    #[tokio::test]
    async fn restore_replaces_live_data_and_restarts_the_workload() {
        let h = harness(None);

        // snapshot generation X
        fs::write(h.live.join("level.dat"), b"generation X").unwrap();
        let snapshot = h.engine.backup(Some("world".into())).await.unwrap();

        // live data moves on
        fs::write(h.live.join("level.dat"), b"generation Y").unwrap();
        fs::write(h.live.join("junk.tmp"), b"junk").unwrap();

        let outcome = h.engine.restore(&snapshot.file_name).await.unwrap();
        assert_eq!(outcome.restored, snapshot.file_name);

        assert_eq!(fs::read(h.live.join("level.dat")).unwrap(), b"generation X");
        assert!(!h.live.join("junk.tmp").exists());
        // workload is running again
        assert_eq!(*h.runtime.running.lock().unwrap(), vec!["game-server"]);
        // the safety snapshot is on disk and matches the convention
        assert!(h
            .engine
            .store
            .contains(&outcome.safety_archive.file_name)
            .unwrap());
    }

    #[tokio::test]
    async fn restore_of_missing_archive_touches_nothing() {
        let h = harness(None);
        fs::write(h.live.join("level.dat"), b"untouched").unwrap();

        let err = h.engine.restore("gone_20240101_010101.zip").await.unwrap_err();
        assert!(matches!(err, EngineError::Store(StoreError::NotFound(_))));
        assert_eq!(fs::read(h.live.join("level.dat")).unwrap(), b"untouched");
    }

    #[tokio::test]
    async fn failed_restore_recovers_live_data_from_the_safety_archive() {
        let h = harness(None);
        fs::write(h.live.join("level.dat"), b"precious").unwrap();

        // conventionally named but not a zip file
        write_local(&h, "bad_20240101_010101.zip", b"definitely not a zip");

        let err = h.engine.restore("bad_20240101_010101.zip").await.unwrap_err();
        assert!(matches!(err, EngineError::RestoreRecovered { .. }));
        // compensation re-expanded the safety archive
        assert_eq!(fs::read(h.live.join("level.dat")).unwrap(), b"precious");
    }
}
