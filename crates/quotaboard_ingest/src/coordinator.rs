//! Ingestion coordinator: validate, register, spawn, contain.
//!
//! `submit` does only the cheap synchronous checks (file exists, extension
//! allowed, size under the cap), registers a pending job, and returns the id
//! immediately. Everything slow happens on a spawned task whose outcome -
//! normal error, panic, or timeout - is folded back into the tracker, so a
//! poller always reaches a terminal status.

use quotaboard_db::QuotaboardDb;
use quotaboard_protocol::defaults::{
    ALLOWED_EXTENSIONS, DEFAULT_BATCH_SIZE, DEFAULT_ERROR_LOG_CAP, DEFAULT_MAX_FILE_BYTES,
    DEFAULT_RUN_TIMEOUT_SECS, SCHEMA_CONFIDENCE_THRESHOLD,
};
use quotaboard_protocol::{
    EntityKind, ErrorEntry, ImportId, ImportMode, ImportSnapshot, PlanPeriod,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::batch::BatchWriter;
use crate::classify;
use crate::decode::{DecodeError, RowDecoder};
use crate::tracker::{ImportTracker, TrackerError};
use crate::ImportError;

/// Tunables for the ingestion service.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub batch_size: usize,
    pub error_log_cap: usize,
    pub max_file_bytes: u64,
    pub run_timeout: Duration,
    pub confidence_threshold: f64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            error_log_cap: DEFAULT_ERROR_LOG_CAP,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            run_timeout: Duration::from_secs(DEFAULT_RUN_TIMEOUT_SECS),
            confidence_threshold: SCHEMA_CONFIDENCE_THRESHOLD,
        }
    }
}

/// Synchronous rejections surfaced by `submit` before any job exists.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("file not found: {0}")]
    FileMissing(PathBuf),

    #[error("unsupported file extension '{0}' (expected csv, xlsx, or xls)")]
    UnsupportedExtension(String),

    #[error("file is {size} bytes, over the {limit} byte limit")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("cannot inspect file: {0}")]
    Io(#[from] std::io::Error),
}

/// Entry point for import submission and status polling.
///
/// Cloning is cheap and shares the database pool, the tracker, and the
/// config.
#[derive(Clone)]
pub struct IngestService {
    db: QuotaboardDb,
    tracker: ImportTracker,
    config: Arc<IngestConfig>,
}

impl IngestService {
    pub fn new(db: QuotaboardDb, config: IngestConfig) -> Self {
        let tracker = ImportTracker::new(config.error_log_cap);
        Self {
            db,
            tracker,
            config: Arc::new(config),
        }
    }

    pub fn tracker(&self) -> &ImportTracker {
        &self.tracker
    }

    /// Current snapshot of a job, for pollers.
    pub fn status(&self, id: &ImportId) -> Result<ImportSnapshot, TrackerError> {
        self.tracker.snapshot(id)
    }

    /// Validate the file, register a pending job, and kick off the
    /// background run. Returns the job id without waiting for any decoding.
    pub async fn submit(
        &self,
        path: &Path,
        requested: Option<EntityKind>,
        mode: ImportMode,
        period: PlanPeriod,
    ) -> Result<ImportId, SubmitError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
            return Err(SubmitError::UnsupportedExtension(ext));
        }

        let meta = match tokio::fs::metadata(path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SubmitError::FileMissing(path.to_path_buf()))
            }
            Err(e) => return Err(SubmitError::Io(e)),
        };
        if !meta.is_file() {
            return Err(SubmitError::FileMissing(path.to_path_buf()));
        }
        if meta.len() > self.config.max_file_bytes {
            return Err(SubmitError::FileTooLarge {
                size: meta.len(),
                limit: self.config.max_file_bytes,
            });
        }

        let id = self.tracker.create(mode, requested);
        info!(
            job = %id,
            path = %path.display(),
            mode = %mode,
            requested = ?requested.map(|k| k.as_str()),
            "Import submitted"
        );

        let service = self.clone();
        let job_id = id.clone();
        let file = path.to_path_buf();
        tokio::spawn(async move {
            service.supervise(job_id, file, requested, mode, period).await;
        });

        Ok(id)
    }

    /// Run one import under a timeout, folding panics and timeouts into a
    /// terminal failed status.
    async fn supervise(
        &self,
        id: ImportId,
        path: PathBuf,
        requested: Option<EntityKind>,
        mode: ImportMode,
        period: PlanPeriod,
    ) {
        let service = self.clone();
        let job_id = id.clone();
        let mut run = tokio::spawn(async move {
            service.run_import(&job_id, &path, requested, mode, period).await
        });

        match tokio::time::timeout(self.config.run_timeout, &mut run).await {
            Ok(Ok(Ok(()))) => {
                self.tracker.mark_completed(&id);
                info!(job = %id, "Import completed");
            }
            Ok(Ok(Err(e))) => {
                warn!(job = %id, error = %e, "Import failed");
                self.tracker.mark_failed(&id, ErrorEntry::run_level(e.to_string()));
            }
            Ok(Err(join_err)) => {
                if join_err.is_panic() {
                    error!(job = %id, "Import task panicked");
                } else {
                    error!(job = %id, "Import task was cancelled");
                }
                self.tracker
                    .mark_failed(&id, ErrorEntry::run_level("internal import error"));
            }
            Err(_) => {
                run.abort();
                warn!(
                    job = %id,
                    timeout_secs = self.config.run_timeout.as_secs(),
                    "Import timed out"
                );
                self.tracker.mark_failed(
                    &id,
                    ErrorEntry::run_level(format!(
                        "import timed out after {}s",
                        self.config.run_timeout.as_secs()
                    )),
                );
            }
        }
    }

    /// The import pipeline proper: decode, classify, batch-write.
    async fn run_import(
        &self,
        id: &ImportId,
        path: &Path,
        requested: Option<EntityKind>,
        mode: ImportMode,
        period: PlanPeriod,
    ) -> Result<(), ImportError> {
        self.tracker.mark_processing(id);

        // Opening buffers the whole worksheet for Excel files, so it runs on
        // the blocking pool; the row stream itself yields at batch commits.
        let file = path.to_path_buf();
        let decoder = tokio::task::spawn_blocking(move || RowDecoder::open(&file))
            .await
            .map_err(|_| ImportError::FileUnreadable("file reader crashed".to_string()))?
            .map_err(|e| match e {
                DecodeError::Unreadable(reason) => ImportError::FileUnreadable(reason),
                DecodeError::Row { reason, .. } => ImportError::FileUnreadable(reason),
            })?;

        let kind = classify::classify(
            decoder.header(),
            requested,
            self.config.confidence_threshold,
        )?;
        self.tracker.set_resolved_kind(id, kind);
        if let Some(total) = decoder.total_rows() {
            self.tracker.set_total_rows(id, total);
        }

        let writer = BatchWriter::new(
            &self.db,
            &self.tracker,
            id,
            kind,
            mode,
            period,
            self.config.batch_size,
        );
        let summary = writer.run(decoder).await?;

        // CSV learns its total only at end of stream; for formats that
        // published it up front this is a no-op.
        self.tracker.set_total_rows(id, summary.rows_seen);

        info!(
            job = %id,
            kind = %kind,
            rows = summary.rows_seen,
            imported = summary.imported,
            failed = summary.failed,
            "Import run finished"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quotaboard_protocol::ImportStatus;
    use std::io::Write as _;
    use tempfile::TempDir;

    async fn wait_terminal(service: &IngestService, id: &ImportId) -> ImportSnapshot {
        for _ in 0..200 {
            let snap = service.status(id).unwrap();
            if snap.status.is_terminal() {
                return snap;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job never reached a terminal status");
    }

    async fn service() -> IngestService {
        let db = QuotaboardDb::open_memory().await.unwrap();
        IngestService::new(db, IngestConfig::default())
    }

    fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[tokio::test]
    async fn submit_returns_before_completion() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "sales.csv",
            "date,customer,amount\n2024-05-01,Acme,10\n",
        );
        let service = service().await;

        let id = service
            .submit(&path, None, ImportMode::Append, PlanPeriod::default())
            .await
            .unwrap();

        // The id is pollable immediately, whatever state the run is in.
        assert!(service.status(&id).is_ok());

        let snap = wait_terminal(&service, &id).await;
        assert_eq!(snap.status, ImportStatus::Completed);
        assert_eq!(snap.data_type, Some(EntityKind::Sales));
        assert_eq!(snap.imported_rows, 1);
        assert_eq!(snap.progress_percent, 100.0);
    }

    #[tokio::test]
    async fn missing_file_is_rejected_synchronously() {
        let service = service().await;
        let err = service
            .submit(
                Path::new("/nonexistent/sales.csv"),
                None,
                ImportMode::Append,
                PlanPeriod::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::FileMissing(_)));
    }

    #[tokio::test]
    async fn unsupported_extension_is_rejected_synchronously() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "sales.pdf", "not a table");
        let service = service().await;
        let err = service
            .submit(&path, None, ImportMode::Append, PlanPeriod::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::UnsupportedExtension(_)));
    }

    #[tokio::test]
    async fn oversized_file_is_rejected_synchronously() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "sales.csv", "date,customer,amount\n");
        let db = QuotaboardDb::open_memory().await.unwrap();
        let service = IngestService::new(
            db,
            IngestConfig {
                max_file_bytes: 4,
                ..IngestConfig::default()
            },
        );
        let err = service
            .submit(&path, None, ImportMode::Append, PlanPeriod::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::FileTooLarge { .. }));
    }

    #[tokio::test]
    async fn unclassifiable_header_fails_the_job() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "mystery.csv", "alpha,beta,gamma\n1,2,3\n");
        let service = service().await;

        let id = service
            .submit(&path, None, ImportMode::Append, PlanPeriod::default())
            .await
            .unwrap();
        let snap = wait_terminal(&service, &id).await;

        assert_eq!(snap.status, ImportStatus::Failed);
        assert_eq!(snap.imported_rows, 0);
        assert!(snap.error_log[0].message.contains("schema-undetermined"));
    }

    #[tokio::test]
    async fn empty_data_file_completes_at_full_progress() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "sales.csv", "date,customer,amount\n");
        let service = service().await;

        let id = service
            .submit(&path, None, ImportMode::Append, PlanPeriod::default())
            .await
            .unwrap();
        let snap = wait_terminal(&service, &id).await;

        assert_eq!(snap.status, ImportStatus::Completed);
        assert_eq!(snap.total_rows, Some(0));
        assert_eq!(snap.progress_percent, 100.0);
    }

    #[tokio::test]
    async fn timed_out_run_fails_terminally() {
        let dir = TempDir::new().unwrap();
        let mut content = String::from("date,customer,amount\n");
        for i in 0..500 {
            content.push_str(&format!("2024-05-01,Customer {i},10\n"));
        }
        let path = write_file(&dir, "sales.csv", &content);

        let db = QuotaboardDb::open_memory().await.unwrap();
        let service = IngestService::new(
            db,
            IngestConfig {
                batch_size: 1,
                run_timeout: Duration::from_millis(1),
                ..IngestConfig::default()
            },
        );

        let id = service
            .submit(&path, None, ImportMode::Append, PlanPeriod::default())
            .await
            .unwrap();
        let snap = wait_terminal(&service, &id).await;

        assert_eq!(snap.status, ImportStatus::Failed);
        assert!(snap.error_log[0].message.contains("timed out"));
    }
}
