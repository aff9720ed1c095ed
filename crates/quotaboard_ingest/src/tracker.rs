//! In-memory import job tracker.
//!
//! One mutex-guarded map linearizes every mutation and snapshot read, so a
//! poller never observes a half-applied batch update. Jobs live for the
//! process lifetime; the dashboard polls by id until the status is terminal.
//!
//! Terminal states are frozen: any mutation arriving after completed/failed
//! is dropped with a warning instead of resurrecting the job.

use chrono::{DateTime, Utc};
use quotaboard_protocol::defaults::{DEFAULT_ERROR_LOG_CAP, ERROR_MESSAGE_MAX_CHARS};
use quotaboard_protocol::{
    EntityKind, ErrorEntry, ImportId, ImportMode, ImportSnapshot, ImportStatus,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("unknown import job: {0}")]
    NotFound(ImportId),
}

/// Mutable job state behind the tracker mutex.
#[derive(Debug)]
struct ImportJob {
    status: ImportStatus,
    mode: ImportMode,
    data_type: Option<EntityKind>,
    total_rows: Option<u64>,
    imported_rows: u64,
    failed_rows: u64,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    /// Oldest entry at the front; eviction pops from the front so the cap
    /// keeps the newest errors.
    error_log: VecDeque<ErrorEntry>,
}

/// Shared handle to the job map. Cloning shares the map.
#[derive(Clone)]
pub struct ImportTracker {
    inner: Arc<Mutex<HashMap<ImportId, ImportJob>>>,
    error_log_cap: usize,
}

impl Default for ImportTracker {
    fn default() -> Self {
        Self::new(DEFAULT_ERROR_LOG_CAP)
    }
}

impl ImportTracker {
    pub fn new(error_log_cap: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            error_log_cap,
        }
    }

    /// Register a new pending job and return its id.
    pub fn create(&self, mode: ImportMode, requested: Option<EntityKind>) -> ImportId {
        let id = ImportId::new();
        let job = ImportJob {
            status: ImportStatus::Pending,
            mode,
            data_type: requested,
            total_rows: None,
            imported_rows: 0,
            failed_rows: 0,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error_log: VecDeque::new(),
        };
        self.lock().insert(id.clone(), job);
        id
    }

    /// Transition pending -> processing when the background run picks up.
    pub fn mark_processing(&self, id: &ImportId) {
        self.mutate(id, |job| {
            job.status = ImportStatus::Processing;
            job.started_at = Some(Utc::now());
        });
    }

    /// Record the classifier's verdict (or confirm the explicit override).
    pub fn set_resolved_kind(&self, id: &ImportId, kind: EntityKind) {
        self.mutate(id, |job| job.data_type = Some(kind));
    }

    /// Set the total row count. First write wins: the total is published
    /// exactly once per run so progress never moves backwards.
    pub fn set_total_rows(&self, id: &ImportId, total: u64) {
        self.mutate(id, |job| {
            if job.total_rows.is_none() {
                job.total_rows = Some(total);
            }
        });
    }

    /// Apply one committed batch: counter deltas plus any row failures.
    pub fn record_batch(
        &self,
        id: &ImportId,
        imported_delta: u64,
        failed_delta: u64,
        entries: Vec<ErrorEntry>,
    ) {
        let cap = self.error_log_cap;
        self.mutate(id, |job| {
            job.imported_rows += imported_delta;
            job.failed_rows += failed_delta;
            for entry in entries {
                push_capped(&mut job.error_log, entry, cap);
            }
        });
    }

    /// Transition to completed. Row failures do not prevent completion.
    pub fn mark_completed(&self, id: &ImportId) {
        self.mutate(id, |job| {
            job.status = ImportStatus::Completed;
            job.finished_at = Some(Utc::now());
        });
    }

    /// Transition to failed with one run-level error entry.
    pub fn mark_failed(&self, id: &ImportId, entry: ErrorEntry) {
        let cap = self.error_log_cap;
        self.mutate(id, |job| {
            job.status = ImportStatus::Failed;
            job.finished_at = Some(Utc::now());
            push_capped(&mut job.error_log, entry, cap);
        });
    }

    /// Point-in-time copy of the job for pollers. Error log is newest-first.
    pub fn snapshot(&self, id: &ImportId) -> Result<ImportSnapshot, TrackerError> {
        let guard = self.lock();
        let job = guard.get(id).ok_or_else(|| TrackerError::NotFound(id.clone()))?;

        let mut error_log: Vec<ErrorEntry> = job.error_log.iter().cloned().collect();
        error_log.reverse();

        Ok(ImportSnapshot {
            id: id.clone(),
            status: job.status,
            mode: job.mode,
            data_type: job.data_type,
            total_rows: job.total_rows,
            imported_rows: job.imported_rows,
            failed_rows: job.failed_rows,
            progress_percent: progress_percent(job),
            created_at: job.created_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
            error_log,
        })
    }

    pub fn contains(&self, id: &ImportId) -> bool {
        self.lock().contains_key(id)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ImportId, ImportJob>> {
        // A poisoned tracker mutex means a panic while holding it; the data
        // is still a consistent job map, so keep serving it.
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run a mutation under the lock, skipping terminal jobs.
    fn mutate<F>(&self, id: &ImportId, f: F)
    where
        F: FnOnce(&mut ImportJob),
    {
        let mut guard = self.lock();
        match guard.get_mut(id) {
            Some(job) if job.status.is_terminal() => {
                warn!(job = %id, status = %job.status, "Ignoring update to terminal job");
            }
            Some(job) => f(job),
            None => {
                warn!(job = %id, "Ignoring update to unknown job");
            }
        }
    }
}

fn push_capped(log: &mut VecDeque<ErrorEntry>, mut entry: ErrorEntry, cap: usize) {
    if cap == 0 {
        return;
    }
    entry.message = truncate_message(entry.message);
    if log.len() == cap {
        log.pop_front();
    }
    log.push_back(entry);
}

/// Clamp an error message to the bounded length on a char boundary.
fn truncate_message(message: String) -> String {
    if message.chars().count() <= ERROR_MESSAGE_MAX_CHARS {
        return message;
    }
    let mut clipped: String = message.chars().take(ERROR_MESSAGE_MAX_CHARS - 1).collect();
    clipped.push('…');
    clipped
}

fn progress_percent(job: &ImportJob) -> f64 {
    match job.total_rows {
        // A file with zero data rows is fully processed the moment the
        // total is known.
        Some(0) => 100.0,
        Some(total) => {
            let pct = job.imported_rows as f64 / total as f64 * 100.0;
            pct.clamp(0.0, 100.0)
        }
        None => 0.0,
    }
}
