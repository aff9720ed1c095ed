//! Canonical default values shared across the ingestion core.

/// Rows per transactional batch commit.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Hard cap on job error-log entries; oldest entries are evicted first.
pub const DEFAULT_ERROR_LOG_CAP: usize = 100;

/// Character budget for a single error-log message.
pub const ERROR_MESSAGE_MAX_CHARS: usize = 240;

/// Minimum classifier confidence before a schema guess is accepted.
pub const SCHEMA_CONFIDENCE_THRESHOLD: f64 = 0.5;

/// Upload size ceiling in bytes (50 MiB).
pub const DEFAULT_MAX_FILE_BYTES: u64 = 50 * 1024 * 1024;

/// Wall-clock ceiling for one import run (15 minutes).
pub const DEFAULT_RUN_TIMEOUT_SECS: u64 = 15 * 60;

/// Recommended client polling interval for the status snapshot.
pub const STATUS_POLL_INTERVAL_SECS: u64 = 2;

/// File extensions accepted by submit.
pub const ALLOWED_EXTENSIONS: &[&str] = &["csv", "xlsx", "xls"];
