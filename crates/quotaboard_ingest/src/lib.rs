//! Bulk tabular ingestion core for the Quotaboard dashboard.
//!
//! One submitted file becomes one background import run:
//! - `decode` streams typed rows out of a CSV or Excel file
//! - `classify` resolves which entity schema the file carries
//! - `project` turns raw rows into validated entity records
//! - `batch` commits records to the store in fixed-size transactions
//! - `tracker` owns the polled per-job lifecycle record
//! - `coordinator` wires the pipeline together behind `IngestService`
//!
//! # Concurrency
//!
//! Each run executes on exactly one spawned task; jobs never share decoder
//! or batch state. The tracker's job map is the only cross-task state.

pub mod batch;
pub mod classify;
pub mod coordinator;
pub mod decode;
pub mod project;
pub mod tracker;

pub use coordinator::{IngestConfig, IngestService, SubmitError};
pub use tracker::{ImportTracker, TrackerError};

use quotaboard_db::DbError;
use thiserror::Error;

/// Terminal run-level faults. Row-level failures are not errors here; they
/// land in the job's error log and the run continues.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The file cannot be opened or parsed as a table at all.
    #[error("file-unreadable: {0}")]
    FileUnreadable(String),

    /// No entity schema matched the header with enough confidence.
    #[error("schema-undetermined: {0}")]
    SchemaUndetermined(String),

    /// The store became unreachable mid-run.
    #[error("storage connection lost: {0}")]
    StorageLost(#[source] DbError),
}
