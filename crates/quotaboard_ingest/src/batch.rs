//! Fixed-size transactional batch writer.
//!
//! Rows stream out of the decoder, project into records, and accumulate in a
//! buffer that commits every `batch_size` records (plus one final partial
//! batch). A batch that the store rejects is retried exactly once, row by
//! row, so one bad record costs one row instead of the whole batch.
//!
//! Replace mode routes the first commit through `clear_and_insert`: the
//! delete and the first batch share one transaction, so readers never see an
//! emptied table without its replacement data.
//!
//! Connectivity loss is not retried. The store being gone is a run-level
//! fault; anything committed before the loss stays committed.

use quotaboard_db::QuotaboardDb;
use quotaboard_protocol::{
    EntityKind, EntityRecord, ErrorEntry, ImportId, ImportMode, PlanPeriod,
};
use std::time::Instant;
use tracing::{debug, warn};

use crate::decode::{DecodeError, RowDecoder};
use crate::project::project_row;
use crate::tracker::ImportTracker;
use crate::ImportError;

/// Outcome counters for one completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSummary {
    /// Data rows taken from the decoder, importable or not.
    pub rows_seen: u64,
    pub imported: u64,
    pub failed: u64,
}

pub struct BatchWriter<'a> {
    db: &'a QuotaboardDb,
    tracker: &'a ImportTracker,
    job_id: &'a ImportId,
    kind: EntityKind,
    period: PlanPeriod,
    batch_size: usize,
    /// Projected records awaiting commit, with their 1-based file positions.
    buffer: Vec<(u64, EntityRecord)>,
    /// Row failures not yet reported to the tracker.
    pending_errors: Vec<ErrorEntry>,
    pending_failed: u64,
    rows_seen: u64,
    imported: u64,
    failed: u64,
    /// True until the first commit of a replace-mode run has landed.
    replace_pending: bool,
}

impl<'a> BatchWriter<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: &'a QuotaboardDb,
        tracker: &'a ImportTracker,
        job_id: &'a ImportId,
        kind: EntityKind,
        mode: ImportMode,
        period: PlanPeriod,
        batch_size: usize,
    ) -> Self {
        Self {
            db,
            tracker,
            job_id,
            kind,
            period,
            batch_size: batch_size.max(1),
            buffer: Vec::with_capacity(batch_size.max(1)),
            pending_errors: Vec::new(),
            pending_failed: 0,
            rows_seen: 0,
            imported: 0,
            failed: 0,
            replace_pending: mode == ImportMode::Replace,
        }
    }

    /// Drain the decoder, committing batches as they fill.
    ///
    /// Row-level problems (undecodable rows, failed projection, rejected
    /// records) are absorbed into the job's error log; only file-level and
    /// storage-level faults surface as `Err`.
    pub async fn run(mut self, decoder: RowDecoder) -> Result<WriteSummary, ImportError> {
        for item in decoder {
            match item {
                Ok(row) => {
                    self.rows_seen += 1;
                    let position = row.position();
                    match project_row(self.kind, &row, &self.period) {
                        Ok(record) => {
                            self.buffer.push((position, record));
                            if self.buffer.len() >= self.batch_size {
                                self.commit().await?;
                            }
                        }
                        Err(reason) => self.row_failure(position, reason),
                    }
                }
                Err(DecodeError::Row { position, reason }) => {
                    self.rows_seen += 1;
                    self.row_failure(position, reason);
                }
                Err(DecodeError::Unreadable(reason)) => {
                    return Err(ImportError::FileUnreadable(reason));
                }
            }
        }

        // Final partial batch, plus any trailing row failures. Replace mode
        // must commit even an empty buffer so the clear still happens.
        self.commit().await?;

        Ok(WriteSummary {
            rows_seen: self.rows_seen,
            imported: self.imported,
            failed: self.failed,
        })
    }

    fn row_failure(&mut self, position: u64, reason: String) {
        self.failed += 1;
        self.pending_failed += 1;
        self.pending_errors.push(ErrorEntry::row_level(position, reason));
    }

    /// Commit the buffered records and report progress to the tracker.
    async fn commit(&mut self) -> Result<(), ImportError> {
        if self.buffer.is_empty() && self.pending_errors.is_empty() && !self.replace_pending {
            return Ok(());
        }

        let started = Instant::now();
        let records: Vec<EntityRecord> =
            self.buffer.iter().map(|(_, r)| r.clone()).collect();

        let result = if self.replace_pending {
            self.db.clear_and_insert(self.kind, &records).await.map(|_| ())
        } else {
            self.db.insert_batch(&records).await
        };

        let imported_delta = match result {
            Ok(()) => {
                self.replace_pending = false;
                records.len() as u64
            }
            Err(e) if e.is_connectivity() => return Err(ImportError::StorageLost(e)),
            Err(e) => {
                warn!(
                    job = %self.job_id,
                    rows = records.len(),
                    error = %e,
                    "Batch rejected, retrying row by row"
                );
                self.retry_rows().await?
            }
        };

        self.imported += imported_delta;
        debug!(
            job = %self.job_id,
            imported = imported_delta,
            failed = self.pending_failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Batch committed"
        );

        self.tracker.record_batch(
            self.job_id,
            imported_delta,
            self.pending_failed,
            std::mem::take(&mut self.pending_errors),
        );
        self.pending_failed = 0;
        self.buffer.clear();
        Ok(())
    }

    /// Per-row retry after a rejected batch. Records the store still
    /// rejects become row failures.
    ///
    /// In append mode each record gets one more attempt in its own
    /// transaction. A pending replace instead re-runs the clear and the
    /// surviving rows inside one transaction with per-row savepoints, so a
    /// concurrent reader never observes the cleared table without its
    /// replacement rows.
    async fn retry_rows(&mut self) -> Result<u64, ImportError> {
        let rows = std::mem::take(&mut self.buffer);

        if self.replace_pending {
            let records: Vec<EntityRecord> = rows.iter().map(|(_, r)| r.clone()).collect();
            let (inserted, rejected) = self
                .db
                .clear_and_insert_each(self.kind, &records)
                .await
                .map_err(ImportError::StorageLost)?;
            self.replace_pending = false;
            for (index, e) in rejected {
                self.pending_failed += 1;
                self.pending_errors.push(ErrorEntry::row_level(
                    rows[index].0,
                    format!("rejected: {}", e),
                ));
            }
            return Ok(inserted);
        }

        let mut imported = 0u64;
        for (position, record) in rows {
            match self.db.insert_one(&record).await {
                Ok(()) => imported += 1,
                Err(e) if e.is_connectivity() => return Err(ImportError::StorageLost(e)),
                Err(e) => {
                    self.pending_failed += 1;
                    self.pending_errors
                        .push(ErrorEntry::row_level(position, format!("rejected: {}", e)));
                }
            }
        }
        Ok(imported)
    }
}
