//! SQLite store for ingested Quotaboard business records.
//!
//! This crate is the single source of truth for store access. The batch
//! writer depends only on the operations here: per-entity batch insert,
//! single-row insert (batch retry path), clear-and-insert (replace mode),
//! and row counts.
//!
//! # Usage
//!
//! ```rust,ignore
//! use quotaboard_db::{QuotaboardDb, Result};
//!
//! let db = QuotaboardDb::open("~/.quotaboard/quotaboard.sqlite3").await?;
//! db.insert_batch(&records).await?;
//! let n = db.count(EntityKind::Sales).await?;
//! ```

mod error;
mod records;
mod schema;

pub use error::{DbError, Result};

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::info;

/// Store handle shared by the ingestion coordinator and its worker tasks.
#[derive(Clone)]
pub struct QuotaboardDb {
    pool: SqlitePool,
}

impl QuotaboardDb {
    /// Open or create a database at the given path.
    ///
    /// Creates all tables if they don't exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let db = Self { pool };
        db.ensure_schema().await?;

        info!(path = %path.display(), "Store opened");

        Ok(db)
    }

    /// Open an in-memory database (tests only; single connection).
    pub async fn open_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let db = Self { pool };
        db.ensure_schema().await?;
        Ok(db)
    }

    /// Get the underlying connection pool (escape hatch for complex queries).
    ///
    /// Prefer the typed methods instead.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection.
    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Current time as milliseconds since Unix epoch.
    pub fn now_millis() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}
