//! Schema creation for the four entity tables.
//!
//! All CREATE TABLE statements live here - single source of truth.

use crate::error::Result;
use crate::QuotaboardDb;
use tracing::info;

impl QuotaboardDb {
    /// Ensure all tables exist.
    pub(crate) async fn ensure_schema(&self) -> Result<()> {
        // WAL mode keeps analytics readers consistent while batches commit
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(self.pool())
            .await?;
        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(self.pool())
            .await?;
        sqlx::query("PRAGMA foreign_keys=ON")
            .execute(self.pool())
            .await?;

        self.create_entity_tables().await?;

        info!("Store schema verified");
        Ok(())
    }

    async fn create_entity_tables(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS sales (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sale_date TEXT NOT NULL,
                amount REAL NOT NULL,
                quantity REAL NOT NULL DEFAULT 1,
                price REAL,
                customer TEXT,
                product TEXT,
                agent TEXT,
                created_at INTEGER NOT NULL
            )"#,
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS agents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                region TEXT,
                email TEXT,
                phone TEXT,
                plan_amount REAL,
                plan_period_start TEXT,
                plan_period_end TEXT,
                created_at INTEGER NOT NULL
            )"#,
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS customers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                segment TEXT,
                city TEXT,
                email TEXT,
                phone TEXT,
                created_at INTEGER NOT NULL
            )"#,
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS products (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                sku TEXT UNIQUE,
                category TEXT,
                unit_price REAL,
                created_at INTEGER NOT NULL
            )"#,
        )
        .execute(self.pool())
        .await?;

        // Indexes for the downstream analytics readers
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sales_date ON sales(sale_date)")
            .execute(self.pool())
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sales_customer ON sales(customer)")
            .execute(self.pool())
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sales_product ON sales(product)")
            .execute(self.pool())
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_products_category ON products(category)")
            .execute(self.pool())
            .await?;

        Ok(())
    }
}
