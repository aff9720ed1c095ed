//! Entity record operations: batch insert, single insert, clear, count.
//!
//! Batch inserts run in one transaction so a rejected row rolls the whole
//! batch back; the batch writer then retries rows one at a time through
//! `insert_one`. Replace mode goes through `clear_and_insert` so readers
//! never see a cleared-but-unfilled table.

use crate::error::{DbError, Result};
use crate::QuotaboardDb;
use quotaboard_protocol::{EntityKind, EntityRecord};
use sqlx::{Row, Sqlite};
use tracing::debug;

impl QuotaboardDb {
    /// Insert a batch of records in one transaction.
    ///
    /// All records must share one entity kind; the constraint failure of any
    /// row aborts the whole transaction.
    pub async fn insert_batch(&self, records: &[EntityRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let created_at = Self::now_millis();
        let mut tx = self.pool().begin().await?;
        for record in records {
            insert_record(&mut *tx, record, created_at).await?;
        }
        tx.commit().await?;

        debug!(rows = records.len(), kind = %records[0].kind(), "Batch committed");
        Ok(())
    }

    /// Insert a single record in its own transaction (batch retry path).
    pub async fn insert_one(&self, record: &EntityRecord) -> Result<()> {
        insert_record(self.pool(), record, Self::now_millis()).await?;
        Ok(())
    }

    /// Clear every row of `kind`, then insert `records`, in one transaction.
    ///
    /// Used for the first batch of a replace-mode run: a concurrent reader
    /// sees either the old table or old-cleared-plus-first-batch, never an
    /// empty in-between state.
    pub async fn clear_and_insert(
        &self,
        kind: EntityKind,
        records: &[EntityRecord],
    ) -> Result<u64> {
        let created_at = Self::now_millis();
        let mut tx = self.pool().begin().await?;

        let deleted = sqlx::query(delete_all_sql(kind))
            .execute(&mut *tx)
            .await?
            .rows_affected();
        for record in records {
            insert_record(&mut *tx, record, created_at).await?;
        }

        tx.commit().await?;

        debug!(
            kind = %kind,
            cleared = deleted,
            inserted = records.len(),
            "Replaced table contents"
        );
        Ok(deleted)
    }

    /// Clear every row of `kind`, then insert each record under its own
    /// savepoint, all in one transaction.
    ///
    /// The degraded replace path: when `clear_and_insert` was rejected as a
    /// whole, this keeps the clear and the surviving rows atomic while still
    /// isolating individual rejects. Returns the inserted count and the
    /// rejected records as `(index, error)` pairs.
    pub async fn clear_and_insert_each(
        &self,
        kind: EntityKind,
        records: &[EntityRecord],
    ) -> Result<(u64, Vec<(usize, DbError)>)> {
        let created_at = Self::now_millis();
        let mut tx = self.pool().begin().await?;

        sqlx::query(delete_all_sql(kind)).execute(&mut *tx).await?;

        let mut inserted = 0u64;
        let mut rejected = Vec::new();
        for (index, record) in records.iter().enumerate() {
            sqlx::query("SAVEPOINT row_insert").execute(&mut *tx).await?;
            match insert_record(&mut *tx, record, created_at).await {
                Ok(()) => {
                    sqlx::query("RELEASE SAVEPOINT row_insert")
                        .execute(&mut *tx)
                        .await?;
                    inserted += 1;
                }
                Err(e) if e.is_connectivity() => return Err(e),
                Err(e) => {
                    sqlx::query("ROLLBACK TO SAVEPOINT row_insert")
                        .execute(&mut *tx)
                        .await?;
                    sqlx::query("RELEASE SAVEPOINT row_insert")
                        .execute(&mut *tx)
                        .await?;
                    rejected.push((index, e));
                }
            }
        }

        tx.commit().await?;

        debug!(
            kind = %kind,
            inserted,
            rejected = rejected.len(),
            "Replaced table contents row by row"
        );
        Ok((inserted, rejected))
    }

    /// Count persisted rows of `kind`.
    pub async fn count(&self, kind: EntityKind) -> Result<i64> {
        let sql = match kind {
            EntityKind::Sales => "SELECT COUNT(*) AS n FROM sales",
            EntityKind::Agents => "SELECT COUNT(*) AS n FROM agents",
            EntityKind::Customers => "SELECT COUNT(*) AS n FROM customers",
            EntityKind::Products => "SELECT COUNT(*) AS n FROM products",
        };
        let row = sqlx::query(sql).fetch_one(self.pool()).await?;
        Ok(row.get::<i64, _>("n"))
    }
}

fn delete_all_sql(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Sales => "DELETE FROM sales",
        EntityKind::Agents => "DELETE FROM agents",
        EntityKind::Customers => "DELETE FROM customers",
        EntityKind::Products => "DELETE FROM products",
    }
}

async fn insert_record<'e, E>(
    executor: E,
    record: &EntityRecord,
    created_at: i64,
) -> std::result::Result<(), DbError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    match record {
        EntityRecord::Sale(r) => {
            sqlx::query(
                r#"INSERT INTO sales
                   (sale_date, amount, quantity, price, customer, product, agent, created_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(r.date)
            .bind(r.amount)
            .bind(r.quantity)
            .bind(r.price)
            .bind(&r.customer)
            .bind(&r.product)
            .bind(&r.agent)
            .bind(created_at)
            .execute(executor)
            .await?;
        }
        EntityRecord::Agent(r) => {
            sqlx::query(
                r#"INSERT INTO agents
                   (name, region, email, phone, plan_amount, plan_period_start, plan_period_end, created_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(&r.name)
            .bind(&r.region)
            .bind(&r.email)
            .bind(&r.phone)
            .bind(r.plan_amount)
            .bind(r.plan_period_start)
            .bind(r.plan_period_end)
            .bind(created_at)
            .execute(executor)
            .await?;
        }
        EntityRecord::Customer(r) => {
            sqlx::query(
                r#"INSERT INTO customers
                   (name, segment, city, email, phone, created_at)
                   VALUES (?, ?, ?, ?, ?, ?)"#,
            )
            .bind(&r.name)
            .bind(&r.segment)
            .bind(&r.city)
            .bind(&r.email)
            .bind(&r.phone)
            .bind(created_at)
            .execute(executor)
            .await?;
        }
        EntityRecord::Product(r) => {
            sqlx::query(
                r#"INSERT INTO products
                   (name, sku, category, unit_price, created_at)
                   VALUES (?, ?, ?, ?, ?)"#,
            )
            .bind(&r.name)
            .bind(&r.sku)
            .bind(&r.category)
            .bind(r.unit_price)
            .bind(created_at)
            .execute(executor)
            .await?;
        }
    }
    Ok(())
}
