//! PostgreSQL storage for the tax rate ledger.

use crate::models::{AppendedTaxRate, CreateTaxRate, TaxRate, UpdateTaxRate};
use crate::services::error::LedgerError;
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::repository::TaxRateRepository;
use crate::services::rules;
use async_trait::async_trait;
use chrono::NaiveDate;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

/// Advisory lock taken by every compound ledger write ("taxrates" in ASCII).
const LEDGER_LOCK_KEY: i64 = 0x7461_7872_6174_6573;

const TAX_RATE_COLUMNS: &str =
    "id, rate, multiplier, effective_from, effective_to, created_at, created_by";

/// Maps a sqlx failure to a ledger error, surfacing constraint violations as conflicts.
fn storage_error(context: &str, e: sqlx::Error) -> LedgerError {
    if let sqlx::Error::Database(ref db_err) = e {
        // 23505 unique_violation (second current rate), 23P01 exclusion_violation (overlap)
        if db_err.is_unique_violation() || db_err.code().as_deref() == Some("23P01") {
            return LedgerError::Conflict(format!(
                "{}: tax rate intervals would overlap",
                context
            ));
        }
    }
    LedgerError::Storage(anyhow::anyhow!("{}: {}", context, e))
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "tax-rate-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Begin a transaction holding the ledger's advisory lock.
    async fn begin_locked(&self) -> Result<Transaction<'static, Postgres>, LedgerError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error("Failed to begin transaction", e))?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(LEDGER_LOCK_KEY)
            .execute(&mut *tx)
            .await
            .map_err(|e| storage_error("Failed to acquire ledger lock", e))?;

        Ok(tx)
    }

    async fn find_for_update(
        tx: &mut Transaction<'static, Postgres>,
        id: Uuid,
    ) -> Result<Option<TaxRate>, LedgerError> {
        sqlx::query_as::<_, TaxRate>(&format!(
            "SELECT {} FROM tax_rates WHERE id = $1 FOR UPDATE",
            TAX_RATE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| storage_error("Failed to load tax rate", e))
    }

    async fn find_predecessor(
        tx: &mut Transaction<'static, Postgres>,
        target: &TaxRate,
    ) -> Result<Option<TaxRate>, LedgerError> {
        sqlx::query_as::<_, TaxRate>(&format!(
            "SELECT {} FROM tax_rates WHERE effective_to = $1 AND id <> $2 FOR UPDATE",
            TAX_RATE_COLUMNS
        ))
        .bind(target.effective_from)
        .bind(target.id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| storage_error("Failed to load preceding tax rate", e))
    }

    async fn commit(tx: Transaction<'static, Postgres>) -> Result<(), LedgerError> {
        tx.commit()
            .await
            .map_err(|e| storage_error("Failed to commit transaction", e))
    }
}

#[async_trait]
impl TaxRateRepository for Database {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), LedgerError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| storage_error("Health check failed", e))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn current(&self) -> Result<Option<TaxRate>, LedgerError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["current_tax_rate"])
            .start_timer();

        let tax_rate = sqlx::query_as::<_, TaxRate>(&format!(
            r#"
            SELECT {}
            FROM tax_rates
            WHERE effective_to IS NULL
            ORDER BY effective_from DESC
            LIMIT 1
            "#,
            TAX_RATE_COLUMNS
        ))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to get current tax rate", e))?;

        timer.observe_duration();

        Ok(tax_rate)
    }

    #[instrument(skip(self))]
    async fn list(&self) -> Result<Vec<TaxRate>, LedgerError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_tax_rates"])
            .start_timer();

        let tax_rates = sqlx::query_as::<_, TaxRate>(&format!(
            "SELECT {} FROM tax_rates ORDER BY effective_from DESC",
            TAX_RATE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to list tax rates", e))?;

        timer.observe_duration();

        Ok(tax_rates)
    }

    #[instrument(skip(self), fields(tax_rate_id = %id))]
    async fn find(&self, id: Uuid) -> Result<Option<TaxRate>, LedgerError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_tax_rate"])
            .start_timer();

        let tax_rate = sqlx::query_as::<_, TaxRate>(&format!(
            "SELECT {} FROM tax_rates WHERE id = $1",
            TAX_RATE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to get tax rate", e))?;

        timer.observe_duration();

        Ok(tax_rate)
    }

    #[instrument(skip(self), fields(date = %date))]
    async fn effective_on(&self, date: NaiveDate) -> Result<Vec<TaxRate>, LedgerError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["tax_rates_effective_on"])
            .start_timer();

        let tax_rates = sqlx::query_as::<_, TaxRate>(&format!(
            r#"
            SELECT {}
            FROM tax_rates
            WHERE effective_from <= $1
              AND (effective_to IS NULL OR effective_to > $1)
            ORDER BY effective_from DESC
            "#,
            TAX_RATE_COLUMNS
        ))
        .bind(date)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to get tax rate effective on date", e))?;

        timer.observe_duration();

        Ok(tax_rates)
    }

    #[instrument(skip(self, input), fields(effective_from = %input.effective_from, created_by = %created_by))]
    async fn append(
        &self,
        input: &CreateTaxRate,
        created_by: Uuid,
    ) -> Result<AppendedTaxRate, LedgerError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["append_tax_rate"])
            .start_timer();

        let mut tx = self.begin_locked().await?;

        let current = sqlx::query_as::<_, TaxRate>(&format!(
            r#"
            SELECT {}
            FROM tax_rates
            WHERE effective_to IS NULL
            ORDER BY effective_from DESC
            LIMIT 1
            FOR UPDATE
            "#,
            TAX_RATE_COLUMNS
        ))
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| storage_error("Failed to get current tax rate", e))?;

        rules::check_append(current.as_ref(), input.effective_from)?;

        // Close first so the single-current index never sees two open rows.
        let closed = match current {
            Some(current) => Some(
                sqlx::query_as::<_, TaxRate>(&format!(
                    "UPDATE tax_rates SET effective_to = $2 WHERE id = $1 RETURNING {}",
                    TAX_RATE_COLUMNS
                ))
                .bind(current.id)
                .bind(input.effective_from)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| storage_error("Failed to close current tax rate", e))?,
            ),
            None => None,
        };

        let created = sqlx::query_as::<_, TaxRate>(&format!(
            r#"
            INSERT INTO tax_rates (id, rate, multiplier, effective_from, effective_to, created_by)
            VALUES ($1, $2, $3, $4, NULL, $5)
            RETURNING {}
            "#,
            TAX_RATE_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(input.rate)
        .bind(input.multiplier)
        .bind(input.effective_from)
        .bind(created_by)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| storage_error("Failed to create tax rate", e))?;

        Self::commit(tx).await?;

        timer.observe_duration();

        Ok(AppendedTaxRate { created, closed })
    }

    #[instrument(skip(self, changes), fields(tax_rate_id = %id))]
    async fn amend(
        &self,
        id: Uuid,
        changes: &UpdateTaxRate,
        today: NaiveDate,
    ) -> Result<Option<TaxRate>, LedgerError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_tax_rate"])
            .start_timer();

        let mut tx = self.begin_locked().await?;

        let Some(target) = Self::find_for_update(&mut tx, id).await? else {
            return Ok(None);
        };
        rules::validate_changes(changes)?;
        rules::check_mutable(&target, today)?;

        if let Some(new_from) = rules::rescheduled_from(&target, changes) {
            let predecessor = Self::find_predecessor(&mut tx, &target).await?;
            rules::check_reschedule(&target, predecessor.as_ref(), new_from, today)?;

            if let Some(previous) = predecessor {
                sqlx::query("UPDATE tax_rates SET effective_to = $2 WHERE id = $1")
                    .bind(previous.id)
                    .bind(new_from)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| storage_error("Failed to move preceding tax rate", e))?;
            }
        }

        let tax_rate = sqlx::query_as::<_, TaxRate>(&format!(
            r#"
            UPDATE tax_rates
            SET rate = COALESCE($2, rate),
                multiplier = COALESCE($3, multiplier),
                effective_from = COALESCE($4, effective_from)
            WHERE id = $1
            RETURNING {}
            "#,
            TAX_RATE_COLUMNS
        ))
        .bind(id)
        .bind(changes.rate)
        .bind(changes.multiplier)
        .bind(changes.effective_from)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| storage_error("Failed to update tax rate", e))?;

        Self::commit(tx).await?;

        timer.observe_duration();

        Ok(Some(tax_rate))
    }

    #[instrument(skip(self), fields(tax_rate_id = %id))]
    async fn remove(&self, id: Uuid, today: NaiveDate) -> Result<bool, LedgerError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_tax_rate"])
            .start_timer();

        let mut tx = self.begin_locked().await?;

        let Some(target) = Self::find_for_update(&mut tx, id).await? else {
            return Ok(false);
        };
        rules::check_mutable(&target, today)?;

        sqlx::query("DELETE FROM tax_rates WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| storage_error("Failed to delete tax rate", e))?;

        // The predecessor inherits the deleted interval, re-opening it if the target was current.
        sqlx::query("UPDATE tax_rates SET effective_to = $2 WHERE effective_to = $1")
            .bind(target.effective_from)
            .bind(target.effective_to)
            .execute(&mut *tx)
            .await
            .map_err(|e| storage_error("Failed to extend preceding tax rate", e))?;

        Self::commit(tx).await?;

        timer.observe_duration();

        Ok(true)
    }
}
