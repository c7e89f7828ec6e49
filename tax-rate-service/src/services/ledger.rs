//! The tax rate ledger: lookups and invariant-preserving writes.

use crate::models::{CreateTaxRate, TaxRate, TaxRateOverview, UpdateTaxRate};
use crate::services::clock::Clock;
use crate::services::error::LedgerError;
use crate::services::metrics::{ERRORS_TOTAL, LEDGER_OPERATIONS_TOTAL};
use crate::services::repository::TaxRateRepository;
use crate::services::rules;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct TaxRateLedger {
    repository: Arc<dyn TaxRateRepository>,
    clock: Arc<dyn Clock>,
}

impl TaxRateLedger {
    pub fn new(repository: Arc<dyn TaxRateRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub async fn health_check(&self) -> Result<(), LedgerError> {
        self.repository.health_check().await
    }

    /// The rate in force with no end date.
    #[instrument(skip(self))]
    pub async fn get_current(&self) -> Result<TaxRate, LedgerError> {
        let result = match self.repository.current().await {
            Ok(Some(rate)) => Ok(rate),
            Ok(None) => {
                warn!("Tax rate ledger has no current rate");
                Err(LedgerError::NotFound)
            }
            Err(e) => Err(e),
        };
        record("get_current", result)
    }

    /// Every rate, newest `effective_from` first.
    #[instrument(skip(self))]
    pub async fn get_all(&self) -> Result<Vec<TaxRate>, LedgerError> {
        record("get_all", self.repository.list().await)
    }

    /// The current rate plus every other rate, newest first.
    #[instrument(skip(self))]
    pub async fn get_overview(&self) -> Result<TaxRateOverview, LedgerError> {
        let current_rate = self.get_current().await?;
        let previous_rates = self
            .get_all()
            .await?
            .into_iter()
            .filter(|rate| rate.id != current_rate.id)
            .collect();

        Ok(TaxRateOverview {
            current_rate,
            previous_rates,
        })
    }

    #[instrument(skip(self), fields(tax_rate_id = %id))]
    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<TaxRate>, LedgerError> {
        record("get_by_id", self.repository.find(id).await)
    }

    /// The rate whose interval contains `date`, or `None` if no rate covers it.
    #[instrument(skip(self), fields(date = %date))]
    pub async fn get_effective_on_date(
        &self,
        date: NaiveDate,
    ) -> Result<Option<TaxRate>, LedgerError> {
        let result = self.repository.effective_on(date).await.map(|matches| {
            if matches.len() > 1 {
                let ids: Vec<String> = matches.iter().map(|r| r.id.to_string()).collect();
                warn!(
                    date = %date,
                    matches = matches.len(),
                    tax_rate_ids = ?ids,
                    "Overlapping tax rate intervals; using the latest effective_from"
                );
            }
            matches.into_iter().max_by_key(|r| r.effective_from)
        });
        record("get_effective_on_date", result)
    }

    /// Appends a rate, closing the current one at its `effective_from`.
    #[instrument(skip(self, input), fields(actor_id = %actor_id, effective_from = %input.effective_from))]
    pub async fn create(&self, actor_id: Uuid, input: CreateTaxRate) -> Result<TaxRate, LedgerError> {
        let result = async {
            rules::ensure_valid_amount("rate", input.rate)?;
            rules::ensure_valid_amount("multiplier", input.multiplier)?;

            let appended = self.repository.append(&input, actor_id).await?;

            if let Some(closed) = &appended.closed {
                info!(
                    tax_rate_id = %closed.id,
                    effective_to = ?closed.effective_to,
                    "Previous tax rate closed"
                );
            }
            info!(
                tax_rate_id = %appended.created.id,
                rate = %appended.created.rate,
                multiplier = %appended.created.multiplier,
                effective_from = %appended.created.effective_from,
                "Tax rate created"
            );

            Ok::<_, LedgerError>(appended.created)
        }
        .await;
        record("create", result)
    }

    /// Updates a rate that has not taken effect yet.
    #[instrument(skip(self, changes), fields(tax_rate_id = %id))]
    pub async fn update(
        &self,
        id: Uuid,
        changes: UpdateTaxRate,
    ) -> Result<Option<TaxRate>, LedgerError> {
        let result = async {
            let updated = self.repository.amend(id, &changes, self.today()).await?;
            if let Some(rate) = &updated {
                info!(
                    tax_rate_id = %rate.id,
                    effective_from = %rate.effective_from,
                    "Tax rate updated"
                );
            }
            Ok::<_, LedgerError>(updated)
        }
        .await;
        record("update", result)
    }

    /// Deletes a rate that has not taken effect yet.
    #[instrument(skip(self), fields(tax_rate_id = %id))]
    pub async fn delete(&self, id: Uuid) -> Result<bool, LedgerError> {
        let result = self.repository.remove(id, self.today()).await;
        if let Ok(true) = result {
            info!(tax_rate_id = %id, "Tax rate deleted");
        }
        record("delete", result)
    }
}

/// Counts the outcome of a ledger operation and logs storage failures.
fn record<T>(operation: &str, result: Result<T, LedgerError>) -> Result<T, LedgerError> {
    match &result {
        Ok(_) => {
            LEDGER_OPERATIONS_TOTAL
                .with_label_values(&[operation, "ok"])
                .inc();
        }
        Err(e) => {
            LEDGER_OPERATIONS_TOTAL
                .with_label_values(&[operation, "error"])
                .inc();
            ERRORS_TOTAL.with_label_values(&[e.kind()]).inc();
            if let LedgerError::Storage(cause) = e {
                error!(operation = operation, error = ?cause, "Tax rate storage failure");
            }
        }
    }
    result
}
