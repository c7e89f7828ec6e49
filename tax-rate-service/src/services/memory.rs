//! In-process tax rate storage.
//!
//! A single `RwLock` serializes writers; each compound write runs entirely
//! under the write guard, so readers never observe a half-applied change.

use crate::models::{AppendedTaxRate, CreateTaxRate, TaxRate, UpdateTaxRate};
use crate::services::error::LedgerError;
use crate::services::repository::TaxRateRepository;
use crate::services::rules;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryTaxRateRepository {
    rates: RwLock<Vec<TaxRate>>,
}

impl InMemoryTaxRateRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from existing rows, e.g. a snapshot loaded elsewhere.
    pub fn with_rates(rates: Vec<TaxRate>) -> Self {
        Self {
            rates: RwLock::new(rates),
        }
    }
}

fn newest_first(mut rates: Vec<TaxRate>) -> Vec<TaxRate> {
    rates.sort_by(|a, b| b.effective_from.cmp(&a.effective_from));
    rates
}

#[async_trait]
impl TaxRateRepository for InMemoryTaxRateRepository {
    async fn health_check(&self) -> Result<(), LedgerError> {
        Ok(())
    }

    async fn current(&self) -> Result<Option<TaxRate>, LedgerError> {
        let rates = self.rates.read().await;
        Ok(rates
            .iter()
            .filter(|r| r.is_current())
            .max_by_key(|r| r.effective_from)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<TaxRate>, LedgerError> {
        let rates = self.rates.read().await;
        Ok(newest_first(rates.clone()))
    }

    async fn find(&self, id: Uuid) -> Result<Option<TaxRate>, LedgerError> {
        let rates = self.rates.read().await;
        Ok(rates.iter().find(|r| r.id == id).cloned())
    }

    async fn effective_on(&self, date: NaiveDate) -> Result<Vec<TaxRate>, LedgerError> {
        let rates = self.rates.read().await;
        Ok(newest_first(
            rates.iter().filter(|r| r.covers(date)).cloned().collect(),
        ))
    }

    async fn append(
        &self,
        input: &CreateTaxRate,
        created_by: Uuid,
    ) -> Result<AppendedTaxRate, LedgerError> {
        let mut rates = self.rates.write().await;

        let current_idx = rates
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_current())
            .max_by_key(|(_, r)| r.effective_from)
            .map(|(idx, _)| idx);

        rules::check_append(current_idx.map(|idx| &rates[idx]), input.effective_from)?;

        let closed = current_idx.map(|idx| {
            rates[idx].effective_to = Some(input.effective_from);
            rates[idx].clone()
        });

        let created = TaxRate {
            id: Uuid::new_v4(),
            rate: input.rate,
            multiplier: input.multiplier,
            effective_from: input.effective_from,
            effective_to: None,
            created_at: Utc::now(),
            created_by,
        };
        rates.push(created.clone());

        Ok(AppendedTaxRate { created, closed })
    }

    async fn amend(
        &self,
        id: Uuid,
        changes: &UpdateTaxRate,
        today: NaiveDate,
    ) -> Result<Option<TaxRate>, LedgerError> {
        let mut rates = self.rates.write().await;

        let Some(target_idx) = rates.iter().position(|r| r.id == id) else {
            return Ok(None);
        };
        rules::validate_changes(changes)?;
        rules::check_mutable(&rates[target_idx], today)?;

        if let Some(new_from) = rules::rescheduled_from(&rates[target_idx], changes) {
            let target = &rates[target_idx];
            let predecessor_idx = rates
                .iter()
                .position(|r| r.id != target.id && r.effective_to == Some(target.effective_from));

            rules::check_reschedule(
                target,
                predecessor_idx.map(|idx| &rates[idx]),
                new_from,
                today,
            )?;

            if let Some(idx) = predecessor_idx {
                rates[idx].effective_to = Some(new_from);
            }
        }

        rates[target_idx].apply(changes);
        Ok(Some(rates[target_idx].clone()))
    }

    async fn remove(&self, id: Uuid, today: NaiveDate) -> Result<bool, LedgerError> {
        let mut rates = self.rates.write().await;

        let Some(target_idx) = rates.iter().position(|r| r.id == id) else {
            return Ok(false);
        };
        rules::check_mutable(&rates[target_idx], today)?;

        let target = rates.remove(target_idx);
        if let Some(previous) = rates
            .iter_mut()
            .find(|r| r.effective_to == Some(target.effective_from))
        {
            previous.effective_to = target.effective_to;
        }

        Ok(true)
    }
}
