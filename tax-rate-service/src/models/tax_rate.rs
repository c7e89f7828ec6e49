//! Tax rate model for tax-rate-service.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A statutory tax rate applying over `[effective_from, effective_to)`.
///
/// `effective_to == None` marks the current rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TaxRate {
    pub id: Uuid,
    #[serde(with = "rust_decimal::serde::float")]
    pub rate: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub multiplier: Decimal,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub created_by: Uuid,
}

impl TaxRate {
    pub fn is_current(&self) -> bool {
        self.effective_to.is_none()
    }

    /// Whether `date` falls inside the half-open effective interval.
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.effective_from <= date && self.effective_to.map_or(true, |to| to > date)
    }

    /// A rate has taken effect once its first day is today or earlier.
    pub fn has_taken_effect(&self, today: NaiveDate) -> bool {
        self.effective_from <= today
    }

    /// Whether the two intervals share at least one day.
    pub fn overlaps(&self, other: &TaxRate) -> bool {
        let starts_before_other_ends = other.effective_to.map_or(true, |to| self.effective_from < to);
        let other_starts_before_end = self.effective_to.map_or(true, |to| other.effective_from < to);
        starts_before_other_ends && other_starts_before_end
    }

    pub(crate) fn apply(&mut self, changes: &UpdateTaxRate) {
        if let Some(rate) = changes.rate {
            self.rate = rate;
        }
        if let Some(multiplier) = changes.multiplier {
            self.multiplier = multiplier;
        }
        if let Some(effective_from) = changes.effective_from {
            self.effective_from = effective_from;
        }
    }
}

/// Input for appending a tax rate to the ledger.
#[derive(Debug, Clone)]
pub struct CreateTaxRate {
    pub rate: Decimal,
    pub multiplier: Decimal,
    pub effective_from: NaiveDate,
}

/// Input for updating a future-dated tax rate.
#[derive(Debug, Clone, Default)]
pub struct UpdateTaxRate {
    pub rate: Option<Decimal>,
    pub multiplier: Option<Decimal>,
    pub effective_from: Option<NaiveDate>,
}

impl UpdateTaxRate {
    pub fn is_empty(&self) -> bool {
        self.rate.is_none() && self.multiplier.is_none() && self.effective_from.is_none()
    }
}

/// Result of an append: the inserted row and the row it closed, if any.
#[derive(Debug, Clone)]
pub struct AppendedTaxRate {
    pub created: TaxRate,
    pub closed: Option<TaxRate>,
}

/// The current rate together with every earlier or later non-current rate.
#[derive(Debug, Clone, Serialize)]
pub struct TaxRateOverview {
    pub current_rate: TaxRate,
    pub previous_rates: Vec<TaxRate>,
}
