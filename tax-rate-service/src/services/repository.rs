use crate::models::{AppendedTaxRate, CreateTaxRate, TaxRate, UpdateTaxRate};
use crate::services::error::LedgerError;
use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

/// Storage for the tax rate ledger.
///
/// Compound writes (`append`, `amend`, `remove`) must be atomic: the rule
/// checks and every row they touch commit together or not at all, and are
/// serialized against other compound writes.
#[async_trait]
pub trait TaxRateRepository: Send + Sync {
    async fn health_check(&self) -> Result<(), LedgerError>;

    /// The row with no `effective_to`, if any.
    async fn current(&self) -> Result<Option<TaxRate>, LedgerError>;

    /// Every rate, newest `effective_from` first.
    async fn list(&self) -> Result<Vec<TaxRate>, LedgerError>;

    async fn find(&self, id: Uuid) -> Result<Option<TaxRate>, LedgerError>;

    /// Every rate whose interval contains `date`, newest `effective_from` first.
    async fn effective_on(&self, date: NaiveDate) -> Result<Vec<TaxRate>, LedgerError>;

    /// Closes the current rate at `input.effective_from` and inserts the new current rate.
    async fn append(
        &self,
        input: &CreateTaxRate,
        created_by: Uuid,
    ) -> Result<AppendedTaxRate, LedgerError>;

    /// Updates a future-dated rate, moving its predecessor's `effective_to`
    /// along with a changed `effective_from`. `None` if `id` is unknown,
    /// checked before the change set itself is validated.
    async fn amend(
        &self,
        id: Uuid,
        changes: &UpdateTaxRate,
        today: NaiveDate,
    ) -> Result<Option<TaxRate>, LedgerError>;

    /// Deletes a future-dated rate and hands its interval to its predecessor.
    /// `false` if `id` is unknown.
    async fn remove(&self, id: Uuid, today: NaiveDate) -> Result<bool, LedgerError>;
}
