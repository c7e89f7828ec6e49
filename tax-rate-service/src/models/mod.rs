//! Domain models for tax-rate-service.

mod role;
mod tax_rate;

pub use role::{Permission, Role};
pub use tax_rate::{AppendedTaxRate, CreateTaxRate, TaxRate, TaxRateOverview, UpdateTaxRate};
