//! Services module for tax-rate-service.

pub mod clock;
pub mod database;
pub mod error;
pub mod jwt;
pub mod ledger;
pub mod memory;
pub mod metrics;
pub mod repository;
pub mod rules;

pub use clock::{Clock, FixedClock, SystemClock};
pub use database::Database;
pub use error::LedgerError;
pub use jwt::{Claims, JwtVerifier};
pub use ledger::TaxRateLedger;
pub use memory::InMemoryTaxRateRepository;
pub use metrics::{get_metrics, init_metrics};
pub use repository::TaxRateRepository;
