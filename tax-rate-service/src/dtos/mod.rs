pub mod tax_rates;

pub use tax_rates::{parse_date_param, CreateTaxRateRequest, UpdateTaxRateRequest};
