pub mod health;
pub mod tax_rates;

pub use health::{health_check, metrics_handler, readiness_check};
pub use tax_rates::{
    create_tax_rate, delete_tax_rate, get_effective_tax_rate, get_tax_rate, list_tax_rates,
    update_tax_rate,
};
