use crate::models::{CreateTaxRate, UpdateTaxRate};
use crate::services::rules;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use service_core::error::AppError;
use std::borrow::Cow;
use validator::{Validate, ValidationError};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTaxRateRequest {
    #[serde(with = "rust_decimal::serde::float")]
    #[validate(custom(function = "validate_amount"))]
    pub rate: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    #[validate(custom(function = "validate_amount"))]
    pub multiplier: Decimal,
    pub effective_from: NaiveDate,
}

impl From<CreateTaxRateRequest> for CreateTaxRate {
    fn from(req: CreateTaxRateRequest) -> Self {
        Self {
            rate: req.rate,
            multiplier: req.multiplier,
            effective_from: req.effective_from,
        }
    }
}

/// Partial update; omitted fields keep their stored values.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateTaxRateRequest {
    #[serde(default, with = "rust_decimal::serde::float_option")]
    #[validate(custom(function = "validate_amount"))]
    pub rate: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    #[validate(custom(function = "validate_amount"))]
    pub multiplier: Option<Decimal>,
    #[serde(default)]
    pub effective_from: Option<NaiveDate>,
}

impl From<UpdateTaxRateRequest> for UpdateTaxRate {
    fn from(req: UpdateTaxRateRequest) -> Self {
        Self {
            rate: req.rate,
            multiplier: req.multiplier,
            effective_from: req.effective_from,
        }
    }
}

/// Same bounds the ledger enforces, reported per field.
fn validate_amount(value: &Decimal) -> Result<(), ValidationError> {
    match rules::amount_violation(*value) {
        Some(violation) => {
            Err(ValidationError::new(violation.code()).with_message(Cow::from(violation.message())))
        }
        None => Ok(()),
    }
}

/// Parse a `YYYY-MM-DD` path segment into a calendar date.
pub fn parse_date_param(raw: &str) -> Result<NaiveDate, AppError> {
    let well_formed = raw.len() == 10
        && raw.bytes().enumerate().all(|(i, b)| match i {
            4 | 7 => b == b'-',
            _ => b.is_ascii_digit(),
        });

    well_formed
        .then(|| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
        .flatten()
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Invalid date format. Use YYYY-MM-DD")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn parses_iso_dates() {
        assert_eq!(
            parse_date_param("2024-06-15").expect("valid"),
            NaiveDate::from_ymd_opt(2024, 6, 15).expect("date")
        );
    }

    #[test]
    fn rejects_malformed_dates() {
        for raw in ["2024-6-15", "15-06-2024", "2024/06/15", "20240615", "2024-13-01", "2024-02-30", "abcd-ef-gh"] {
            assert!(
                matches!(parse_date_param(raw), Err(AppError::BadRequest(_))),
                "{} should be rejected",
                raw
            );
        }
    }

    #[test]
    fn create_request_accepts_numbers() {
        let req: CreateTaxRateRequest = serde_json::from_value(serde_json::json!({
            "rate": 0.0625,
            "multiplier": 1.15,
            "effective_from": "2025-01-01"
        }))
        .expect("deserializes");

        assert!(req.validate().is_ok());
        assert_eq!(req.rate, Decimal::from_str("0.0625").expect("decimal"));
        assert_eq!(req.multiplier, Decimal::from_str("1.15").expect("decimal"));
    }

    #[test]
    fn create_request_rejects_non_positive_values() {
        let req: CreateTaxRateRequest = serde_json::from_value(serde_json::json!({
            "rate": 0,
            "multiplier": -1.1,
            "effective_from": "2025-01-01"
        }))
        .expect("deserializes");

        let errors = req.validate().expect_err("invalid");
        let fields = errors.field_errors();
        assert!(fields.contains_key("rate"));
        assert!(fields.contains_key("multiplier"));
    }

    #[test]
    fn create_request_rejects_amounts_the_column_cannot_hold() {
        let req: CreateTaxRateRequest = serde_json::from_value(serde_json::json!({
            "rate": 0.0000001,
            "multiplier": 12345.0,
            "effective_from": "2025-01-01"
        }))
        .expect("deserializes");

        let errors = req.validate().expect_err("invalid");
        let fields = errors.field_errors();
        assert_eq!(fields["rate"][0].code, "too_many_decimal_places");
        assert_eq!(fields["multiplier"][0].code, "out_of_range");
    }

    #[test]
    fn six_decimal_places_are_accepted() {
        let req: CreateTaxRateRequest = serde_json::from_value(serde_json::json!({
            "rate": 0.000001,
            "multiplier": 9999.999999,
            "effective_from": "2025-01-01"
        }))
        .expect("deserializes");

        assert!(req.validate().is_ok());
    }

    #[test]
    fn update_request_rejects_too_precise_rate() {
        let req: UpdateTaxRateRequest =
            serde_json::from_value(serde_json::json!({ "rate": 0.12345678 }))
                .expect("deserializes");

        let errors = req.validate().expect_err("invalid");
        assert!(errors.field_errors().contains_key("rate"));
    }

    #[test]
    fn update_request_fields_are_optional() {
        let req: UpdateTaxRateRequest =
            serde_json::from_value(serde_json::json!({ "rate": 0.07 })).expect("deserializes");

        assert!(req.validate().is_ok());
        let changes = UpdateTaxRate::from(req);
        assert!(changes.rate.is_some());
        assert!(changes.multiplier.is_none());
        assert!(changes.effective_from.is_none());
    }
}
