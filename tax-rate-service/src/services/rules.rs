//! Interval rules shared by every repository implementation.
//!
//! Repositories call these while holding their write lock or transaction, so
//! the check and the write it guards are atomic.

use crate::models::{TaxRate, UpdateTaxRate};
use crate::services::error::LedgerError;
use chrono::NaiveDate;
use rust_decimal::Decimal;

/// Decimal places kept by the `NUMERIC(10,6)` rate and multiplier columns.
pub const MAX_SCALE: u32 = 6;

/// Exclusive upper bound of a `NUMERIC(10,6)` value (four integer digits).
pub const AMOUNT_LIMIT: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// Why a rate or multiplier cannot be stored exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountViolation {
    NotPositive,
    TooPrecise,
    TooLarge,
}

impl AmountViolation {
    pub fn code(&self) -> &'static str {
        match self {
            AmountViolation::NotPositive => "must_be_positive",
            AmountViolation::TooPrecise => "too_many_decimal_places",
            AmountViolation::TooLarge => "out_of_range",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            AmountViolation::NotPositive => "must be greater than zero",
            AmountViolation::TooPrecise => "must have at most 6 decimal places",
            AmountViolation::TooLarge => "must be less than 10000",
        }
    }
}

pub fn amount_violation(value: Decimal) -> Option<AmountViolation> {
    if value <= Decimal::ZERO {
        Some(AmountViolation::NotPositive)
    } else if value.normalize().scale() > MAX_SCALE {
        Some(AmountViolation::TooPrecise)
    } else if value >= AMOUNT_LIMIT {
        Some(AmountViolation::TooLarge)
    } else {
        None
    }
}

/// Rates and multipliers are positive and fit the storage column without rounding.
pub fn ensure_valid_amount(field: &str, value: Decimal) -> Result<(), LedgerError> {
    match amount_violation(value) {
        Some(violation) => Err(LedgerError::Validation(format!(
            "{} {}",
            field,
            violation.message()
        ))),
        None => Ok(()),
    }
}

/// A new rate must start strictly after the current one.
pub fn check_append(current: Option<&TaxRate>, effective_from: NaiveDate) -> Result<(), LedgerError> {
    match current {
        Some(current) if effective_from <= current.effective_from => Err(LedgerError::Conflict(format!(
            "effective_from {} must be after the current rate's effective_from {}",
            effective_from, current.effective_from
        ))),
        _ => Ok(()),
    }
}

/// Rates that have taken effect are immutable.
pub fn check_mutable(target: &TaxRate, today: NaiveDate) -> Result<(), LedgerError> {
    if target.has_taken_effect(today) {
        return Err(LedgerError::Forbidden(format!(
            "Cannot modify a tax rate that has taken effect (effective_from {})",
            target.effective_from
        )));
    }
    Ok(())
}

/// Moving a future rate's start keeps it in the future and inside its neighbours.
///
/// `predecessor` is the rate whose `effective_to` equals the target's current
/// `effective_from`.
pub fn check_reschedule(
    target: &TaxRate,
    predecessor: Option<&TaxRate>,
    new_from: NaiveDate,
    today: NaiveDate,
) -> Result<(), LedgerError> {
    if new_from <= today {
        return Err(LedgerError::Forbidden(format!(
            "effective_from {} would put the rate into effect retroactively",
            new_from
        )));
    }
    if let Some(previous) = predecessor {
        if new_from <= previous.effective_from {
            return Err(LedgerError::Conflict(format!(
                "effective_from {} must be after the preceding rate's effective_from {}",
                new_from, previous.effective_from
            )));
        }
    }
    if let Some(to) = target.effective_to {
        if new_from >= to {
            return Err(LedgerError::Conflict(format!(
                "effective_from {} must be before the following rate's effective_from {}",
                new_from, to
            )));
        }
    }
    Ok(())
}

/// Field-level checks for a partial update.
pub fn validate_changes(changes: &UpdateTaxRate) -> Result<(), LedgerError> {
    if changes.is_empty() {
        return Err(LedgerError::Validation(
            "At least one of rate, multiplier or effective_from is required".to_string(),
        ));
    }
    if let Some(rate) = changes.rate {
        ensure_valid_amount("rate", rate)?;
    }
    if let Some(multiplier) = changes.multiplier {
        ensure_valid_amount("multiplier", multiplier)?;
    }
    Ok(())
}

/// The start date a partial update moves the target to, if it moves at all.
pub fn rescheduled_from(target: &TaxRate, changes: &UpdateTaxRate) -> Option<NaiveDate> {
    changes
        .effective_from
        .filter(|new_from| *new_from != target.effective_from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::str::FromStr;
    use uuid::Uuid;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("valid date")
    }

    fn rate(from: &str, to: Option<&str>) -> TaxRate {
        TaxRate {
            id: Uuid::new_v4(),
            rate: Decimal::from_str("0.0625").expect("decimal"),
            multiplier: Decimal::from_str("1.15").expect("decimal"),
            effective_from: date(from),
            effective_to: to.map(date),
            created_at: Utc::now(),
            created_by: Uuid::new_v4(),
        }
    }

    #[test]
    fn append_requires_strictly_later_start() {
        let current = rate("2024-01-01", None);

        assert!(check_append(Some(&current), date("2024-01-02")).is_ok());
        assert!(matches!(
            check_append(Some(&current), date("2024-01-01")),
            Err(LedgerError::Conflict(_))
        ));
        assert!(matches!(
            check_append(Some(&current), date("2023-06-01")),
            Err(LedgerError::Conflict(_))
        ));
    }

    #[test]
    fn first_rate_may_start_any_day() {
        assert!(check_append(None, date("1999-01-01")).is_ok());
    }

    #[test]
    fn rates_in_effect_are_immutable() {
        let today = date("2025-03-01");

        assert!(matches!(
            check_mutable(&rate("2025-03-01", None), today),
            Err(LedgerError::Forbidden(_))
        ));
        assert!(check_mutable(&rate("2025-03-02", None), today).is_ok());
    }

    #[test]
    fn reschedule_stays_between_neighbours() {
        let today = date("2025-03-01");
        let previous = rate("2025-01-01", Some("2025-07-01"));
        let target = rate("2025-07-01", Some("2026-01-01"));

        assert!(check_reschedule(&target, Some(&previous), date("2025-09-01"), today).is_ok());
        assert!(matches!(
            check_reschedule(&target, Some(&previous), date("2026-01-01"), today),
            Err(LedgerError::Conflict(_))
        ));
    }

    #[test]
    fn reschedule_cannot_pass_predecessor_or_today() {
        let today = date("2025-03-01");
        let previous = rate("2025-04-01", Some("2025-07-01"));
        let target = rate("2025-07-01", None);

        assert!(matches!(
            check_reschedule(&target, Some(&previous), date("2025-04-01"), today),
            Err(LedgerError::Conflict(_))
        ));
        assert!(matches!(
            check_reschedule(&target, None, date("2025-03-01"), today),
            Err(LedgerError::Forbidden(_))
        ));
    }

    #[test]
    fn changes_must_be_non_empty_and_positive() {
        assert!(matches!(
            validate_changes(&UpdateTaxRate::default()),
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            validate_changes(&UpdateTaxRate {
                multiplier: Some(Decimal::ZERO),
                ..Default::default()
            }),
            Err(LedgerError::Validation(_))
        ));
        assert!(validate_changes(&UpdateTaxRate {
            rate: Some(Decimal::from_str("0.07").expect("decimal")),
            ..Default::default()
        })
        .is_ok());
    }

    #[test]
    fn amounts_must_fit_the_storage_column() {
        let amount = |s: &str| Decimal::from_str(s).expect("decimal");

        assert_eq!(amount_violation(amount("0.000001")), None);
        assert_eq!(amount_violation(amount("9999.999999")), None);
        assert_eq!(amount_violation(amount("0.1000000")), None);
        assert_eq!(
            amount_violation(amount("0.0000001")),
            Some(AmountViolation::TooPrecise)
        );
        assert_eq!(
            amount_violation(amount("0.12345678")),
            Some(AmountViolation::TooPrecise)
        );
        assert_eq!(
            amount_violation(amount("10000")),
            Some(AmountViolation::TooLarge)
        );
        assert_eq!(
            amount_violation(amount("12345.0")),
            Some(AmountViolation::TooLarge)
        );
        assert_eq!(
            amount_violation(Decimal::ZERO),
            Some(AmountViolation::NotPositive)
        );
    }

    #[test]
    fn invalid_amount_names_the_field() {
        let err = ensure_valid_amount("multiplier", Decimal::from_str("12345").expect("decimal"))
            .expect_err("too large");

        assert!(matches!(
            &err,
            LedgerError::Validation(msg) if msg == "multiplier must be less than 10000"
        ));
    }

    #[test]
    fn unchanged_start_is_not_a_reschedule() {
        let target = rate("2025-07-01", None);
        let same = UpdateTaxRate {
            effective_from: Some(date("2025-07-01")),
            ..Default::default()
        };
        let moved = UpdateTaxRate {
            effective_from: Some(date("2025-08-01")),
            ..Default::default()
        };

        assert_eq!(rescheduled_from(&target, &same), None);
        assert_eq!(rescheduled_from(&target, &moved), Some(date("2025-08-01")));
    }
}
