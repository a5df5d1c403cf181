//! Money arithmetic for documents.
//!
//! Amounts are exact decimals in major units. Rounding is half away from
//! zero at two places for tax and at zero places for cents.

use crate::models::DocumentItem;
use rust_decimal::{Decimal, RoundingStrategy};
use service_core::error::AppError;

/// Subtotal, tax and total in major units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Totals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

/// Totals converted to integer minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TotalsCents {
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
}

fn out_of_range() -> AppError {
    AppError::BadRequest(anyhow::anyhow!("Amounts are out of range"))
}

impl Totals {
    pub fn compute(items: &[DocumentItem], tax_rate: Decimal) -> Result<Self, AppError> {
        let subtotal = items.iter().try_fold(Decimal::ZERO, |acc, item| {
            item.line_total()
                .and_then(|line| acc.checked_add(line))
                .ok_or_else(out_of_range)
        })?;

        let tax = subtotal
            .checked_mul(tax_rate)
            .ok_or_else(out_of_range)?
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);

        let total = subtotal.checked_add(tax).ok_or_else(out_of_range)?;

        Ok(Self {
            subtotal,
            tax,
            total,
        })
    }

    pub fn to_cents(&self) -> Result<TotalsCents, AppError> {
        Ok(TotalsCents {
            subtotal_cents: to_cents(self.subtotal)?,
            tax_cents: to_cents(self.tax)?,
            total_cents: to_cents(self.total)?,
        })
    }
}

/// `round(amount * 100)` as an integer.
pub fn to_cents(amount: Decimal) -> Result<i64, AppError> {
    let cents = amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .ok_or_else(out_of_range)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);

    i64::try_from(cents).map_err(|_| out_of_range())
}
