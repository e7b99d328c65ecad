// src/utils/precision.rs
use crate::error::ConversionError;
use crate::types::{DataItem, TokenDataItem};
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

/// Rounds the quantity DOWN to the nearest multiple of step_size.
/// Example: amount=10.999, step=1.0 -> 10.0
pub fn normalize_quantity(
    amount: Decimal,
    step_size: Decimal,
) -> Result<Decimal, ConversionError> {
    if step_size.is_zero() {
        return Ok(amount);
    }
    amount
        .checked_div(step_size)
        .and_then(|steps| steps.floor().checked_mul(step_size))
        .ok_or_else(|| ConversionError::Overflow(amount.to_string()))
}

/// Rounds the price to the NEAREST multiple of tick_size.
/// Example: price=100.16, tick=0.1 -> 100.2
pub fn normalize_price(
    price: Decimal,
    tick_size: Decimal,
) -> Result<Decimal, ConversionError> {
    if tick_size.is_zero() {
        return Ok(price);
    }
    price
        .checked_div(tick_size)
        .and_then(|ticks| ticks.round().checked_mul(tick_size))
        .ok_or_else(|| ConversionError::Overflow(price.to_string()))
}

/// Parses a number that may come in exponential notation (`1.5e-7`) into a plain decimal.
pub fn parse_decimal(input: &str) -> Result<Decimal, ConversionError> {
    let s = input.trim();
    let parsed = if s.contains(['e', 'E']) {
        Decimal::from_scientific(s)
    } else {
        Decimal::from_str(s)
    };
    parsed.map_err(|_| ConversionError::InvalidNumber(input.to_string()))
}

fn digit_count(mut n: u128) -> u32 {
    let mut digits = 1;
    while n >= 10 {
        n /= 10;
        digits += 1;
    }
    digits
}

/// Fractional digits needed to show `value` with `extra` significant digits
/// after its first non-zero fractional digit. Never more than the value itself has.
pub fn significant_decimals(value: Decimal, extra: u32) -> u32 {
    let fract = value.abs().fract().normalize();
    if fract.is_zero() {
        return 0;
    }
    let scale = fract.scale();
    let leading_zeros = scale.saturating_sub(digit_count(fract.mantissa().unsigned_abs()));
    (leading_zeros + extra).min(scale)
}

/// Number of significant digits of `value`, ignoring trailing zeros.
pub fn significant_digits(value: Decimal) -> u32 {
    let n = value.normalize();
    if n.is_zero() {
        return 0;
    }
    let mut mantissa = n.mantissa().unsigned_abs();
    while mantissa % 10 == 0 {
        mantissa /= 10;
    }
    digit_count(mantissa)
}

/// Renders `value` with exactly `decimals` fractional digits.
pub fn format_fixed(value: Decimal, decimals: u32) -> String {
    let rounded = value.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.*}", decimals as usize, rounded)
}

/// Extra significant digits shown per column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtraDigits {
    pub price: u32,
    pub volume: u32,
}

impl Default for ExtraDigits {
    fn default() -> Self {
        Self {
            price: 4,
            volume: 2,
        }
    }
}

/// A table row whose numeric columns share one precision per batch.
pub trait PrecisionRow {
    fn price(&self) -> Decimal;
    fn volume_in_base(&self) -> Decimal;
    fn volume_in_quote(&self) -> Decimal;
    fn set_decimals(&mut self, price: u32, volume_in_base: u32, volume_in_quote: u32);
}

impl PrecisionRow for DataItem {
    fn price(&self) -> Decimal {
        self.price
    }

    fn volume_in_base(&self) -> Decimal {
        self.volume_in_base
    }

    fn volume_in_quote(&self) -> Decimal {
        self.volume_in_quote
    }

    fn set_decimals(&mut self, price: u32, volume_in_base: u32, volume_in_quote: u32) {
        self.price_decimals = price;
        self.volume_in_base_decimals = volume_in_base;
        self.volume_in_quote_decimals = volume_in_quote;
    }
}

impl PrecisionRow for TokenDataItem {
    fn price(&self) -> Decimal {
        self.item.price
    }

    fn volume_in_base(&self) -> Decimal {
        self.item.volume_in_base
    }

    fn volume_in_quote(&self) -> Decimal {
        self.item.volume_in_quote
    }

    fn set_decimals(&mut self, price: u32, volume_in_base: u32, volume_in_quote: u32) {
        self.item.set_decimals(price, volume_in_base, volume_in_quote);
    }
}

/// Column precisions for a batch: the widest any row needs, per column.
pub fn batch_decimals<R: PrecisionRow>(rows: &[R], extra: ExtraDigits) -> (u32, u32, u32) {
    rows.iter().fold((0, 0, 0), |(p, b, q), row| {
        (
            p.max(significant_decimals(row.price(), extra.price)),
            b.max(significant_decimals(row.volume_in_base(), extra.volume)),
            q.max(significant_decimals(row.volume_in_quote(), extra.volume)),
        )
    })
}

/// Assigns the batch-wide precision to every row so the columns line up.
pub fn apply_uniform_decimals<R: PrecisionRow>(rows: &mut [R], extra: ExtraDigits) {
    let (p, b, q) = batch_decimals(rows, extra);
    for row in rows.iter_mut() {
        row.set_decimals(p, b, q);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn row(price: Decimal, base: Decimal, quote: Decimal) -> DataItem {
        DataItem {
            datetime: Utc::now(),
            price,
            volume: 0,
            volume_in_base: base,
            volume_in_quote: quote,
            price_decimals: 0,
            volume_in_base_decimals: 0,
            volume_in_quote_decimals: 0,
        }
    }

    #[test]
    fn normalize_quantity_floors_to_step() {
        assert_eq!(normalize_quantity(dec!(10.999), dec!(1.0)).unwrap(), dec!(10));
        assert_eq!(normalize_quantity(dec!(0.0257), dec!(0.001)).unwrap(), dec!(0.025));
        assert_eq!(normalize_quantity(dec!(3.3), Decimal::ZERO).unwrap(), dec!(3.3));
        assert!(matches!(
            normalize_quantity(dec!(1_000_000_000_000), dec!(0.000000000000000001)),
            Err(ConversionError::Overflow(_))
        ));
    }

    #[test]
    fn normalize_price_rounds_to_tick() {
        assert_eq!(normalize_price(dec!(100.16), dec!(0.1)).unwrap(), dec!(100.2));
        assert_eq!(normalize_price(dec!(100.14), dec!(0.1)).unwrap(), dec!(100.1));
        assert!(normalize_price(dec!(1_000_000_000_000), dec!(0.000000000000000001)).is_err());
    }

    #[test]
    fn parse_decimal_expands_exponents() {
        assert_eq!(parse_decimal("1.5e-7").unwrap(), dec!(0.00000015));
        assert_eq!(parse_decimal("2E3").unwrap(), dec!(2000));
        assert_eq!(parse_decimal(" 0.25 ").unwrap(), dec!(0.25));
        assert!(matches!(
            parse_decimal("abc"),
            Err(ConversionError::InvalidNumber(_))
        ));
    }

    #[test]
    fn significant_decimals_counts_leading_zeros_plus_extra() {
        assert_eq!(significant_decimals(dec!(0.00123456), 2), 4);
        assert_eq!(significant_decimals(dec!(1.5), 2), 1);
        assert_eq!(significant_decimals(dec!(12.3456789), 4), 4);
        assert_eq!(significant_decimals(dec!(100), 4), 0);
        assert_eq!(significant_decimals(dec!(2.000), 4), 0);
        assert_eq!(significant_decimals(Decimal::ZERO, 4), 0);
    }

    #[test]
    fn significant_digits_ignores_zeros() {
        assert_eq!(significant_digits(dec!(123.4500)), 5);
        assert_eq!(significant_digits(dec!(0.000120)), 2);
        assert_eq!(significant_digits(dec!(1200)), 2);
        assert_eq!(significant_digits(Decimal::ZERO), 0);
    }

    #[test]
    fn batch_gets_uniform_precision() {
        let mut rows = vec![
            row(dec!(100.5), dec!(1.5), dec!(150.75)),
            row(dec!(0.000321), dec!(2), dec!(0.000642)),
        ];
        apply_uniform_decimals(&mut rows, ExtraDigits::default());
        for r in &rows {
            assert_eq!(r.price_decimals, 6);
            assert_eq!(r.volume_in_base_decimals, 1);
            assert_eq!(r.volume_in_quote_decimals, 5);
        }
    }

    #[test]
    fn tracker_is_idempotent() {
        let mut rows = vec![
            row(dec!(3.14159), dec!(0.0042), dec!(0.01319)),
            row(dec!(2.5), dec!(10), dec!(25)),
        ];
        apply_uniform_decimals(&mut rows, ExtraDigits::default());
        let once = rows.clone();
        apply_uniform_decimals(&mut rows, ExtraDigits::default());
        assert_eq!(rows, once);
    }

    #[test]
    fn all_zero_column_has_no_decimals() {
        let mut rows = vec![row(dec!(0), dec!(0), dec!(0)), row(dec!(0), dec!(0), dec!(0))];
        apply_uniform_decimals(&mut rows, ExtraDigits::default());
        assert!(rows
            .iter()
            .all(|r| r.price_decimals == 0 && r.volume_in_quote_decimals == 0));
    }

    #[test]
    fn format_fixed_pads_and_rounds() {
        assert_eq!(format_fixed(dec!(1.5), 3), "1.500");
        assert_eq!(format_fixed(dec!(0.125), 2), "0.13");
        assert_eq!(format_fixed(dec!(42), 0), "42");
    }
}
