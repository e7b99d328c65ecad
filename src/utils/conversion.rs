// src/utils/conversion.rs
//! Scaling between the ledger's integer amounts and human readable decimals.
//!
//! Prices on the auction are quoted in quote smallest units per base smallest
//! unit. Volumes are always smallest units of the base token.

use crate::error::ConversionError;
use crate::types::MAX_DECIMALS;
use rust_decimal::{Decimal, RoundingStrategy};

/// `10^exp` as a decimal. Negative exponents down to -28 are exact.
pub fn pow10(exp: i64) -> Result<Decimal, ConversionError> {
    if exp.unsigned_abs() > MAX_DECIMALS as u64 {
        return Err(ConversionError::ScaleOutOfRange(exp));
    }
    if exp >= 0 {
        Decimal::try_from_i128_with_scale(10i128.pow(exp as u32), 0)
            .map_err(|_| ConversionError::ScaleOutOfRange(exp))
    } else {
        Ok(Decimal::new(1, (-exp) as u32))
    }
}

fn scale_by(value: Decimal, exp: i64) -> Result<Decimal, ConversionError> {
    value
        .checked_mul(pow10(exp)?)
        .ok_or_else(|| ConversionError::Overflow(value.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayVolume {
    pub volume_in_base: Decimal,
    pub volume_in_quote: Decimal,
}

/// Raw auction price -> quote per base.
pub fn to_display_price(
    raw_price: Decimal,
    base_decimals: u32,
    quote_decimals: u32,
) -> Result<Decimal, ConversionError> {
    scale_by(raw_price, base_decimals as i64 - quote_decimals as i64)
}

/// Quote per base -> raw auction price.
pub fn to_raw_price(
    display_price: Decimal,
    base_decimals: u32,
    quote_decimals: u32,
) -> Result<Decimal, ConversionError> {
    if display_price.is_sign_negative() && !display_price.is_zero() {
        return Err(ConversionError::Negative(display_price.to_string()));
    }
    scale_by(display_price, quote_decimals as i64 - base_decimals as i64)
}

/// Raw base volume -> base and quote amounts at `display_price`.
pub fn to_display_volume(
    raw_volume: u128,
    base_decimals: u32,
    display_price: Decimal,
) -> Result<DisplayVolume, ConversionError> {
    let mantissa =
        i128::try_from(raw_volume).map_err(|_| ConversionError::Overflow(raw_volume.to_string()))?;
    let volume_in_base = Decimal::try_from_i128_with_scale(mantissa, base_decimals)
        .map_err(|_| ConversionError::Overflow(raw_volume.to_string()))?;
    let volume_in_quote = volume_in_base
        .checked_mul(display_price)
        .ok_or_else(|| ConversionError::Overflow(volume_in_base.to_string()))?;
    Ok(DisplayVolume {
        volume_in_base,
        volume_in_quote,
    })
}

/// Integer part of a non-negative decimal as `u128`.
pub fn decimal_to_nat(value: Decimal) -> Result<u128, ConversionError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ConversionError::Negative(value.to_string()));
    }
    let whole = value.trunc();
    let divisor = 10i128.pow(whole.scale());
    u128::try_from(whole.mantissa() / divisor)
        .map_err(|_| ConversionError::Overflow(value.to_string()))
}

/// Human base amount -> smallest units, rounded half away from zero.
pub fn to_raw_volume(display_base_amount: Decimal, base_decimals: u32) -> Result<u128, ConversionError> {
    let scaled = scale_by(display_base_amount, base_decimals as i64)?;
    decimal_to_nat(scaled.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
}

/// Smallest units -> human amount of a token with `decimals`.
pub fn nat_to_decimal(amount: u128, decimals: u32) -> Result<Decimal, ConversionError> {
    to_display_volume(amount, decimals, Decimal::ZERO).map(|v| v.volume_in_base)
}
