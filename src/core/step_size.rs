// src/core/step_size.rs
use crate::error::ConversionError;
use crate::utils::conversion::pow10;
use crate::utils::precision::normalize_quantity;
use rust_decimal::{Decimal, RoundingStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepAdjustment {
    /// Largest admissible base volume not above the request.
    pub volume: Decimal,
    /// Fractional digits used for `volume`.
    pub decimals: u32,
    /// The quote step expressed in base units at the given price.
    pub base_step: Decimal,
}

/// Floors `amount` (base units) so that `amount * price` lands on a multiple of
/// `step_in_quote` while `amount` stays writable in `base_decimals` digits.
pub fn floor_to_step(
    step_in_quote: Decimal,
    price: Decimal,
    amount: Decimal,
    base_decimals: u32,
) -> Result<StepAdjustment, ConversionError> {
    if price <= Decimal::ZERO {
        return Err(ConversionError::InvalidNumber(price.to_string()));
    }
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(ConversionError::Negative(amount.to_string()));
    }
    if step_in_quote <= Decimal::ZERO {
        let volume = amount.round_dp_with_strategy(base_decimals, RoundingStrategy::ToZero);
        return Ok(StepAdjustment {
            volume,
            decimals: base_decimals,
            base_step: pow10(-(base_decimals as i64))?,
        });
    }

    let base_step = step_in_quote
        .checked_div(price)
        .ok_or_else(|| ConversionError::Overflow(step_in_quote.to_string()))?
        .normalize();
    let granularity = volume_granularity(step_in_quote, price, base_decimals)?;

    let mut volume = normalize_quantity(amount, granularity)?;
    // amount / granularity is rounded at 28 digits and may floor one step too high
    if volume > amount {
        volume -= granularity;
    }

    Ok(StepAdjustment {
        volume: volume.normalize(),
        decimals: granularity.scale(),
        base_step,
    })
}

/// Smallest base volume `g` such that `g * price` is a whole number of steps and
/// `g` has at most `decimals` fractional digits. Every admissible volume is a
/// multiple of it.
fn volume_granularity(
    step: Decimal,
    price: Decimal,
    decimals: u32,
) -> Result<Decimal, ConversionError> {
    let overflow = || ConversionError::Overflow(step.to_string());
    let (step, price) = (step.normalize(), price.normalize());
    let (s, p) = (step.mantissa().unsigned_abs(), price.mantissa().unsigned_abs());

    // step / price as the fraction num / den
    let (num, den) = if price.scale() >= step.scale() {
        let shift = 10u128.checked_pow(price.scale() - step.scale()).ok_or_else(overflow)?;
        (s.checked_mul(shift).ok_or_else(overflow)?, p)
    } else {
        let shift = 10u128.checked_pow(step.scale() - price.scale()).ok_or_else(overflow)?;
        (s, p.checked_mul(shift).ok_or_else(overflow)?)
    };
    let g = gcd(num, den);
    let (num, den) = (num / g, den / g);

    // the part of den that `decimals` fractional digits can absorb
    let mut rest = den;
    let mut absorbed = 1u128;
    for factor in [2u128, 5] {
        for _ in 0..decimals {
            if rest % factor != 0 {
                break;
            }
            rest /= factor;
            absorbed *= factor;
        }
    }

    let unit = 10u128
        .checked_pow(decimals)
        .ok_or(ConversionError::ScaleOutOfRange(decimals as i64))?;
    let mantissa = num.checked_mul(unit / absorbed).ok_or_else(overflow)?;
    let mantissa = i128::try_from(mantissa).map_err(|_| overflow())?;
    Decimal::try_from_i128_with_scale(mantissa, decimals)
        .map(|g| g.normalize())
        .map_err(|_| overflow())
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}
