// src/core/validator.rs
//! Client-side pre-check of a new order against the trader's own resting
//! orders. The auction service stays authoritative.

use crate::types::{Order, Side, TokenMetadata};
use crate::utils::conversion::pow10;
use crate::utils::precision::{normalize_price, significant_digits};
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrderConflict {
    #[error("an order is already open at this price ({price})")]
    AlreadyOpen { price: Decimal },
    #[error("price crosses your existing ask at {price}")]
    CrossesAsk { price: Decimal },
    #[error("price crosses your existing bid at {price}")]
    CrossesBid { price: Decimal },
    #[error("price has {digits} significant digits, the auction accepts at most {limit}")]
    TooManyDigits { digits: u32, limit: u32 },
}

/// `price` on the quote token's tick. Prices too large to rescale compare as they are.
fn round_to_token(price: Decimal, token: &TokenMetadata) -> Decimal {
    pow10(-(token.decimals() as i64))
        .and_then(|tick| normalize_price(price, tick))
        .unwrap_or(price)
}

/// Checks `price` for a new `side` order on `base/quote` against `existing`.
/// Rules are applied in order across all orders; the first rule that matches wins.
pub fn validate(
    existing: &[Order],
    base: &str,
    quote: &str,
    side: Side,
    price: Decimal,
    quote_token: &TokenMetadata,
) -> Option<OrderConflict> {
    let same_pair = |o: &&Order| o.base == base && o.quote == quote;
    let rounded = round_to_token(price, quote_token);

    if let Some(o) = existing
        .iter()
        .filter(same_pair)
        .find(|o| o.side == side && round_to_token(o.price, quote_token) == rounded)
    {
        return Some(OrderConflict::AlreadyOpen { price: o.price });
    }

    match side {
        Side::Buy => existing
            .iter()
            .filter(same_pair)
            .find(|o| o.side == Side::Sell && price >= o.price)
            .map(|o| OrderConflict::CrossesAsk { price: o.price }),
        Side::Sell => existing
            .iter()
            .filter(same_pair)
            .find(|o| o.side == Side::Buy && price <= o.price)
            .map(|o| OrderConflict::CrossesBid { price: o.price }),
    }
}

pub fn check_price_digits(price: Decimal, limit: u32) -> Option<OrderConflict> {
    let digits = significant_digits(price);
    (limit > 0 && digits > limit).then_some(OrderConflict::TooManyDigits { digits, limit })
}
