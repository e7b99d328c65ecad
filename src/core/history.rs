// src/core/history.rs
use crate::error::ConversionError;
use crate::types::{DataItem, PricePoint, TokenDataItem, TokenMetadata, TransactionRecord};
use crate::utils::conversion::{to_display_price, to_display_volume};
use crate::utils::precision::{apply_uniform_decimals, ExtraDigits};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

fn data_item(
    datetime: DateTime<Utc>,
    raw_price: Decimal,
    raw_volume: u128,
    base: &TokenMetadata,
    quote: &TokenMetadata,
) -> Result<DataItem, ConversionError> {
    let price = to_display_price(raw_price, base.decimals(), quote.decimals())?;
    let volume = to_display_volume(raw_volume, base.decimals(), price)?;
    Ok(DataItem {
        datetime,
        price,
        volume: raw_volume,
        volume_in_base: volume.volume_in_base,
        volume_in_quote: volume.volume_in_quote,
        price_decimals: 0,
        volume_in_base_decimals: 0,
        volume_in_quote_decimals: 0,
    })
}

/// Price history rows for `base`, newest first, with one precision per column.
pub fn price_rows(
    points: &[PricePoint],
    base: &TokenMetadata,
    quote: &TokenMetadata,
    extra: ExtraDigits,
) -> Result<Vec<DataItem>, ConversionError> {
    let mut rows = points
        .iter()
        .map(|p| data_item(p.timestamp, p.price, p.volume, base, quote))
        .collect::<Result<Vec<_>, _>>()?;
    rows.sort_by(|a, b| b.datetime.cmp(&a.datetime));
    apply_uniform_decimals(&mut rows, extra);
    Ok(rows)
}

/// Transaction rows of the trader for `base`, newest first.
pub fn transaction_rows(
    records: &[TransactionRecord],
    base: &TokenMetadata,
    quote: &TokenMetadata,
    extra: ExtraDigits,
) -> Result<Vec<TokenDataItem>, ConversionError> {
    let mut rows = records
        .iter()
        .filter(|r| r.token == base.symbol())
        .map(|r| {
            Ok(TokenDataItem {
                side: r.side,
                symbol: r.token.clone(),
                item: data_item(r.timestamp, r.price, r.volume, base, quote)?,
            })
        })
        .collect::<Result<Vec<_>, ConversionError>>()?;
    rows.sort_by(|a, b| b.item.datetime.cmp(&a.item.datetime));
    apply_uniform_decimals(&mut rows, extra);
    Ok(rows)
}
