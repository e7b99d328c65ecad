// src/connectors/messages.rs
//! JSON shapes of the auction gateway. Naturals travel as decimal strings,
//! prices as strings that may use exponential notation.

use crate::error::{ConversionError, MetadataError, RemoteError, ServiceError};
use crate::types::{
    AuctionSettings, Credit, FundsReceipt, PricePoint, RawOrder, Side, TokenMetadata,
    TransactionRecord,
};
use crate::utils::precision::parse_decimal;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub fn parse_nat(text: &str) -> Result<u128, ConversionError> {
    text.trim()
        .replace('_', "")
        .parse::<u128>()
        .map_err(|_| ConversionError::InvalidNumber(text.to_string()))
}

fn parse_timestamp(nanos: u64) -> Result<DateTime<Utc>, ConversionError> {
    let nanos = i64::try_from(nanos).map_err(|_| ConversionError::Overflow(nanos.to_string()))?;
    Ok(Utc.timestamp_nanos(nanos))
}

/// Unwraps a `{"Ok": ..}` / `{"Err": ..}` result variant. Plain values pass through.
pub fn unwrap_result(value: Value) -> Result<Value, ServiceError> {
    match value {
        Value::Object(mut map) if map.len() == 1 && map.contains_key("Ok") => {
            Ok(map.remove("Ok").unwrap_or(Value::Null))
        }
        Value::Object(mut map) if map.len() == 1 && map.contains_key("Err") => {
            Err(remote_error(map.remove("Err").unwrap_or(Value::Null)).into())
        }
        other => Ok(other),
    }
}

fn remote_error(payload: Value) -> RemoteError {
    match payload {
        Value::String(code) => RemoteError::new(code),
        Value::Object(map) => match map.into_iter().next() {
            Some((code, Value::Null)) => RemoteError::new(code),
            Some((code, detail)) => RemoteError::with_detail(code, detail.to_string()),
            None => RemoteError::new("Unknown"),
        },
        other => RemoteError::with_detail("Unknown", other.to_string()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookSide {
    Bid,
    Ask,
}

impl From<BookSide> for Side {
    fn from(side: BookSide) -> Self {
        match side {
            BookSide::Bid => Side::Buy,
            BookSide::Ask => Side::Sell,
        }
    }
}

impl From<Side> for BookSide {
    fn from(side: Side) -> Self {
        match side {
            Side::Buy => BookSide::Bid,
            Side::Sell => BookSide::Ask,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenInfoMessage {
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub decimals: Option<u32>,
    pub fee: Option<String>,
    pub principal: Option<String>,
}

impl TryFrom<TokenInfoMessage> for TokenMetadata {
    type Error = MetadataError;

    fn try_from(msg: TokenInfoMessage) -> Result<Self, Self::Error> {
        let symbol = msg.symbol.ok_or(MetadataError::MissingField("symbol"))?;
        let decimals = msg.decimals.ok_or(MetadataError::MissingField("decimals"))?;
        let fee_text = msg.fee.ok_or(MetadataError::MissingField("fee"))?;
        let fee = parse_nat(&fee_text).map_err(|_| MetadataError::MalformedFee {
            symbol: symbol.clone(),
            fee: fee_text.clone(),
        })?;
        TokenMetadata::new(
            symbol,
            msg.name.unwrap_or_default(),
            decimals,
            fee,
            msg.principal,
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct CreditMessage {
    pub token: String,
    pub available: String,
    pub locked: String,
}

impl TryFrom<CreditMessage> for Credit {
    type Error = ConversionError;

    fn try_from(msg: CreditMessage) -> Result<Self, Self::Error> {
        Ok(Credit {
            available: parse_nat(&msg.available)?,
            locked: parse_nat(&msg.locked)?,
            token: msg.token,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct OrderMessage {
    pub token: String,
    pub side: BookSide,
    pub volume: String,
    pub price: String,
}

impl TryFrom<OrderMessage> for RawOrder {
    type Error = ConversionError;

    fn try_from(msg: OrderMessage) -> Result<Self, Self::Error> {
        Ok(RawOrder {
            volume: parse_nat(&msg.volume)?,
            price: parse_decimal(&msg.price)?,
            side: msg.side.into(),
            token: msg.token,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricePointMessage {
    /// Nanoseconds since the epoch.
    pub timestamp: u64,
    pub session_number: u64,
    pub volume: String,
    pub price: String,
}

impl TryFrom<PricePointMessage> for PricePoint {
    type Error = ConversionError;

    fn try_from(msg: PricePointMessage) -> Result<Self, Self::Error> {
        Ok(PricePoint {
            timestamp: parse_timestamp(msg.timestamp)?,
            session_number: msg.session_number,
            volume: parse_nat(&msg.volume)?,
            price: parse_decimal(&msg.price)?,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMessage {
    pub timestamp: u64,
    pub session_number: u64,
    pub kind: BookSide,
    pub token: String,
    pub volume: String,
    pub price: String,
}

impl TryFrom<TransactionMessage> for TransactionRecord {
    type Error = ConversionError;

    fn try_from(msg: TransactionMessage) -> Result<Self, Self::Error> {
        Ok(TransactionRecord {
            timestamp: parse_timestamp(msg.timestamp)?,
            session_number: msg.session_number,
            side: msg.kind.into(),
            volume: parse_nat(&msg.volume)?,
            price: parse_decimal(&msg.price)?,
            token: msg.token,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsMessage {
    pub order_quote_volume_minimum: String,
    pub order_quote_volume_step: String,
    pub order_price_digits_limit: u32,
    pub orders_number_limit: u32,
}

impl TryFrom<SettingsMessage> for AuctionSettings {
    type Error = ConversionError;

    fn try_from(msg: SettingsMessage) -> Result<Self, Self::Error> {
        Ok(AuctionSettings {
            order_quote_volume_minimum: parse_nat(&msg.order_quote_volume_minimum)?,
            order_quote_volume_step: parse_nat(&msg.order_quote_volume_step)?,
            order_price_digits_limit: msg.order_price_digits_limit,
            orders_number_limit: msg.orders_number_limit,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct FundsMessage {
    pub amount: String,
    pub credit: String,
}

impl TryFrom<FundsMessage> for FundsReceipt {
    type Error = ConversionError;

    fn try_from(msg: FundsMessage) -> Result<Self, Self::Error> {
        Ok(FundsReceipt {
            amount: parse_nat(&msg.amount)?,
            credit: parse_nat(&msg.credit)?,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedMessage {
    pub order_id: u64,
}

// --- request bodies ---

#[derive(Debug, Serialize)]
pub struct OwnerQuery<'a> {
    pub owner: &'a str,
}

#[derive(Debug, Serialize)]
pub struct TokenQuery<'a> {
    pub owner: &'a str,
    pub token: &'a str,
}

#[derive(Debug, Serialize)]
pub struct HistoryQuery<'a> {
    pub owner: &'a str,
    pub token: &'a str,
    pub limit: usize,
    pub skip: usize,
}

#[derive(Debug, Serialize)]
pub struct FundsArgs<'a> {
    pub owner: &'a str,
    pub token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderArgs<'a> {
    pub owner: &'a str,
    pub token: &'a str,
    pub side: BookSide,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,
    pub price: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn unwraps_ok_variant_and_plain_values() {
        assert_eq!(unwrap_result(json!({"Ok": 5})).unwrap(), json!(5));
        assert_eq!(unwrap_result(json!([1, 2])).unwrap(), json!([1, 2]));
    }

    #[test]
    fn err_variant_becomes_remote_error() {
        let err = unwrap_result(json!({"Err": {"InsufficientCredit": null}})).unwrap_err();
        match err {
            ServiceError::Remote(e) => {
                assert_eq!(e.code, "InsufficientCredit");
                assert_eq!(e.detail, None);
            }
            other => panic!("unexpected {other:?}"),
        }
        let err = unwrap_result(json!({"Err": {"BadFee": {"expected_fee": "10"}}})).unwrap_err();
        assert!(matches!(err, ServiceError::Remote(ref e) if e.code == "BadFee" && e.detail.is_some()));
    }

    #[test]
    fn token_info_requires_decimals_and_fee() {
        let msg: TokenInfoMessage =
            serde_json::from_value(json!({"symbol": "BTC", "fee": "10"})).unwrap();
        assert_eq!(
            TokenMetadata::try_from(msg).unwrap_err(),
            MetadataError::MissingField("decimals")
        );
        let msg: TokenInfoMessage =
            serde_json::from_value(json!({"symbol": "BTC", "decimals": 8, "fee": "ten"})).unwrap();
        assert!(matches!(
            TokenMetadata::try_from(msg),
            Err(MetadataError::MalformedFee { .. })
        ));
        let msg: TokenInfoMessage = serde_json::from_value(
            json!({"symbol": "BTC", "name": "Bitcoin", "decimals": 8, "fee": "1_000"}),
        )
        .unwrap();
        assert_eq!(TokenMetadata::try_from(msg).unwrap().fee(), 1000);
    }

    #[test]
    fn price_point_parses_exponent_prices() {
        let msg: PricePointMessage = serde_json::from_value(json!({
            "timestamp": 1_700_000_000_000_000_000u64,
            "sessionNumber": 12,
            "volume": "150000000",
            "price": "2.5e-5"
        }))
        .unwrap();
        let point = PricePoint::try_from(msg).unwrap();
        assert_eq!(point.price, dec!(0.000025));
        assert_eq!(point.volume, 150_000_000);
        assert_eq!(point.timestamp.timestamp(), 1_700_000_000);
    }

    #[test]
    fn order_message_maps_book_side() {
        let msg: OrderMessage = serde_json::from_value(
            json!({"token": "BTC", "side": "ask", "volume": "5", "price": "0.1"}),
        )
        .unwrap();
        let order = RawOrder::try_from(msg).unwrap();
        assert_eq!(order.side, Side::Sell);
    }
}
