// src/types.rs
use crate::error::MetadataError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest scale a `Decimal` can carry.
pub const MAX_DECIMALS: u32 = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Token description as published by the ledger. Only constructed through
/// [`TokenMetadata::new`], so `decimals` is always usable as a `Decimal` scale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenMetadata {
    symbol: String,
    name: String,
    decimals: u32,
    fee: u128,
    principal: Option<String>,
}

impl TokenMetadata {
    pub fn new(
        symbol: impl Into<String>,
        name: impl Into<String>,
        decimals: u32,
        fee: u128,
        principal: Option<String>,
    ) -> Result<Self, MetadataError> {
        let symbol = symbol.into();
        if symbol.trim().is_empty() {
            return Err(MetadataError::MissingField("symbol"));
        }
        if decimals > MAX_DECIMALS {
            return Err(MetadataError::UnsupportedDecimals { symbol, decimals });
        }
        let name = name.into();
        Ok(Self {
            name: if name.is_empty() { symbol.clone() } else { name },
            symbol,
            decimals,
            fee,
            principal,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn decimals(&self) -> u32 {
        self.decimals
    }

    /// Ledger transfer fee in smallest units.
    pub fn fee(&self) -> u128 {
        self.fee
    }

    pub fn principal(&self) -> Option<&str> {
        self.principal.as_deref()
    }
}

/// A tradable pair: the base token against the service's quote token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    pub base: String,
    pub quote: String,
}

impl Instrument {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
        }
    }

    /// Parses `BASE/QUOTE`.
    pub fn parse(pair: &str) -> Option<Self> {
        let (base, quote) = pair.split_once('/')?;
        let (base, quote) = (base.trim(), quote.trim());
        if base.is_empty() || quote.is_empty() {
            return None;
        }
        Some(Self::new(base.to_uppercase(), quote.to_uppercase()))
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// A resting order of the trader, price already in display units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub base: String,
    pub quote: String,
    pub side: Side,
    /// Smallest units of the base token.
    pub volume: u128,
    pub price: Decimal,
}

/// Raw order as the service reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawOrder {
    pub token: String,
    pub side: Side,
    pub volume: u128,
    pub price: Decimal,
}

/// Custodied balance of one token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credit {
    pub token: String,
    pub available: u128,
    pub locked: u128,
}

/// Limits the auction enforces on orders, in raw units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionSettings {
    pub order_quote_volume_minimum: u128,
    pub order_quote_volume_step: u128,
    pub order_price_digits_limit: u32,
    pub orders_number_limit: u32,
}

/// One clearing of the auction for a token.
#[derive(Debug, Clone, PartialEq)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub session_number: u64,
    pub volume: u128,
    pub price: Decimal,
}

/// A fill of one of the trader's orders.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub timestamp: DateTime<Utc>,
    pub session_number: u64,
    pub side: Side,
    pub token: String,
    pub volume: u128,
    pub price: Decimal,
}

/// Display row of the price history table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataItem {
    pub datetime: DateTime<Utc>,
    pub price: Decimal,
    pub volume: u128,
    pub volume_in_base: Decimal,
    pub volume_in_quote: Decimal,
    pub price_decimals: u32,
    pub volume_in_base_decimals: u32,
    pub volume_in_quote_decimals: u32,
}

/// Display row of the trader's transaction history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenDataItem {
    pub side: Side,
    pub symbol: String,
    pub item: DataItem,
}

/// Receipt of a funds operation; `amount` is what actually moved, in smallest units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundsReceipt {
    pub amount: u128,
    pub credit: u128,
}

// --- UI plumbing ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Info,
    Error,
}

#[derive(Debug, Clone)]
pub enum UiEvent {
    Snapshot(Box<crate::core::engine::TerminalSnapshot>),
    Toast(ToastLevel, String),
    Log(String),
}
