// src/error.rs
use thiserror::Error;

/// Failures of the fixed-point <-> decimal conversions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("not a number: {0:?}")]
    InvalidNumber(String),
    #[error("amount must not be negative: {0}")]
    Negative(String),
    #[error("decimal scale {0} is out of range")]
    ScaleOutOfRange(i64),
    #[error("arithmetic overflow while scaling {0}")]
    Overflow(String),
}

/// Token metadata that could not be turned into a usable `TokenMetadata`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    #[error("token metadata is missing field `{0}`")]
    MissingField(&'static str),
    #[error("token {symbol} declares {decimals} decimals, at most 28 are supported")]
    UnsupportedDecimals { symbol: String, decimals: u32 },
    #[error("token {symbol} has a malformed fee {fee:?}")]
    MalformedFee { symbol: String, fee: String },
}

/// A business error returned by the auction service as a result variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}{}", .detail.as_ref().map(|d| format!(" ({d})")).unwrap_or_default())]
pub struct RemoteError {
    pub code: String,
    pub detail: Option<String>,
}

impl RemoteError {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            detail: None,
        }
    }

    pub fn with_detail(code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            detail: Some(detail.into()),
        }
    }

    /// Human readable text for the error code. Unknown codes fall back to a generic message.
    pub fn user_message(&self) -> &'static str {
        match self.code.as_str() {
            "InsufficientCredit" | "InsufficientFunds" => "Insufficient funds",
            "BadFee" => "Fee has changed, please try again",
            "TooLowOrder" | "AmountBelowMinimum" => "Order amount is below the minimum",
            "TooLargeAmount" => "Amount is too large",
            "UnknownAsset" => "Unknown token",
            "UnknownPrincipal" => "Unknown account",
            "PriceDigitsOverflow" => "Price has too many significant digits",
            "VolumeStepViolated" => "Volume does not match the allowed step",
            "ConflictingOrder" => "Conflicts with one of your open orders",
            "OrderNotFound" => "Order not found",
            "NoCredit" => "Nothing to claim",
            "NotAvailable" => "Service is temporarily unavailable",
            "CallLedgerError" => "Ledger call failed",
            "SessionNumberMismatch" => "Auction session changed, please retry",
            _ => "Something went wrong",
        }
    }
}

/// Everything a call to the auction service can fail with.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("could not decode response: {0}")]
    Decode(String),
    #[error("service rejected the call: {0}")]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

impl ServiceError {
    /// Text suitable for a toast in the terminal.
    pub fn user_message(&self) -> String {
        match self {
            ServiceError::Remote(e) => e.user_message().to_string(),
            ServiceError::Transport(_) => "Network error, please try again".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ServiceError::Decode(e.to_string())
        } else {
            ServiceError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(e: serde_json::Error) -> Self {
        ServiceError::Decode(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("preferences io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("preferences file is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}
