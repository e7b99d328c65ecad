// src/core/funds.rs
//! Deposit / withdraw / claim flow of the funds panel.

use crate::error::ConversionError;
use crate::types::{Credit, TokenMetadata};
use crate::utils::conversion::to_raw_volume;
use crate::utils::precision::parse_decimal;
use std::fmt;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FundsOperation {
    /// Move tokens from the wallet into auction credit.
    Deposit,
    /// Move available credit back to the wallet.
    Withdraw,
    /// Ask the service to pick up transfers it has not credited yet.
    Claim,
}

impl fmt::Display for FundsOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FundsOperation::Deposit => write!(f, "Deposit"),
            FundsOperation::Withdraw => write!(f, "Withdraw"),
            FundsOperation::Claim => write!(f, "Claim"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FundsState {
    Idle,
    Pending(FundsOperation),
    Completed { op: FundsOperation, amount: u128 },
    Failed { op: FundsOperation, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FundsError {
    #[error("amount {0:?} is not a number")]
    InvalidAmount(String),
    #[error("amount must cover the ledger fee of {fee}")]
    BelowFee { fee: u128 },
    #[error("amount exceeds the available {available}")]
    Exceeds { available: u128 },
    #[error("another funds operation is still pending")]
    Busy,
    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

/// A checked request, amounts in smallest units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundsRequest {
    pub op: FundsOperation,
    pub token: String,
    pub amount: Option<u128>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundsFlow {
    pub state: FundsState,
}

impl Default for FundsFlow {
    fn default() -> Self {
        Self {
            state: FundsState::Idle,
        }
    }
}

impl FundsFlow {
    pub fn is_pending(&self) -> bool {
        matches!(self.state, FundsState::Pending(_))
    }

    /// Validates the request against balances and moves to `Pending`.
    pub fn begin(
        &mut self,
        op: FundsOperation,
        token: &TokenMetadata,
        amount_input: Option<&str>,
        wallet_balance: u128,
        credit: Option<&Credit>,
    ) -> Result<FundsRequest, FundsError> {
        if self.is_pending() {
            return Err(FundsError::Busy);
        }
        let amount = match op {
            FundsOperation::Claim => None,
            FundsOperation::Deposit | FundsOperation::Withdraw => {
                let text = amount_input.unwrap_or_default();
                let value = parse_decimal(text)
                    .map_err(|_| FundsError::InvalidAmount(text.to_string()))?;
                let raw = to_raw_volume(value, token.decimals())?;
                if raw <= token.fee() {
                    return Err(FundsError::BelowFee { fee: token.fee() });
                }
                let available = match op {
                    FundsOperation::Deposit => wallet_balance,
                    _ => credit.map(|c| c.available).unwrap_or(0),
                };
                if raw > available {
                    return Err(FundsError::Exceeds { available });
                }
                Some(raw)
            }
        };
        self.state = FundsState::Pending(op);
        Ok(FundsRequest {
            op,
            token: token.symbol().to_string(),
            amount,
        })
    }

    pub fn complete(&mut self, op: FundsOperation, result: Result<u128, String>) {
        if self.state != FundsState::Pending(op) {
            warn!("{} finished while funds flow is {:?}", op, self.state);
            return;
        }
        self.state = match result {
            Ok(amount) => FundsState::Completed { op, amount },
            Err(message) => FundsState::Failed { op, message },
        };
    }

    pub fn acknowledge(&mut self) {
        if !self.is_pending() {
            self.state = FundsState::Idle;
        }
    }
}
