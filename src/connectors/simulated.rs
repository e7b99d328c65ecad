// src/connectors/simulated.rs
//! In-memory auction for paper mode. Enforces the same business rules the
//! remote service reports through result variants, but never clears orders.

use crate::connectors::traits::{AuctionService, ServiceResult};
use crate::error::{MetadataError, RemoteError, ServiceError};
use crate::types::{
    AuctionSettings, Credit, FundsReceipt, PricePoint, RawOrder, Side, TokenMetadata,
    TransactionRecord,
};
use crate::utils::conversion::decimal_to_nat;
use crate::utils::precision::significant_digits;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::info;

#[derive(Debug, Default)]
struct Account {
    wallet: u128,
    available: u128,
    locked: u128,
    /// Transfers to the deposit account the auction has not credited yet.
    unclaimed: u128,
}

#[derive(Debug)]
struct SimOrder {
    id: u64,
    token: String,
    side: Side,
    volume: u128,
    price: Decimal,
    /// Credit locked for the order, in `locked_token` units.
    locked: u128,
    locked_token: String,
}

#[derive(Debug)]
struct SimState {
    accounts: HashMap<String, Account>,
    orders: Vec<SimOrder>,
    next_order_id: u64,
}

pub struct SimulatedAuction {
    quote: TokenMetadata,
    tokens: Vec<TokenMetadata>,
    settings: AuctionSettings,
    history: HashMap<String, Vec<PricePoint>>,
    transactions: Vec<TransactionRecord>,
    state: Mutex<SimState>,
}

fn remote(code: &str) -> ServiceError {
    ServiceError::Remote(RemoteError::new(code))
}

impl SimulatedAuction {
    pub fn new(
        quote: TokenMetadata,
        tokens: Vec<TokenMetadata>,
        settings: AuctionSettings,
    ) -> Self {
        Self {
            quote,
            tokens,
            settings,
            history: HashMap::new(),
            transactions: Vec::new(),
            state: Mutex::new(SimState {
                accounts: HashMap::new(),
                orders: Vec::new(),
                next_order_id: 1,
            }),
        }
    }

    /// USDC quote with BTC and ICP bases, funded wallets and a short price history.
    pub fn demo() -> Result<Self, MetadataError> {
        let mut sim = Self::new(
            TokenMetadata::new("USDC", "USD Coin", 6, 10_000, None)?,
            vec![
                TokenMetadata::new("BTC", "Bitcoin", 8, 10, None)?,
                TokenMetadata::new("ICP", "Internet Computer", 8, 10_000, None)?,
            ],
            AuctionSettings {
                order_quote_volume_minimum: 5_000_000,
                order_quote_volume_step: 10_000,
                order_price_digits_limit: 5,
                orders_number_limit: 100,
            },
        );
        sim = sim
            .with_wallet("USDC", 10_000_000_000)
            .with_wallet("BTC", 100_000_000)
            .with_wallet("ICP", 50_000_000_000);
        let now = Utc::now();
        let btc = (0..24)
            .map(|i| PricePoint {
                timestamp: now - Duration::minutes(2 * i),
                session_number: 1_000 - i as u64,
                volume: 1_000_000 + 250_000 * (i as u128 % 5),
                price: Decimal::new(65_000 + 7 * (i % 9), 2),
            })
            .collect();
        let icp = (0..24)
            .map(|i| PricePoint {
                timestamp: now - Duration::minutes(2 * i),
                session_number: 1_000 - i as u64,
                volume: 3_000_000_000 + 100_000_000 * (i as u128 % 3),
                price: Decimal::new(1_210 - 3 * (i % 7), 4),
            })
            .collect();
        sim.history.insert("BTC".to_string(), btc);
        sim.history.insert("ICP".to_string(), icp);
        Ok(sim)
    }

    pub fn with_wallet(mut self, token: &str, amount: u128) -> Self {
        self.state
            .get_mut()
            .accounts
            .entry(token.to_string())
            .or_default()
            .wallet = amount;
        self
    }

    pub fn with_history(mut self, token: &str, points: Vec<PricePoint>) -> Self {
        self.history.insert(token.to_string(), points);
        self
    }

    pub fn with_transactions(mut self, records: Vec<TransactionRecord>) -> Self {
        self.transactions = records;
        self
    }

    /// Simulates an incoming ledger transfer that still has to be claimed.
    pub async fn receive_transfer(&self, token: &str, amount: u128) {
        let mut state = self.state.lock().await;
        state.accounts.entry(token.to_string()).or_default().unclaimed += amount;
    }

    fn token(&self, symbol: &str) -> ServiceResult<&TokenMetadata> {
        self.tokens
            .iter()
            .chain(std::iter::once(&self.quote))
            .find(|t| t.symbol() == symbol)
            .ok_or_else(|| remote("UnknownAsset"))
    }

    fn receipt(account: &Account, amount: u128) -> FundsReceipt {
        FundsReceipt {
            amount,
            credit: account.available,
        }
    }
}

#[async_trait]
impl AuctionService for SimulatedAuction {
    async fn quote_token(&self) -> ServiceResult<TokenMetadata> {
        Ok(self.quote.clone())
    }

    async fn tokens(&self) -> ServiceResult<Vec<TokenMetadata>> {
        Ok(self.tokens.clone())
    }

    async fn settings(&self) -> ServiceResult<AuctionSettings> {
        Ok(self.settings.clone())
    }

    async fn credits(&self) -> ServiceResult<Vec<Credit>> {
        let state = self.state.lock().await;
        let mut credits: Vec<Credit> = state
            .accounts
            .iter()
            .filter(|(_, a)| a.available > 0 || a.locked > 0)
            .map(|(token, a)| Credit {
                token: token.clone(),
                available: a.available,
                locked: a.locked,
            })
            .collect();
        credits.sort_by(|a, b| a.token.cmp(&b.token));
        Ok(credits)
    }

    async fn wallet_balance(&self, token: &str) -> ServiceResult<u128> {
        self.token(token)?;
        let state = self.state.lock().await;
        Ok(state.accounts.get(token).map(|a| a.wallet).unwrap_or(0))
    }

    async fn deposit(&self, token: &str, amount: u128) -> ServiceResult<FundsReceipt> {
        let fee = self.token(token)?.fee();
        let mut state = self.state.lock().await;
        let account = state.accounts.entry(token.to_string()).or_default();
        if amount > account.wallet {
            return Err(remote("InsufficientFunds"));
        }
        if amount <= fee {
            return Err(remote("TooLowOrder"));
        }
        account.wallet -= amount;
        account.available += amount - fee;
        info!("[sim] deposited {} {}", amount - fee, token);
        Ok(Self::receipt(account, amount - fee))
    }

    async fn notify(&self, token: &str) -> ServiceResult<FundsReceipt> {
        self.token(token)?;
        let mut state = self.state.lock().await;
        let account = state.accounts.entry(token.to_string()).or_default();
        if account.unclaimed == 0 {
            return Err(remote("NoCredit"));
        }
        let amount = std::mem::take(&mut account.unclaimed);
        account.available += amount;
        Ok(Self::receipt(account, amount))
    }

    async fn withdraw(&self, token: &str, amount: u128) -> ServiceResult<FundsReceipt> {
        let fee = self.token(token)?.fee();
        let mut state = self.state.lock().await;
        let account = state.accounts.entry(token.to_string()).or_default();
        if amount > account.available {
            return Err(remote("InsufficientCredit"));
        }
        if amount <= fee {
            return Err(remote("AmountBelowMinimum"));
        }
        account.available -= amount;
        account.wallet += amount - fee;
        Ok(Self::receipt(account, amount - fee))
    }

    async fn place_order(
        &self,
        token: &str,
        side: Side,
        volume: u128,
        price: Decimal,
    ) -> ServiceResult<u64> {
        self.token(token)?;
        if token == self.quote.symbol() {
            return Err(remote("UnknownAsset"));
        }
        if volume == 0 || price <= Decimal::ZERO {
            return Err(remote("TooLowOrder"));
        }
        if significant_digits(price) > self.settings.order_price_digits_limit {
            return Err(remote("PriceDigitsOverflow"));
        }
        let notional_exact = i128::try_from(volume)
            .ok()
            .and_then(|v| Decimal::try_from_i128_with_scale(v, 0).ok())
            .and_then(|v| v.checked_mul(price))
            .ok_or_else(|| remote("TooLargeAmount"))?;
        let notional = decimal_to_nat(notional_exact.ceil())?;
        if notional < self.settings.order_quote_volume_minimum {
            return Err(remote("TooLowOrder"));
        }
        let step = self.settings.order_quote_volume_step;
        if step > 0 && (!notional_exact.fract().is_zero() || notional % step != 0) {
            return Err(remote("VolumeStepViolated"));
        }

        let mut state = self.state.lock().await;
        if state.orders.len() >= self.settings.orders_number_limit as usize {
            return Err(remote("TooManyOrders"));
        }
        if state
            .orders
            .iter()
            .any(|o| o.token == token && o.side == side && o.price == price)
        {
            return Err(remote("ConflictingOrder"));
        }
        let (locked_token, locked) = match side {
            Side::Buy => (self.quote.symbol().to_string(), notional),
            Side::Sell => (token.to_string(), volume),
        };
        let account = state.accounts.entry(locked_token.clone()).or_default();
        if account.available < locked {
            return Err(remote("InsufficientCredit"));
        }
        account.available -= locked;
        account.locked += locked;

        let id = state.next_order_id;
        state.next_order_id += 1;
        state.orders.push(SimOrder {
            id,
            token: token.to_string(),
            side,
            volume,
            price,
            locked,
            locked_token,
        });
        info!("[sim] order #{} {} {} {} @ {}", id, side, volume, token, price);
        Ok(id)
    }

    async fn cancel_order(&self, token: &str, side: Side, price: Decimal) -> ServiceResult<()> {
        let mut state = self.state.lock().await;
        let index = state
            .orders
            .iter()
            .position(|o| o.token == token && o.side == side && o.price == price)
            .ok_or_else(|| remote("OrderNotFound"))?;
        let order = state.orders.remove(index);
        let account = state.accounts.entry(order.locked_token.clone()).or_default();
        account.locked -= order.locked;
        account.available += order.locked;
        info!("[sim] cancelled order #{}", order.id);
        Ok(())
    }

    async fn open_orders(&self) -> ServiceResult<Vec<RawOrder>> {
        let state = self.state.lock().await;
        Ok(state
            .orders
            .iter()
            .map(|o| RawOrder {
                token: o.token.clone(),
                side: o.side,
                volume: o.volume,
                price: o.price,
            })
            .collect())
    }

    async fn price_history(&self, token: &str, limit: usize) -> ServiceResult<Vec<PricePoint>> {
        self.token(token)?;
        Ok(self
            .history
            .get(token)
            .map(|points| points.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn transaction_history(
        &self,
        token: &str,
        limit: usize,
    ) -> ServiceResult<Vec<TransactionRecord>> {
        Ok(self
            .transactions
            .iter()
            .filter(|t| t.token == token)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    async fn funded() -> SimulatedAuction {
        let sim = SimulatedAuction::demo().unwrap();
        sim.deposit("USDC", 1_000_000_000).await.unwrap();
        sim.deposit("BTC", 50_000_000).await.unwrap();
        sim
    }

    fn remote_code(err: ServiceError) -> String {
        match err {
            ServiceError::Remote(e) => e.code,
            other => panic!("expected remote error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn demo_tokens_are_validated_metadata() {
        let sim = SimulatedAuction::demo().unwrap();
        let mut listed = sim.tokens().await.unwrap();
        listed.push(sim.quote_token().await.unwrap());
        assert_eq!(listed.len(), 3);
        for token in listed {
            let rebuilt = TokenMetadata::new(
                token.symbol(),
                token.name(),
                token.decimals(),
                token.fee(),
                token.principal().map(str::to_string),
            )
            .unwrap();
            assert_eq!(rebuilt, token);
        }
    }

    #[tokio::test]
    async fn deposit_moves_wallet_to_credit_minus_fee() {
        let sim = SimulatedAuction::demo().unwrap();
        let receipt = sim.deposit("USDC", 20_000_000).await.unwrap();
        assert_eq!(receipt.amount, 19_990_000);
        assert_eq!(sim.wallet_balance("USDC").await.unwrap(), 9_980_000_000);
        let credits = sim.credits().await.unwrap();
        assert_eq!(credits[0].available, 19_990_000);
    }

    #[tokio::test]
    async fn bid_locks_quote_and_cancel_releases_it() {
        let sim = funded().await;
        // 0.1 BTC at 0.65 usdc-units per sat = 6.5 USDC notional
        sim.place_order("BTC", Side::Buy, 10_000_000, dec!(0.65)).await.unwrap();
        let usdc = sim.credits().await.unwrap().into_iter().find(|c| c.token == "USDC").unwrap();
        assert_eq!(usdc.locked, 6_500_000);
        sim.cancel_order("BTC", Side::Buy, dec!(0.65)).await.unwrap();
        let usdc = sim.credits().await.unwrap().into_iter().find(|c| c.token == "USDC").unwrap();
        assert_eq!(usdc.locked, 0);
        assert!(sim.open_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn business_rules_map_to_error_codes() {
        let sim = funded().await;
        assert_eq!(
            remote_code(sim.place_order("BTC", Side::Buy, 1_000, dec!(0.65)).await.unwrap_err()),
            "TooLowOrder"
        );
        assert_eq!(
            remote_code(sim.place_order("BTC", Side::Buy, 10_000_000, dec!(0.654321)).await.unwrap_err()),
            "PriceDigitsOverflow"
        );
        assert_eq!(
            remote_code(sim.place_order("DOGE", Side::Buy, 1, dec!(1)).await.unwrap_err()),
            "UnknownAsset"
        );
        sim.place_order("BTC", Side::Sell, 10_000_000, dec!(0.7)).await.unwrap();
        assert_eq!(
            remote_code(sim.place_order("BTC", Side::Sell, 10_000_000, dec!(0.7)).await.unwrap_err()),
            "ConflictingOrder"
        );
        assert_eq!(
            remote_code(sim.withdraw("BTC", 1_000_000_000).await.unwrap_err()),
            "InsufficientCredit"
        );
    }

    #[tokio::test]
    async fn claim_credits_pending_transfers_once() {
        let sim = SimulatedAuction::demo().unwrap();
        sim.receive_transfer("ICP", 300_000_000).await;
        assert_eq!(sim.notify("ICP").await.unwrap().amount, 300_000_000);
        assert_eq!(remote_code(sim.notify("ICP").await.unwrap_err()), "NoCredit");
    }
}
