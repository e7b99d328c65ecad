// src/core/store.rs
//! Application state: one slice per domain, mutated only through `Action`s.

use crate::types::{
    AuctionSettings, Credit, DataItem, Instrument, Order, Side, TokenDataItem, TokenMetadata,
};
use rust_decimal::Decimal;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    TokensLoaded {
        quote: TokenMetadata,
        tokens: Vec<TokenMetadata>,
    },
    CreditsLoaded(Vec<Credit>),
    WalletBalanceLoaded {
        token: String,
        amount: u128,
    },
    OrdersLoaded(Vec<Order>),
    OrderRemoved {
        base: String,
        side: Side,
        price: Decimal,
    },
    PriceHistoryLoaded(Vec<DataItem>),
    TransactionsLoaded(Vec<TokenDataItem>),
    SettingsLoaded(AuctionSettings),
    PairSelected(Instrument),
    EndpointSelected(String),
    LanguageSelected(String),
    /// Balances and open orders changed remotely and must be fetched again.
    Invalidate,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokensSlice {
    pub quote: Option<TokenMetadata>,
    pub tokens: Vec<TokenMetadata>,
}

impl TokensSlice {
    pub fn get(&self, symbol: &str) -> Option<&TokenMetadata> {
        self.tokens
            .iter()
            .chain(self.quote.iter())
            .find(|t| t.symbol() == symbol)
    }

    fn reduce(&mut self, action: &Action) {
        if let Action::TokensLoaded { quote, tokens } = action {
            self.quote = Some(quote.clone());
            self.tokens = tokens.clone();
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BalancesSlice {
    pub credits: Vec<Credit>,
    pub wallet: HashMap<String, u128>,
    pub stale: bool,
}

impl BalancesSlice {
    pub fn credit(&self, token: &str) -> Option<&Credit> {
        self.credits.iter().find(|c| c.token == token)
    }

    pub fn wallet(&self, token: &str) -> u128 {
        self.wallet.get(token).copied().unwrap_or(0)
    }

    fn reduce(&mut self, action: &Action) {
        match action {
            Action::CreditsLoaded(credits) => {
                self.credits = credits.clone();
                self.stale = false;
            }
            Action::WalletBalanceLoaded { token, amount } => {
                self.wallet.insert(token.clone(), *amount);
            }
            Action::Invalidate => self.stale = true,
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrdersSlice {
    pub open: Vec<Order>,
    pub stale: bool,
}

impl OrdersSlice {
    fn reduce(&mut self, action: &Action) {
        match action {
            Action::OrdersLoaded(orders) => {
                self.open = orders.clone();
                self.stale = false;
            }
            Action::OrderRemoved { base, side, price } => {
                self.open
                    .retain(|o| !(o.base == *base && o.side == *side && o.price == *price));
            }
            Action::Invalidate => self.stale = true,
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistorySlice {
    pub prices: Vec<DataItem>,
    pub transactions: Vec<TokenDataItem>,
}

impl HistorySlice {
    fn reduce(&mut self, action: &Action) {
        match action {
            Action::PriceHistoryLoaded(rows) => self.prices = rows.clone(),
            Action::TransactionsLoaded(rows) => self.transactions = rows.clone(),
            Action::PairSelected(_) => {
                self.prices.clear();
                self.transactions.clear();
            }
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSlice {
    pub instrument: Option<Instrument>,
    pub endpoint: String,
    pub language: String,
}

impl SessionSlice {
    fn reduce(&mut self, action: &Action) {
        match action {
            Action::PairSelected(instrument) => self.instrument = Some(instrument.clone()),
            Action::EndpointSelected(endpoint) => self.endpoint = endpoint.clone(),
            Action::LanguageSelected(language) => self.language = language.clone(),
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    pub tokens: TokensSlice,
    pub balances: BalancesSlice,
    pub orders: OrdersSlice,
    pub history: HistorySlice,
    pub settings: Option<AuctionSettings>,
    pub session: SessionSlice,
}

impl AppState {
    pub fn reduce(&mut self, action: Action) {
        self.tokens.reduce(&action);
        self.balances.reduce(&action);
        self.orders.reduce(&action);
        self.history.reduce(&action);
        self.session.reduce(&action);
        if let Action::SettingsLoaded(settings) = action {
            self.settings = Some(settings);
        }
    }

    /// Base and quote metadata of the selected pair, when both are known.
    pub fn pair_tokens(&self) -> Option<(&TokenMetadata, &TokenMetadata)> {
        let instrument = self.session.instrument.as_ref()?;
        let quote = self.tokens.quote.as_ref()?;
        if quote.symbol() != instrument.quote {
            return None;
        }
        Some((self.tokens.get(&instrument.base)?, quote))
    }

    /// Open orders of the selected pair.
    pub fn pair_orders(&self) -> Vec<&Order> {
        match &self.session.instrument {
            Some(i) => self
                .orders
                .open
                .iter()
                .filter(|o| o.base == i.base && o.quote == i.quote)
                .collect(),
            None => Vec::new(),
        }
    }
}
