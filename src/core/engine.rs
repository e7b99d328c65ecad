// src/core/engine.rs
use crate::connectors::traits::AuctionService;
use crate::core::funds::{FundsFlow, FundsOperation};
use crate::core::history::{price_rows, transaction_rows};
use crate::core::order_form::{FormEvent, OrderContext, OrderForm};
use crate::core::requests::{RequestKind, RequestTracker, Ticket};
use crate::core::store::{Action, AppState, TokensSlice};
use crate::error::{ConversionError, ServiceError};
use crate::storage::{PreferenceStore, KEY_ENDPOINT, KEY_LANGUAGE, KEY_PAIR};
use crate::types::{FundsReceipt, Instrument, Order, RawOrder, Side, ToastLevel, UiEvent};
use crate::utils::conversion::{to_display_price, to_raw_price};
use crate::utils::precision::ExtraDigits;
use anyhow::Result;
use rust_decimal::Decimal;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Requests from the terminal UI.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Refresh,
    SelectPair(Instrument),
    Form(FormEvent),
    /// Cancel one of the trader's orders on the selected pair, display price.
    CancelOrder { side: Side, price: Decimal },
    Funds {
        op: FundsOperation,
        token: String,
        amount: Option<String>,
    },
    AcknowledgeFunds,
    SetLanguage(String),
    SetEndpoint(String),
    Shutdown,
}

/// Everything the UI draws, cloned out of the engine after each step.
#[derive(Debug, Clone, Default)]
pub struct TerminalSnapshot {
    pub state: AppState,
    pub form: OrderForm,
    pub funds: FundsFlow,
    pub in_flight: usize,
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub history_limit: usize,
    pub extra_digits: ExtraDigits,
    pub refresh_interval: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            history_limit: 200,
            extra_digits: ExtraDigits::default(),
            refresh_interval: Duration::from_secs(15),
        }
    }
}

enum Completion {
    Fetched {
        ticket: Ticket,
        result: Result<Vec<Action>, ServiceError>,
    },
    OrderPlaced {
        request_id: Uuid,
        result: Result<u64, ServiceError>,
    },
    OrderCancelled {
        base: String,
        side: Side,
        price: Decimal,
        result: Result<(), ServiceError>,
    },
    Funds {
        op: FundsOperation,
        result: Result<FundsReceipt, ServiceError>,
    },
}

/// Converts the service's raw orders into display orders. Orders on tokens
/// without metadata are skipped.
pub fn display_orders(raw: &[RawOrder], tokens: &TokensSlice) -> Result<Vec<Order>, ConversionError> {
    let Some(quote) = tokens.quote.as_ref() else {
        return Ok(Vec::new());
    };
    let mut orders = Vec::with_capacity(raw.len());
    for o in raw {
        let Some(base) = tokens.get(&o.token) else {
            warn!("Open order on unknown token {}", o.token);
            continue;
        };
        orders.push(Order {
            base: base.symbol().to_string(),
            quote: quote.symbol().to_string(),
            side: o.side,
            volume: o.volume,
            price: to_display_price(o.price, base.decimals(), quote.decimals())?,
        });
    }
    orders.sort_by(|a, b| (&a.base, b.price).cmp(&(&b.base, a.price)));
    Ok(orders)
}

/// Owns the application state. UI commands come in, service calls run as
/// tasks of a `JoinSet`, their results are reduced into the store.
pub struct TerminalEngine {
    service: Arc<dyn AuctionService>,
    state: AppState,
    form: OrderForm,
    funds: FundsFlow,
    requests: RequestTracker,
    tasks: JoinSet<Completion>,
    command_rx: mpsc::Receiver<Command>,
    ui_sender: mpsc::Sender<UiEvent>,
    preferences: Option<PreferenceStore>,
    options: EngineOptions,
}

impl TerminalEngine {
    pub fn new(
        service: Arc<dyn AuctionService>,
        command_rx: mpsc::Receiver<Command>,
        ui_sender: mpsc::Sender<UiEvent>,
        options: EngineOptions,
    ) -> Self {
        Self {
            service,
            state: AppState::default(),
            form: OrderForm::default(),
            funds: FundsFlow::default(),
            requests: RequestTracker::default(),
            tasks: JoinSet::new(),
            command_rx,
            ui_sender,
            preferences: None,
            options,
        }
    }

    /// Restores endpoint, language and pair from stored preferences.
    pub fn with_preferences(mut self, preferences: PreferenceStore) -> Self {
        if let Some(endpoint) = preferences.get(KEY_ENDPOINT) {
            self.state.reduce(Action::EndpointSelected(endpoint.to_string()));
        }
        if let Some(language) = preferences.get(KEY_LANGUAGE) {
            self.state.reduce(Action::LanguageSelected(language.to_string()));
        }
        if let Some(pair) = preferences.get(KEY_PAIR).and_then(Instrument::parse) {
            self.state.reduce(Action::PairSelected(pair));
        }
        self.preferences = Some(preferences);
        self
    }

    /// Applies an action before the engine starts, e.g. the configured defaults.
    pub fn with_action(mut self, action: Action) -> Self {
        self.state.reduce(action);
        self
    }

    pub fn snapshot(&self) -> TerminalSnapshot {
        TerminalSnapshot {
            state: self.state.clone(),
            form: self.form.clone(),
            funds: self.funds.clone(),
            in_flight: self.tasks.len(),
        }
    }

    fn send_ui_event(&self, event: UiEvent) {
        match self.ui_sender.try_send(event) {
            Ok(_) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {}
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!("UI Channel closed! Interface is likely dead.");
            }
        }
    }

    fn publish(&self) {
        self.send_ui_event(UiEvent::Snapshot(Box::new(self.snapshot())));
    }

    fn log(&self, message: String) {
        info!("{}", message);
        self.send_ui_event(UiEvent::Log(message));
    }

    fn toast(&self, level: ToastLevel, message: impl Into<String>) {
        self.send_ui_event(UiEvent::Toast(level, message.into()));
    }

    pub async fn run(&mut self) -> Result<()> {
        info!("Engine starting...");
        self.start();
        self.publish();

        let period = self.options.refresh_interval.max(Duration::from_secs(1));
        let mut refresh = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => match cmd {
                    None | Some(Command::Shutdown) => break,
                    Some(cmd) => self.handle_command(cmd).await,
                },
                Some(joined) = self.tasks.join_next() => self.on_joined(joined),
                _ = refresh.tick() => self.refresh(),
            }
            self.publish();
        }

        if !self.tasks.is_empty() {
            info!("Aborting {} in-flight calls", self.tasks.len());
        }
        self.tasks.shutdown().await;
        info!("Engine stopped");
        Ok(())
    }

    /// Initial fetches; pair specific data follows once token metadata arrives.
    pub fn start(&mut self) {
        self.fetch(RequestKind::Tokens);
        self.fetch(RequestKind::Settings);
        self.fetch(RequestKind::Credits);
    }

    /// Waits for every in-flight call, including the ones their results trigger.
    pub async fn settle(&mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            self.on_joined(joined);
        }
    }

    pub fn refresh(&mut self) {
        if self.state.tokens.quote.is_none() {
            self.fetch(RequestKind::Tokens);
            return;
        }
        for kind in [
            RequestKind::Credits,
            RequestKind::OpenOrders,
            RequestKind::WalletBalance,
            RequestKind::PriceHistory,
            RequestKind::Transactions,
        ] {
            self.fetch(kind);
        }
    }

    fn spawn_ticketed<F>(&mut self, kind: RequestKind, call: F)
    where
        F: Future<Output = Result<Vec<Action>, ServiceError>> + Send + 'static,
    {
        let ticket = self.requests.issue(kind);
        debug!("Fetching {:?} (#{})", kind, ticket.seq);
        self.tasks.spawn(async move {
            Completion::Fetched {
                ticket,
                result: call.await,
            }
        });
    }

    fn fetch(&mut self, kind: RequestKind) {
        let service = self.service.clone();
        match kind {
            RequestKind::Tokens => self.spawn_ticketed(kind, async move {
                let (quote, tokens) =
                    futures::future::try_join(service.quote_token(), service.tokens()).await?;
                Ok::<_, ServiceError>(vec![Action::TokensLoaded { quote, tokens }])
            }),
            RequestKind::Settings => self.spawn_ticketed(kind, async move {
                Ok::<_, ServiceError>(vec![Action::SettingsLoaded(service.settings().await?)])
            }),
            RequestKind::Credits => self.spawn_ticketed(kind, async move {
                Ok::<_, ServiceError>(vec![Action::CreditsLoaded(service.credits().await?)])
            }),
            RequestKind::OpenOrders => {
                let tokens = self.state.tokens.clone();
                self.spawn_ticketed(kind, async move {
                    let raw = service.open_orders().await?;
                    Ok::<_, ServiceError>(vec![Action::OrdersLoaded(display_orders(&raw, &tokens)?)])
                })
            }
            RequestKind::WalletBalance | RequestKind::PriceHistory | RequestKind::Transactions => {
                let Some((base, quote)) = self.state.pair_tokens() else {
                    debug!("Skipping {:?}: no pair with known tokens selected", kind);
                    return;
                };
                let (base, quote) = (base.clone(), quote.clone());
                let limit = self.options.history_limit;
                let extra = self.options.extra_digits;
                match kind {
                    RequestKind::WalletBalance => self.spawn_ticketed(kind, async move {
                        let (base_amount, quote_amount) = futures::future::try_join(
                            service.wallet_balance(base.symbol()),
                            service.wallet_balance(quote.symbol()),
                        )
                        .await?;
                        Ok::<_, ServiceError>(vec![
                            Action::WalletBalanceLoaded {
                                token: base.symbol().to_string(),
                                amount: base_amount,
                            },
                            Action::WalletBalanceLoaded {
                                token: quote.symbol().to_string(),
                                amount: quote_amount,
                            },
                        ])
                    }),
                    RequestKind::PriceHistory => self.spawn_ticketed(kind, async move {
                        let points = service.price_history(base.symbol(), limit).await?;
                        Ok::<_, ServiceError>(vec![Action::PriceHistoryLoaded(price_rows(
                            &points, &base, &quote, extra,
                        )?)])
                    }),
                    _ => self.spawn_ticketed(kind, async move {
                        let records = service.transaction_history(base.symbol(), limit).await?;
                        Ok::<_, ServiceError>(vec![Action::TransactionsLoaded(transaction_rows(
                            &records, &base, &quote, extra,
                        )?)])
                    }),
                }
            }
        }
    }

    /// Empty or zero values a failed fetch leaves behind.
    fn fallback(&self, kind: RequestKind) -> Vec<Action> {
        match kind {
            RequestKind::Tokens | RequestKind::Settings => Vec::new(),
            RequestKind::Credits => vec![Action::CreditsLoaded(Vec::new())],
            RequestKind::OpenOrders => vec![Action::OrdersLoaded(Vec::new())],
            RequestKind::PriceHistory => vec![Action::PriceHistoryLoaded(Vec::new())],
            RequestKind::Transactions => vec![Action::TransactionsLoaded(Vec::new())],
            RequestKind::WalletBalance => match self.state.pair_tokens() {
                Some((base, quote)) => [base, quote]
                    .iter()
                    .map(|t| Action::WalletBalanceLoaded {
                        token: t.symbol().to_string(),
                        amount: 0,
                    })
                    .collect(),
                None => Vec::new(),
            },
        }
    }

    fn dispatch(&mut self, action: Action) {
        let tokens_loaded = matches!(action, Action::TokensLoaded { .. });
        let invalidated = matches!(action, Action::Invalidate);
        self.state.reduce(action);

        if tokens_loaded {
            self.fetch(RequestKind::OpenOrders);
            self.fetch(RequestKind::WalletBalance);
            self.fetch(RequestKind::PriceHistory);
            self.fetch(RequestKind::Transactions);
        }
        // a call already in flight may have read the state before the mutation,
        // so always reissue; its late answer loses to the newer ticket
        if invalidated {
            self.fetch(RequestKind::Credits);
            self.fetch(RequestKind::WalletBalance);
            self.fetch(RequestKind::OpenOrders);
        }
    }

    fn on_joined(&mut self, joined: Result<Completion, JoinError>) {
        match joined {
            Ok(completion) => self.on_completion(completion),
            Err(e) if e.is_cancelled() => debug!("Service call cancelled"),
            Err(e) => error!("Service call panicked: {}", e),
        }
    }

    fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Fetched { ticket, result } => {
                if !self.requests.settle(&ticket) {
                    debug!("Dropping stale {:?} response (#{})", ticket.kind, ticket.seq);
                    return;
                }
                match result {
                    Ok(actions) => {
                        for action in actions {
                            self.dispatch(action);
                        }
                    }
                    Err(e) => {
                        error!("Fetching {:?} failed: {}", ticket.kind, e);
                        self.toast(ToastLevel::Error, e.user_message());
                        for action in self.fallback(ticket.kind) {
                            self.dispatch(action);
                        }
                    }
                }
            }
            Completion::OrderPlaced { request_id, result } => match result {
                Ok(id) => {
                    self.log(format!("Order #{id} placed"));
                    debug!(%request_id, "order accepted");
                    self.form
                        .handle(FormEvent::Completed(format!("Order #{id} placed")));
                    self.dispatch(Action::Invalidate);
                }
                Err(e) => {
                    error!(%request_id, "Placing order failed: {}", e);
                    self.form.handle(FormEvent::Failed(e.user_message()));
                    self.toast(ToastLevel::Error, e.user_message());
                }
            },
            Completion::OrderCancelled {
                base,
                side,
                price,
                result,
            } => match result {
                Ok(()) => {
                    self.log(format!("Cancelled {side} {base} @ {price}"));
                    self.dispatch(Action::OrderRemoved { base, side, price });
                    self.dispatch(Action::Invalidate);
                }
                Err(e) => {
                    error!("Cancel failed: {}", e);
                    self.toast(ToastLevel::Error, e.user_message());
                }
            },
            Completion::Funds { op, result } => match result {
                Ok(receipt) => {
                    self.log(format!("{op} done: {} moved", receipt.amount));
                    self.funds.complete(op, Ok(receipt.amount));
                    self.dispatch(Action::Invalidate);
                }
                Err(e) => {
                    error!("{} failed: {}", op, e);
                    self.funds.complete(op, Err(e.user_message()));
                    self.toast(ToastLevel::Error, e.user_message());
                }
            },
        }
    }

    async fn remember(&mut self, key: &str, value: &str) {
        if let Some(prefs) = self.preferences.as_mut() {
            if let Err(e) = prefs.set(key, value).await {
                error!("Failed to save preference {}: {}", key, e);
            }
        }
    }

    pub async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Refresh => self.refresh(),
            Command::SelectPair(instrument) => {
                info!("Selected pair {}", instrument);
                let pair = instrument.to_string();
                self.form = OrderForm::default();
                self.dispatch(Action::PairSelected(instrument));
                self.remember(KEY_PAIR, &pair).await;
                self.fetch(RequestKind::WalletBalance);
                self.fetch(RequestKind::PriceHistory);
                self.fetch(RequestKind::Transactions);
            }
            Command::Form(FormEvent::Submit) => self.submit_order(),
            Command::Form(
                event @ (FormEvent::SetSide(_)
                | FormEvent::EditPrice(_)
                | FormEvent::EditVolume(_)
                | FormEvent::Acknowledge),
            ) => {
                self.form.handle(event);
            }
            Command::Form(event) => warn!("UI may not send {:?}", event),
            Command::CancelOrder { side, price } => self.cancel_order(side, price),
            Command::Funds { op, token, amount } => self.begin_funds(op, &token, amount.as_deref()),
            Command::AcknowledgeFunds => self.funds.acknowledge(),
            Command::SetLanguage(language) => {
                self.dispatch(Action::LanguageSelected(language.clone()));
                self.remember(KEY_LANGUAGE, &language).await;
            }
            Command::SetEndpoint(endpoint) => {
                self.dispatch(Action::EndpointSelected(endpoint.clone()));
                self.remember(KEY_ENDPOINT, &endpoint).await;
                self.toast(ToastLevel::Info, "Endpoint saved, restart to connect");
            }
            Command::Shutdown => {}
        }
    }

    fn submit_order(&mut self) {
        if !self.form.handle(FormEvent::Submit) {
            return;
        }
        let prepared = match self.state.pair_tokens() {
            None => Err("Token metadata is not loaded yet".to_string()),
            Some((base, quote)) => {
                let open: Vec<Order> = self.state.pair_orders().into_iter().cloned().collect();
                let ctx = OrderContext {
                    base,
                    quote,
                    open_orders: &open,
                    settings: self.state.settings.as_ref(),
                };
                self.form.prepare(&ctx).map_err(|e| e.to_string())
            }
        };
        let order = match prepared {
            Ok(order) => order,
            Err(message) => {
                info!("Order rejected before submission: {}", message);
                self.form.handle(FormEvent::Rejected(message));
                return;
            }
        };
        self.form.handle(FormEvent::Validated(order.clone()));

        let request_id = Uuid::new_v4();
        info!(
            %request_id,
            "Placing {} {} {} @ {} (raw {} @ {})",
            order.side, order.volume, order.base, order.price, order.raw_volume, order.raw_price
        );
        let service = self.service.clone();
        self.tasks.spawn(async move {
            let result = service
                .place_order(&order.base, order.side, order.raw_volume, order.raw_price)
                .await;
            Completion::OrderPlaced { request_id, result }
        });
    }

    fn cancel_order(&mut self, side: Side, price: Decimal) {
        let Some((base, quote)) = self.state.pair_tokens() else {
            warn!("Cancel requested without a loaded pair");
            return;
        };
        let raw_price = match to_raw_price(price, base.decimals(), quote.decimals()) {
            Ok(p) => p,
            Err(e) => {
                self.toast(ToastLevel::Error, e.to_string());
                return;
            }
        };
        let base = base.symbol().to_string();
        let service = self.service.clone();
        self.tasks.spawn(async move {
            let result = service.cancel_order(&base, side, raw_price).await;
            Completion::OrderCancelled {
                base,
                side,
                price,
                result,
            }
        });
    }

    fn begin_funds(&mut self, op: FundsOperation, token: &str, amount: Option<&str>) {
        let Some(meta) = self.state.tokens.get(token).cloned() else {
            self.toast(ToastLevel::Error, format!("Unknown token {token}"));
            return;
        };
        let wallet = self.state.balances.wallet(token);
        let credit = self.state.balances.credit(token).cloned();
        let request = match self.funds.begin(op, &meta, amount, wallet, credit.as_ref()) {
            Ok(request) => request,
            Err(e) => {
                self.toast(ToastLevel::Error, e.to_string());
                return;
            }
        };
        info!("{} {:?} {}", op, request.amount, request.token);
        let service = self.service.clone();
        self.tasks.spawn(async move {
            let amount = request.amount.unwrap_or_default();
            let result = match request.op {
                FundsOperation::Deposit => service.deposit(&request.token, amount).await,
                FundsOperation::Withdraw => service.withdraw(&request.token, amount).await,
                FundsOperation::Claim => service.notify(&request.token).await,
            };
            Completion::Funds { op, result }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::simulated::SimulatedAuction;
    use crate::core::funds::FundsState;
    use crate::core::order_form::FormState;
    use crate::types::{PricePoint, TokenMetadata, TransactionRecord};
    use crate::connectors::traits::{AuctionService, ServiceResult};
    use crate::types::{AuctionSettings, Credit, FundsReceipt, RawOrder};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn engine_with(
        service: impl AuctionService + 'static,
    ) -> (TerminalEngine, mpsc::Receiver<UiEvent>) {
        let (_cmd_tx, cmd_rx) = mpsc::channel(8);
        let (ui_tx, ui_rx) = mpsc::channel(256);
        let engine = TerminalEngine::new(Arc::new(service), cmd_rx, ui_tx, EngineOptions::default())
            .with_action(Action::PairSelected(Instrument::new("BTC", "USDC")));
        (engine, ui_rx)
    }

    async fn funded_engine() -> (TerminalEngine, mpsc::Receiver<UiEvent>) {
        let sim = SimulatedAuction::demo().unwrap();
        sim.deposit("USDC", 1_000_000_000).await.unwrap();
        sim.deposit("BTC", 50_000_000).await.unwrap();
        let (mut engine, ui_rx) = engine_with(sim);
        engine.start();
        engine.settle().await;
        (engine, ui_rx)
    }

    async fn place(engine: &mut TerminalEngine, side: Side, price: &str, volume: &str) {
        for event in [
            FormEvent::SetSide(side),
            FormEvent::EditPrice(price.to_string()),
            FormEvent::EditVolume(volume.to_string()),
            FormEvent::Submit,
        ] {
            engine.handle_command(Command::Form(event)).await;
        }
        engine.settle().await;
    }

    #[tokio::test]
    async fn start_loads_tokens_then_pair_data() {
        let (engine, _ui) = funded_engine().await;
        let snap = engine.snapshot();
        assert_eq!(snap.state.tokens.quote.as_ref().unwrap().symbol(), "USDC");
        assert!(snap.state.settings.is_some());
        assert_eq!(snap.state.history.prices.len(), 24);
        let first = &snap.state.history.prices[0];
        assert!(snap
            .state
            .history
            .prices
            .iter()
            .all(|r| r.price_decimals == first.price_decimals));
        assert_eq!(snap.state.balances.wallet("USDC"), 9_000_000_000);
        assert_eq!(snap.in_flight, 0);
    }

    #[tokio::test]
    async fn successful_order_invalidates_and_refreshes() {
        let (mut engine, _ui) = funded_engine().await;
        place(&mut engine, Side::Buy, "60000", "0.001").await;

        let snap = engine.snapshot();
        assert!(matches!(snap.form.state, FormState::Success(_)));
        assert_eq!(snap.state.orders.open.len(), 1);
        assert_eq!(snap.state.orders.open[0].price, dec!(60000));
        assert_eq!(snap.state.orders.open[0].volume, 100_000);
        assert!(!snap.state.orders.stale && !snap.state.balances.stale);
        let usdc = snap.state.balances.credit("USDC").unwrap();
        assert_eq!(usdc.locked, 60_000_000);
    }

    #[tokio::test]
    async fn crossing_order_is_rejected_locally() {
        let (mut engine, _ui) = funded_engine().await;
        place(&mut engine, Side::Sell, "70000", "0.001").await;
        engine
            .handle_command(Command::Form(FormEvent::Acknowledge))
            .await;
        place(&mut engine, Side::Buy, "70000", "0.001").await;
        match engine.snapshot().form.state {
            FormState::Error(message) => assert!(message.contains("ask")),
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(engine.snapshot().state.orders.open.len(), 1);
    }

    #[tokio::test]
    async fn remote_rejection_surfaces_mapped_message() {
        let sim = SimulatedAuction::demo().unwrap();
        let (mut engine, mut ui) = engine_with(sim);
        engine.start();
        engine.settle().await;
        // no credit deposited
        place(&mut engine, Side::Buy, "60000", "0.001").await;
        assert_eq!(
            engine.snapshot().form.state,
            FormState::Error("Insufficient funds".to_string())
        );
        let mut toasts = Vec::new();
        while let Ok(event) = ui.try_recv() {
            if let UiEvent::Toast(ToastLevel::Error, msg) = event {
                toasts.push(msg);
            }
        }
        assert!(toasts.contains(&"Insufficient funds".to_string()));
    }

    #[tokio::test]
    async fn cancel_removes_order_and_unlocks_credit() {
        let (mut engine, _ui) = funded_engine().await;
        place(&mut engine, Side::Sell, "70000", "0.001").await;
        engine
            .handle_command(Command::CancelOrder {
                side: Side::Sell,
                price: dec!(70000),
            })
            .await;
        engine.settle().await;
        let snap = engine.snapshot();
        assert!(snap.state.orders.open.is_empty());
        assert_eq!(snap.state.balances.credit("BTC").unwrap().locked, 0);
    }

    #[tokio::test]
    async fn deposit_flow_completes_and_refreshes_balances() {
        let (mut engine, _ui) = funded_engine().await;
        engine
            .handle_command(Command::Funds {
                op: FundsOperation::Deposit,
                token: "USDC".into(),
                amount: Some("10".into()),
            })
            .await;
        assert_eq!(
            engine.snapshot().funds.state,
            FundsState::Pending(FundsOperation::Deposit)
        );
        engine.settle().await;
        let snap = engine.snapshot();
        assert_eq!(
            snap.funds.state,
            FundsState::Completed {
                op: FundsOperation::Deposit,
                amount: 9_990_000
            }
        );
        assert_eq!(snap.state.balances.wallet("USDC"), 8_990_000_000);
    }

    #[tokio::test]
    async fn stale_responses_are_dropped() {
        let old = Utc.timestamp_opt(1_600_000_000, 0).unwrap();
        let sim = SimulatedAuction::demo().unwrap().with_history(
            "BTC",
            vec![PricePoint {
                timestamp: old,
                session_number: 1,
                volume: 1,
                price: dec!(1),
            }],
        );
        let (mut engine, _ui) = engine_with(sim);
        engine.start();
        engine.settle().await;
        // two refreshes race; only the latest ticket is applied
        engine.fetch(RequestKind::PriceHistory);
        let first = engine.requests.issue(RequestKind::PriceHistory);
        engine.fetch(RequestKind::PriceHistory);
        engine.settle().await;
        assert!(!engine.requests.is_current(&first));
        assert_eq!(engine.snapshot().state.history.prices.len(), 1);
    }

    /// Answers `credits` late with what it saw when the call started.
    struct LaggingCredits(SimulatedAuction);

    #[async_trait]
    impl AuctionService for LaggingCredits {
        async fn quote_token(&self) -> ServiceResult<TokenMetadata> {
            self.0.quote_token().await
        }
        async fn tokens(&self) -> ServiceResult<Vec<TokenMetadata>> {
            self.0.tokens().await
        }
        async fn settings(&self) -> ServiceResult<AuctionSettings> {
            self.0.settings().await
        }
        async fn credits(&self) -> ServiceResult<Vec<Credit>> {
            let seen = self.0.credits().await;
            tokio::time::sleep(Duration::from_millis(100)).await;
            seen
        }
        async fn wallet_balance(&self, token: &str) -> ServiceResult<u128> {
            self.0.wallet_balance(token).await
        }
        async fn deposit(&self, token: &str, amount: u128) -> ServiceResult<FundsReceipt> {
            self.0.deposit(token, amount).await
        }
        async fn notify(&self, token: &str) -> ServiceResult<FundsReceipt> {
            self.0.notify(token).await
        }
        async fn withdraw(&self, token: &str, amount: u128) -> ServiceResult<FundsReceipt> {
            self.0.withdraw(token, amount).await
        }
        async fn place_order(
            &self,
            token: &str,
            side: Side,
            volume: u128,
            price: Decimal,
        ) -> ServiceResult<u64> {
            self.0.place_order(token, side, volume, price).await
        }
        async fn cancel_order(&self, token: &str, side: Side, price: Decimal) -> ServiceResult<()> {
            self.0.cancel_order(token, side, price).await
        }
        async fn open_orders(&self) -> ServiceResult<Vec<RawOrder>> {
            self.0.open_orders().await
        }
        async fn price_history(&self, token: &str, limit: usize) -> ServiceResult<Vec<PricePoint>> {
            self.0.price_history(token, limit).await
        }
        async fn transaction_history(
            &self,
            token: &str,
            limit: usize,
        ) -> ServiceResult<Vec<TransactionRecord>> {
            self.0.transaction_history(token, limit).await
        }
    }

    #[tokio::test]
    async fn invalidation_refetches_past_an_older_call_in_flight() {
        let sim = SimulatedAuction::demo().unwrap();
        sim.deposit("USDC", 1_000_000_000).await.unwrap();
        let (mut engine, _ui) = engine_with(LaggingCredits(sim));
        engine.start();
        engine.settle().await;

        // this credits call reads the balances before the order below locks funds
        engine.refresh();
        place(&mut engine, Side::Buy, "60000", "0.001").await;

        let snap = engine.snapshot();
        assert!(matches!(snap.form.state, FormState::Success(_)));
        assert!(!snap.state.balances.stale);
        assert_eq!(snap.state.balances.credit("USDC").unwrap().locked, 60_000_000);
    }

    #[tokio::test]
    async fn awkward_price_order_is_accepted_on_step() {
        let sim = SimulatedAuction::demo().unwrap();
        sim.deposit("USDC", 1_000_000_000).await.unwrap();
        let (mut engine, _ui) = engine_with(sim);
        engine.dispatch(Action::PairSelected(Instrument::new("ICP", "USDC")));
        engine.start();
        engine.settle().await;

        place(&mut engine, Side::Buy, "12.3", "1.234").await;
        let snap = engine.snapshot();
        assert!(matches!(snap.form.state, FormState::Success(_)));
        assert_eq!(snap.state.orders.open.len(), 1);
        assert_eq!(snap.state.orders.open[0].volume, 120_000_000);
    }

    #[tokio::test]
    async fn failed_fetch_falls_back_to_empty() {
        let (mut engine, mut ui) = funded_engine().await;
        assert!(!engine.snapshot().state.history.prices.is_empty());
        while ui.try_recv().is_ok() {}

        let ticket = engine.requests.issue(RequestKind::PriceHistory);
        engine.on_completion(Completion::Fetched {
            ticket,
            result: Err(ServiceError::Transport("connection refused".into())),
        });
        assert!(engine.snapshot().state.history.prices.is_empty());
        assert!(matches!(
            ui.try_recv(),
            Ok(UiEvent::Toast(ToastLevel::Error, msg)) if msg == "Network error, please try again"
        ));
    }

    #[tokio::test]
    async fn claim_credits_pending_transfer() {
        let sim = SimulatedAuction::demo().unwrap();
        sim.receive_transfer("BTC", 5_000).await;
        let (mut engine, _ui) = engine_with(sim);
        engine.start();
        engine.settle().await;
        engine
            .handle_command(Command::Funds {
                op: FundsOperation::Claim,
                token: "BTC".into(),
                amount: None,
            })
            .await;
        engine.settle().await;
        let snap = engine.snapshot();
        assert_eq!(
            snap.funds.state,
            FundsState::Completed {
                op: FundsOperation::Claim,
                amount: 5_000
            }
        );
        assert_eq!(snap.state.balances.credit("BTC").unwrap().available, 5_000);
    }

    #[tokio::test]
    async fn transactions_are_projected_for_the_pair() {
        let sim = SimulatedAuction::demo().unwrap().with_transactions(vec![TransactionRecord {
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            session_number: 3,
            side: Side::Sell,
            token: "BTC".into(),
            volume: 150_000_000,
            price: dec!(650),
        }]);
        let (mut engine, _ui) = engine_with(sim);
        engine.start();
        engine.settle().await;
        let snap = engine.snapshot();
        let row = &snap.state.history.transactions[0];
        assert_eq!(row.side, Side::Sell);
        assert_eq!(row.item.price, dec!(65000));
        assert_eq!(row.item.volume_in_base, dec!(1.5));
        assert_eq!(row.item.volume_in_quote, dec!(97500));
    }

    #[test]
    fn display_orders_scales_prices_and_skips_unknown_tokens() {
        let tokens = TokensSlice {
            quote: Some(TokenMetadata::new("USDC", "", 6, 0, None).unwrap()),
            tokens: vec![TokenMetadata::new("BTC", "", 8, 0, None).unwrap()],
        };
        let raw = vec![
            RawOrder {
                token: "BTC".into(),
                side: Side::Sell,
                volume: 5,
                price: dec!(650),
            },
            RawOrder {
                token: "DOGE".into(),
                side: Side::Buy,
                volume: 5,
                price: dec!(1),
            },
        ];
        let orders = display_orders(&raw, &tokens).unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].price, dec!(65000));
        assert_eq!(orders[0].quote, "USDC");
    }
}
