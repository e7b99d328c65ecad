// src/core/order_form.rs
use crate::core::step_size::floor_to_step;
use crate::core::validator::{check_price_digits, validate, OrderConflict};
use crate::error::ConversionError;
use crate::types::{AuctionSettings, Order, Side, TokenMetadata};
use crate::utils::conversion::{nat_to_decimal, to_raw_price, to_raw_volume};
use crate::utils::precision::parse_decimal;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormState {
    Idle,
    Editing,
    Validating,
    Submitting,
    Success(String),
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormEvent {
    SetSide(Side),
    EditPrice(String),
    EditVolume(String),
    Submit,
    Validated(PreparedOrder),
    Rejected(String),
    Completed(String),
    Failed(String),
    Acknowledge,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreparedOrder {
    pub base: String,
    pub side: Side,
    /// Display price, quote per base.
    pub price: Decimal,
    /// Base volume after step flooring.
    pub volume: Decimal,
    pub raw_price: Decimal,
    pub raw_volume: u128,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormError {
    #[error("price {0:?} is not a number")]
    InvalidPrice(String),
    #[error("volume {0:?} is not a number")]
    InvalidVolume(String),
    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),
    #[error(transparent)]
    Conflict(#[from] OrderConflict),
    #[error("volume is below one step of the auction")]
    VolumeTooSmall,
    #[error("order value {value} is below the minimum {minimum}")]
    BelowMinimum { value: Decimal, minimum: Decimal },
    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

/// What the validating state checks a form against.
pub struct OrderContext<'a> {
    pub base: &'a TokenMetadata,
    pub quote: &'a TokenMetadata,
    pub open_orders: &'a [Order],
    pub settings: Option<&'a AuctionSettings>,
}

/// Order-entry form of one trading pair.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderForm {
    pub side: Side,
    pub price_input: String,
    pub volume_input: String,
    pub state: FormState,
    pub pending: Option<PreparedOrder>,
}

impl Default for OrderForm {
    fn default() -> Self {
        Self {
            side: Side::Buy,
            price_input: String::new(),
            volume_input: String::new(),
            state: FormState::Idle,
            pending: None,
        }
    }
}

impl OrderForm {
    pub fn is_busy(&self) -> bool {
        matches!(self.state, FormState::Validating | FormState::Submitting)
    }

    /// Applies `event`; returns false when it is not valid in the current state.
    pub fn handle(&mut self, event: FormEvent) -> bool {
        let busy = self.is_busy();
        let next = match (&self.state, event) {
            (_, FormEvent::SetSide(side)) if !busy => {
                self.side = side;
                FormState::Editing
            }
            (_, FormEvent::EditPrice(text)) if !busy => {
                self.price_input = text;
                FormState::Editing
            }
            (_, FormEvent::EditVolume(text)) if !busy => {
                self.volume_input = text;
                FormState::Editing
            }
            (FormState::Editing, FormEvent::Submit) => FormState::Validating,
            (FormState::Validating, FormEvent::Validated(order)) => {
                self.pending = Some(order);
                FormState::Submitting
            }
            (FormState::Validating, FormEvent::Rejected(msg)) => FormState::Error(msg),
            (FormState::Submitting, FormEvent::Completed(msg)) => {
                self.pending = None;
                FormState::Success(msg)
            }
            (FormState::Submitting, FormEvent::Failed(msg)) => {
                self.pending = None;
                FormState::Error(msg)
            }
            (FormState::Success(_), FormEvent::Acknowledge) => {
                self.price_input.clear();
                self.volume_input.clear();
                FormState::Idle
            }
            (FormState::Error(_), FormEvent::Acknowledge) => FormState::Idle,
            (state, event) => {
                warn!("Order form ignores {:?} in state {:?}", event, state);
                return false;
            }
        };
        self.state = next;
        true
    }

    /// The checks of the validating state, turning text inputs into a submittable order.
    pub fn prepare(&self, ctx: &OrderContext<'_>) -> Result<PreparedOrder, FormError> {
        let price = parse_decimal(&self.price_input)
            .map_err(|_| FormError::InvalidPrice(self.price_input.clone()))?;
        let volume = parse_decimal(&self.volume_input)
            .map_err(|_| FormError::InvalidVolume(self.volume_input.clone()))?;
        if price <= Decimal::ZERO {
            return Err(FormError::NotPositive("price"));
        }
        if volume <= Decimal::ZERO {
            return Err(FormError::NotPositive("volume"));
        }

        if let Some(settings) = ctx.settings {
            if let Some(conflict) = check_price_digits(price, settings.order_price_digits_limit) {
                return Err(conflict.into());
            }
        }
        if let Some(conflict) = validate(
            ctx.open_orders,
            ctx.base.symbol(),
            ctx.quote.symbol(),
            self.side,
            price,
            ctx.quote,
        ) {
            return Err(conflict.into());
        }

        let (step, minimum) = match ctx.settings {
            Some(s) => (
                nat_to_decimal(s.order_quote_volume_step, ctx.quote.decimals())?,
                nat_to_decimal(s.order_quote_volume_minimum, ctx.quote.decimals())?,
            ),
            None => (Decimal::ZERO, Decimal::ZERO),
        };
        let adjusted = floor_to_step(step, price, volume, ctx.base.decimals())?;
        if adjusted.volume.is_zero() {
            return Err(FormError::VolumeTooSmall);
        }
        let value = adjusted
            .volume
            .checked_mul(price)
            .ok_or_else(|| ConversionError::Overflow(adjusted.volume.to_string()))?;
        if value < minimum {
            return Err(FormError::BelowMinimum { value, minimum });
        }

        Ok(PreparedOrder {
            base: ctx.base.symbol().to_string(),
            side: self.side,
            price,
            volume: adjusted.volume,
            raw_price: to_raw_price(price, ctx.base.decimals(), ctx.quote.decimals())?,
            raw_volume: to_raw_volume(adjusted.volume, ctx.base.decimals())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn btc() -> TokenMetadata {
        TokenMetadata::new("BTC", "Bitcoin", 8, 10, None).unwrap()
    }

    fn usdc() -> TokenMetadata {
        TokenMetadata::new("USDC", "USD Coin", 6, 10_000, None).unwrap()
    }

    fn settings() -> AuctionSettings {
        AuctionSettings {
            // 5 USDC minimum, 0.01 USDC step
            order_quote_volume_minimum: 5_000_000,
            order_quote_volume_step: 10_000,
            order_price_digits_limit: 5,
            orders_number_limit: 100,
        }
    }

    fn filled(side: Side, price: &str, volume: &str) -> OrderForm {
        let mut form = OrderForm::default();
        form.handle(FormEvent::SetSide(side));
        form.handle(FormEvent::EditPrice(price.to_string()));
        form.handle(FormEvent::EditVolume(volume.to_string()));
        form
    }

    #[test]
    fn happy_path_walks_every_state() {
        let mut form = filled(Side::Buy, "100", "0.5");
        assert_eq!(form.state, FormState::Editing);
        assert!(form.handle(FormEvent::Submit));
        assert_eq!(form.state, FormState::Validating);

        let (base, quote, s) = (btc(), usdc(), settings());
        let ctx = OrderContext {
            base: &base,
            quote: &quote,
            open_orders: &[],
            settings: Some(&s),
        };
        let prepared = form.prepare(&ctx).unwrap();
        assert!(form.handle(FormEvent::Validated(prepared)));
        assert_eq!(form.state, FormState::Submitting);
        assert!(form.is_busy());
        assert!(!form.handle(FormEvent::EditPrice("1".into())));

        assert!(form.handle(FormEvent::Completed("placed".into())));
        assert_eq!(form.state, FormState::Success("placed".into()));
        assert!(form.handle(FormEvent::Acknowledge));
        assert_eq!(form.state, FormState::Idle);
        assert!(form.price_input.is_empty());
    }

    #[test]
    fn invalid_transitions_are_ignored() {
        let mut form = OrderForm::default();
        assert!(!form.handle(FormEvent::Submit));
        assert!(!form.handle(FormEvent::Completed("x".into())));
        assert_eq!(form.state, FormState::Idle);
    }

    #[test]
    fn failure_returns_to_idle_after_acknowledge_keeping_inputs() {
        let mut form = filled(Side::Sell, "10", "1");
        form.handle(FormEvent::Submit);
        form.handle(FormEvent::Rejected("nope".into()));
        assert_eq!(form.state, FormState::Error("nope".into()));
        form.handle(FormEvent::Acknowledge);
        assert_eq!(form.state, FormState::Idle);
        assert_eq!(form.price_input, "10");
    }

    #[test]
    fn prepare_converts_to_raw_units() {
        let form = filled(Side::Buy, "100", "0.123456789");
        let (base, quote, s) = (btc(), usdc(), settings());
        let ctx = OrderContext {
            base: &base,
            quote: &quote,
            open_orders: &[],
            settings: Some(&s),
        };
        let prepared = form.prepare(&ctx).unwrap();
        // step 0.01 USDC at 100 -> 0.0001 BTC
        assert_eq!(prepared.volume, dec!(0.1234));
        assert_eq!(prepared.raw_volume, 12_340_000);
        assert_eq!(prepared.raw_price, dec!(1));
    }

    #[test]
    fn prepare_keeps_value_on_step_at_awkward_prices() {
        let form = filled(Side::Buy, "12.3", "1.234");
        let (base, quote, s) = (btc(), usdc(), settings());
        let ctx = OrderContext {
            base: &base,
            quote: &quote,
            open_orders: &[],
            settings: Some(&s),
        };
        let prepared = form.prepare(&ctx).unwrap();
        assert_eq!(prepared.volume, dec!(1.2));
        assert_eq!(prepared.raw_volume, 120_000_000);
        assert_eq!((prepared.volume * prepared.price) % dec!(0.01), Decimal::ZERO);
    }

    #[test]
    fn prepare_rejects_bad_inputs() {
        let (base, quote, s) = (btc(), usdc(), settings());
        let open = vec![Order {
            base: "BTC".into(),
            quote: "USDC".into(),
            side: Side::Sell,
            volume: 1,
            price: dec!(90),
        }];
        let ctx = OrderContext {
            base: &base,
            quote: &quote,
            open_orders: &open,
            settings: Some(&s),
        };
        assert!(matches!(
            filled(Side::Buy, "abc", "1").prepare(&ctx),
            Err(FormError::InvalidPrice(_))
        ));
        assert_eq!(
            filled(Side::Buy, "10", "0").prepare(&ctx),
            Err(FormError::NotPositive("volume"))
        );
        assert!(matches!(
            filled(Side::Buy, "95", "1").prepare(&ctx),
            Err(FormError::Conflict(OrderConflict::CrossesAsk { .. }))
        ));
        assert!(matches!(
            filled(Side::Buy, "12.3456", "1").prepare(&ctx),
            Err(FormError::Conflict(OrderConflict::TooManyDigits { .. }))
        ));
        assert!(matches!(
            filled(Side::Buy, "10", "0.1").prepare(&ctx),
            Err(FormError::BelowMinimum { .. })
        ));
        assert_eq!(
            filled(Side::Buy, "10", "0.0001").prepare(&ctx),
            Err(FormError::VolumeTooSmall)
        );
    }
}
