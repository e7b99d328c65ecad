use crate::error::ServiceError;
use crate::types::{
    AuctionSettings, Credit, FundsReceipt, PricePoint, RawOrder, Side, TokenMetadata,
    TransactionRecord,
};
use async_trait::async_trait;
use rust_decimal::Decimal;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// The remote ledger/auction as seen by one trader. Amounts are smallest
/// units, prices are raw auction prices.
#[async_trait]
pub trait AuctionService: Send + Sync {
    async fn quote_token(&self) -> ServiceResult<TokenMetadata>;

    async fn tokens(&self) -> ServiceResult<Vec<TokenMetadata>>;

    async fn settings(&self) -> ServiceResult<AuctionSettings>;

    async fn credits(&self) -> ServiceResult<Vec<Credit>>;

    async fn wallet_balance(&self, token: &str) -> ServiceResult<u128>;

    async fn deposit(&self, token: &str, amount: u128) -> ServiceResult<FundsReceipt>;

    /// Claims transfers to the trader's deposit account that are not credited yet.
    async fn notify(&self, token: &str) -> ServiceResult<FundsReceipt>;

    async fn withdraw(&self, token: &str, amount: u128) -> ServiceResult<FundsReceipt>;

    async fn place_order(
        &self,
        token: &str,
        side: Side,
        volume: u128,
        price: Decimal,
    ) -> ServiceResult<u64>;

    async fn cancel_order(&self, token: &str, side: Side, price: Decimal) -> ServiceResult<()>;

    async fn open_orders(&self) -> ServiceResult<Vec<RawOrder>>;

    async fn price_history(&self, token: &str, limit: usize) -> ServiceResult<Vec<PricePoint>>;

    async fn transaction_history(
        &self,
        token: &str,
        limit: usize,
    ) -> ServiceResult<Vec<TransactionRecord>>;
}
