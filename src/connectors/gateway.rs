// src/connectors/gateway.rs
use crate::connectors::messages::{
    parse_nat, unwrap_result, BookSide, CreditMessage, FundsArgs, FundsMessage, HistoryQuery,
    OrderArgs, OrderMessage, OwnerQuery, PlacedMessage, PricePointMessage, SettingsMessage,
    TokenInfoMessage, TokenQuery, TransactionMessage,
};
use crate::connectors::traits::{AuctionService, ServiceResult};
use crate::error::{ConversionError, ServiceError};
use crate::types::{
    AuctionSettings, Credit, FundsReceipt, PricePoint, RawOrder, Side, TokenMetadata,
    TransactionRecord,
};
use async_trait::async_trait;
use reqwest::{Client, Method};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// HTTP JSON gateway in front of the auction canister. Read calls are GET
/// queries, state changing calls are POST updates.
pub struct GatewayClient {
    owner: String,
    http_client: Client,
    base_url: Url,
}

impl GatewayClient {
    pub fn new(endpoint: &str, owner: String) -> ServiceResult<Self> {
        let mut endpoint = endpoint.trim().to_string();
        if !endpoint.ends_with('/') {
            endpoint.push('/');
        }
        let base_url =
            Url::parse(&endpoint).map_err(|e| ServiceError::Transport(format!("{endpoint}: {e}")))?;
        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            owner,
            http_client,
            base_url,
        })
    }

    fn method_url(&self, method: &str) -> ServiceResult<Url> {
        self.base_url
            .join(&format!("api/{method}"))
            .map_err(|e| ServiceError::Transport(e.to_string()))
    }

    async fn send<T: DeserializeOwned>(&self, method: Method, url: Url, body: Option<serde_json::Value>) -> ServiceResult<T> {
        debug!("{} {}", method, url);
        let mut request = self.http_client.request(method, url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let value = request
            .send()
            .await?
            .error_for_status()?
            .json::<serde_json::Value>()
            .await?;
        Ok(serde_json::from_value(unwrap_result(value)?)?)
    }

    async fn query<Q: Serialize, T: DeserializeOwned>(&self, method: &str, params: &Q) -> ServiceResult<T> {
        let mut url = self.method_url(method)?;
        let query = serde_urlencoded::to_string(params)
            .map_err(|e| ServiceError::Decode(e.to_string()))?;
        url.set_query(Some(&query));
        self.send(Method::GET, url, None).await
    }

    async fn update<A: Serialize, T: DeserializeOwned>(&self, method: &str, args: &A) -> ServiceResult<T> {
        let url = self.method_url(method)?;
        self.send(Method::POST, url, Some(serde_json::to_value(args)?))
            .await
    }

    fn convert_all<M, T>(messages: Vec<M>) -> ServiceResult<Vec<T>>
    where
        T: TryFrom<M, Error = ConversionError>,
    {
        messages
            .into_iter()
            .map(|m| T::try_from(m).map_err(ServiceError::from))
            .collect()
    }
}

#[async_trait]
impl AuctionService for GatewayClient {
    async fn quote_token(&self) -> ServiceResult<TokenMetadata> {
        let msg: TokenInfoMessage = self.query("quoteToken", &OwnerQuery { owner: &self.owner }).await?;
        Ok(TokenMetadata::try_from(msg)?)
    }

    async fn tokens(&self) -> ServiceResult<Vec<TokenMetadata>> {
        let msgs: Vec<TokenInfoMessage> = self.query("tokens", &OwnerQuery { owner: &self.owner }).await?;
        let tokens = msgs
            .into_iter()
            .map(TokenMetadata::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        info!("Gateway lists {} tokens", tokens.len());
        Ok(tokens)
    }

    async fn settings(&self) -> ServiceResult<AuctionSettings> {
        let msg: SettingsMessage = self.query("settings", &OwnerQuery { owner: &self.owner }).await?;
        Ok(AuctionSettings::try_from(msg)?)
    }

    async fn credits(&self) -> ServiceResult<Vec<Credit>> {
        let msgs: Vec<CreditMessage> = self.query("credits", &OwnerQuery { owner: &self.owner }).await?;
        Self::convert_all(msgs)
    }

    async fn wallet_balance(&self, token: &str) -> ServiceResult<u128> {
        #[derive(Deserialize)]
        struct Balance {
            balance: String,
        }

        let resp: Balance = self
            .query(
                "walletBalance",
                &TokenQuery {
                    owner: &self.owner,
                    token,
                },
            )
            .await?;
        Ok(parse_nat(&resp.balance)?)
    }

    async fn deposit(&self, token: &str, amount: u128) -> ServiceResult<FundsReceipt> {
        info!("Depositing {} of {}", amount, token);
        let msg: FundsMessage = self
            .update(
                "deposit",
                &FundsArgs {
                    owner: &self.owner,
                    token,
                    amount: Some(amount.to_string()),
                },
            )
            .await?;
        Ok(FundsReceipt::try_from(msg)?)
    }

    async fn notify(&self, token: &str) -> ServiceResult<FundsReceipt> {
        let msg: FundsMessage = self
            .update(
                "notify",
                &FundsArgs {
                    owner: &self.owner,
                    token,
                    amount: None,
                },
            )
            .await?;
        Ok(FundsReceipt::try_from(msg)?)
    }

    async fn withdraw(&self, token: &str, amount: u128) -> ServiceResult<FundsReceipt> {
        info!("Withdrawing {} of {}", amount, token);
        let msg: FundsMessage = self
            .update(
                "withdraw",
                &FundsArgs {
                    owner: &self.owner,
                    token,
                    amount: Some(amount.to_string()),
                },
            )
            .await?;
        Ok(FundsReceipt::try_from(msg)?)
    }

    async fn place_order(
        &self,
        token: &str,
        side: Side,
        volume: u128,
        price: Decimal,
    ) -> ServiceResult<u64> {
        let book_side = BookSide::from(side);
        info!("Sending order: {:?} {} {} @ {}", book_side, volume, token, price);
        let resp: PlacedMessage = self
            .update(
                "placeOrder",
                &OrderArgs {
                    owner: &self.owner,
                    token,
                    side: book_side,
                    volume: Some(volume.to_string()),
                    price,
                },
            )
            .await?;
        Ok(resp.order_id)
    }

    async fn cancel_order(&self, token: &str, side: Side, price: Decimal) -> ServiceResult<()> {
        let _: serde_json::Value = self
            .update(
                "cancelOrder",
                &OrderArgs {
                    owner: &self.owner,
                    token,
                    side: side.into(),
                    volume: None,
                    price,
                },
            )
            .await?;
        Ok(())
    }

    async fn open_orders(&self) -> ServiceResult<Vec<RawOrder>> {
        let msgs: Vec<OrderMessage> = self.query("orders", &OwnerQuery { owner: &self.owner }).await?;
        Self::convert_all(msgs)
    }

    async fn price_history(&self, token: &str, limit: usize) -> ServiceResult<Vec<PricePoint>> {
        let msgs: Vec<PricePointMessage> = self
            .query(
                "priceHistory",
                &HistoryQuery {
                    owner: &self.owner,
                    token,
                    limit,
                    skip: 0,
                },
            )
            .await?;
        Self::convert_all(msgs)
    }

    async fn transaction_history(
        &self,
        token: &str,
        limit: usize,
    ) -> ServiceResult<Vec<TransactionRecord>> {
        let msgs: Vec<TransactionMessage> = self
            .query(
                "transactionHistory",
                &HistoryQuery {
                    owner: &self.owner,
                    token,
                    limit,
                    skip: 0,
                },
            )
            .await?;
        Self::convert_all(msgs)
    }
}
