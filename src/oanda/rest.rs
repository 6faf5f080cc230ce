//! REST API client for the Oanda v1 brokerage API

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, SecondsFormat, TimeZone, Utc};
use reqwest::{Client, RequestBuilder, Response};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, instrument};
use url::Url;

use super::messages::*;
use crate::common::errors::{BridgeError, Result};
use crate::common::traits::BrokerGateway;
use crate::common::types::{CurrencyPair, PendingOrder, Quote, RemoteTrade, Side, TradeId};
use crate::config::types::BrokerConfig;

/// Trades fetched per pair; a position never stacks more than this
const TRADES_PER_PAIR: u32 = 50;
/// Largest page the API serves
const MAX_PAGE: u32 = 500;

/// REST API client bound to one Oanda account
///
/// Requests are serialised and each is followed by a fixed pause to stay
/// inside the API's rate limit.
pub struct OandaRestClient {
    /// HTTP client
    client: Client,
    /// Base URL, without trailing slash
    base_url: String,
    account_id: String,
    api_key: Option<String>,
    request_delay: Duration,
    /// Held for the duration of a request and its trailing pause
    pacing: Mutex<()>,
}

impl OandaRestClient {
    /// Create a new REST client with the default timeout and pacing
    pub fn new(base_url: &str, account_id: &str) -> Result<Self> {
        Self::with_settings(
            base_url,
            account_id,
            None,
            Duration::from_secs(30),
            Duration::from_millis(500),
        )
    }

    /// Create a client for `account_id` from the broker configuration
    pub fn from_config(config: &BrokerConfig, account_id: &str) -> Result<Self> {
        Self::with_settings(
            &config.api_url,
            account_id,
            config.api_key.clone(),
            Duration::from_secs(config.request_timeout_seconds),
            Duration::from_millis(config.request_delay_ms),
        )
    }

    /// Create a new REST client with custom timeout and pacing
    pub fn with_settings(
        base_url: &str,
        account_id: &str,
        api_key: Option<String>,
        timeout: Duration,
        request_delay: Duration,
    ) -> Result<Self> {
        Url::parse(base_url)
            .map_err(|e| BridgeError::Configuration(format!("invalid api_url '{}': {}", base_url, e)))?;
        if account_id.trim().is_empty() {
            return Err(BridgeError::Configuration("account id is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BridgeError::Internal(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            account_id: account_id.to_string(),
            api_key,
            request_delay,
            pacing: Mutex::new(()),
        })
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    fn account_url(&self, path: &str) -> String {
        format!("{}/v1/accounts/{}{}", self.base_url, self.account_id, path)
    }

    /// Send a request, mapping non-2xx statuses to `InvalidResponse`
    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let _turn = self.pacing.lock().await;

        let request = match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        };
        let result = request.send().await;
        tokio::time::sleep(self.request_delay).await;

        let response = result?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ApiErrorResponse>(&body)
                .map(|e| format!("{} (code {})", e.message, e.code))
                .unwrap_or(body);
            return Err(BridgeError::InvalidResponse(format!(
                "Server returned status {}: {}",
                status, detail
            )));
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.send(request).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// POST with a method override, which the v1 API uses for PATCH
    fn patch(&self, url: &str) -> RequestBuilder {
        self.client
            .post(url)
            .header("X-HTTP-Method-Override", "PATCH")
    }
}

/// Expiry for resting limit orders: the 6th of next month, 12:00 UTC
pub fn limit_order_expiry(now: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    Utc.with_ymd_and_hms(year, month, 6, 12, 0, 0)
        .single()
        .unwrap_or_else(|| now + chrono::Duration::days(30))
}

fn stop_form(stop_loss: Decimal, trailing_stop: Option<Decimal>) -> Vec<(&'static str, String)> {
    let mut form = vec![("stopLoss", stop_loss.to_string())];
    if let Some(trailing) = trailing_stop {
        form.push(("trailingStop", trailing.to_string()));
    }
    form
}

#[async_trait]
impl BrokerGateway for OandaRestClient {
    #[instrument(skip(self))]
    async fn get_price(&self, pair: CurrencyPair) -> Result<Quote> {
        let url = format!("{}/v1/prices", self.base_url);
        debug!("Fetching price from: {}", url);

        let request = self
            .client
            .get(&url)
            .query(&[("instruments", pair.to_string())]);
        let response: PricesResponse = self.send_json(request).await?;

        response
            .prices
            .iter()
            .find(|p| p.instrument == pair.to_string())
            .map(Quote::from)
            .ok_or_else(|| BridgeError::InvalidResponse(format!("No price returned for {}", pair)))
    }

    #[instrument(skip(self))]
    async fn get_account_balance(&self) -> Result<Decimal> {
        let url = self.account_url("");
        debug!("Fetching account from: {}", url);

        let response: AccountResponse = self.send_json(self.client.get(&url)).await?;
        Ok(response.balance)
    }

    #[instrument(skip(self))]
    async fn open_trade(&self, side: Side, units: u64, pair: CurrencyPair) -> Result<TradeId> {
        let url = self.account_url("/orders");
        debug!("Placing market order at: {}", url);

        let form = [
            ("instrument", pair.to_string()),
            ("units", units.to_string()),
            ("side", side.to_string()),
            ("type", "market".to_string()),
        ];
        let response: OrderResponse = self.send_json(self.client.post(&url).form(&form)).await?;

        response
            .trade_opened
            .and_then(|t| t.id)
            .ok_or_else(|| {
                BridgeError::InvalidResponse(format!("Market order on {} did not open a trade", pair))
            })
    }

    #[instrument(skip(self))]
    async fn create_order(
        &self,
        side: Side,
        units: u64,
        pair: CurrencyPair,
        limit_price: Decimal,
    ) -> Result<TradeId> {
        let url = self.account_url("/orders");
        let expiry = limit_order_expiry(Utc::now()).to_rfc3339_opts(SecondsFormat::Secs, true);
        debug!("Placing limit order at: {} (expiry {})", url, expiry);

        let form = [
            ("instrument", pair.to_string()),
            ("units", units.to_string()),
            ("side", side.to_string()),
            ("type", "limit".to_string()),
            ("price", limit_price.to_string()),
            ("expiry", expiry),
        ];
        let response: OrderResponse = self.send_json(self.client.post(&url).form(&form)).await?;

        response
            .order_opened
            .and_then(|o| o.id)
            .ok_or_else(|| {
                BridgeError::InvalidResponse(format!("Limit order on {} was not accepted", pair))
            })
    }

    #[instrument(skip(self))]
    async fn get_open_trades(&self, pair: Option<CurrencyPair>) -> Result<Vec<RemoteTrade>> {
        let url = self.account_url("/trades");
        debug!("Fetching trades from: {}", url);

        let query: Vec<(&str, String)> = match pair {
            Some(p) => vec![
                ("instrument", p.to_string()),
                ("count", TRADES_PER_PAIR.to_string()),
            ],
            None => vec![("count", MAX_PAGE.to_string())],
        };
        let response: TradesResponse = self.send_json(self.client.get(&url).query(&query)).await?;

        response
            .trades
            .into_iter()
            .map(TradeEntry::into_remote)
            .collect()
    }

    #[instrument(skip(self))]
    async fn get_pending_orders(&self, pair: CurrencyPair) -> Result<Vec<PendingOrder>> {
        let url = self.account_url("/orders");
        debug!("Fetching orders from: {}", url);

        let query = [
            ("instrument", pair.to_string()),
            ("count", MAX_PAGE.to_string()),
        ];
        let response: OrdersResponse = self.send_json(self.client.get(&url).query(&query)).await?;

        response
            .orders
            .into_iter()
            .map(OrderEntry::into_pending)
            .collect()
    }

    #[instrument(skip(self))]
    async fn close_trade(&self, id: TradeId) -> Result<()> {
        let url = self.account_url(&format!("/trades/{}", id));
        debug!("Closing trade at: {}", url);
        self.send(self.client.delete(&url)).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_order(&self, id: TradeId) -> Result<()> {
        let url = self.account_url(&format!("/orders/{}", id));
        debug!("Deleting order at: {}", url);
        self.send(self.client.delete(&url)).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn modify_trade(
        &self,
        id: TradeId,
        stop_loss: Decimal,
        trailing_stop: Option<Decimal>,
    ) -> Result<()> {
        let url = self.account_url(&format!("/trades/{}", id));
        debug!("Modifying trade at: {}", url);
        let form = stop_form(stop_loss, trailing_stop);
        self.send(self.patch(&url).form(&form)).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn modify_order(
        &self,
        id: TradeId,
        stop_loss: Decimal,
        trailing_stop: Option<Decimal>,
    ) -> Result<()> {
        let url = self.account_url(&format!("/orders/{}", id));
        debug!("Modifying order at: {}", url);
        let form = stop_form(stop_loss, trailing_stop);
        self.send(self.patch(&url).form(&form)).await?;
        Ok(())
    }
}
