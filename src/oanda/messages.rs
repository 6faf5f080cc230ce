//! Oanda v1 REST message types

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::common::errors::Result;
use crate::common::types::{CurrencyPair, PendingOrder, Quote, RemoteTrade, Side, TradeId};

/// Response from `GET /v1/prices`
#[derive(Debug, Clone, Deserialize)]
pub struct PricesResponse {
    pub prices: Vec<PriceEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceEntry {
    pub instrument: String,
    #[serde(default)]
    pub time: Option<String>,
    pub bid: Decimal,
    pub ask: Decimal,
}

impl From<&PriceEntry> for Quote {
    fn from(entry: &PriceEntry) -> Self {
        Quote::new(entry.ask, entry.bid)
    }
}

/// Response from `GET /v1/accounts/{id}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountResponse {
    #[serde(default)]
    pub account_id: Option<u64>,
    pub balance: Decimal,
    #[serde(default)]
    pub account_currency: Option<String>,
}

/// Response from `POST /v1/accounts/{id}/orders`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    #[serde(default)]
    pub instrument: Option<String>,
    #[serde(default)]
    pub price: Option<Decimal>,
    /// Present for market orders that opened a trade
    #[serde(default)]
    pub trade_opened: Option<OpenedRef>,
    /// Present for limit orders left resting
    #[serde(default)]
    pub order_opened: Option<OpenedRef>,
}

/// The part of an opened trade or order we keep
#[derive(Debug, Clone, Deserialize)]
pub struct OpenedRef {
    #[serde(default)]
    pub id: Option<TradeId>,
}

/// Response from `GET /v1/accounts/{id}/trades`
#[derive(Debug, Clone, Deserialize)]
pub struct TradesResponse {
    pub trades: Vec<TradeEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeEntry {
    pub id: TradeId,
    pub units: u64,
    pub side: Side,
    pub instrument: String,
    pub price: Decimal,
    #[serde(default)]
    pub stop_loss: Decimal,
    #[serde(default)]
    pub trailing_stop: Decimal,
}

impl TradeEntry {
    /// Zero stop and trailing values mean unset
    pub fn into_remote(self) -> Result<RemoteTrade> {
        Ok(RemoteTrade {
            id: self.id,
            pair: self.instrument.parse::<CurrencyPair>()?,
            side: self.side,
            units: self.units,
            open_price: self.price,
            stop_loss: non_zero(self.stop_loss),
            trailing_stop: non_zero(self.trailing_stop),
        })
    }
}

/// Response from `GET /v1/accounts/{id}/orders`
#[derive(Debug, Clone, Deserialize)]
pub struct OrdersResponse {
    pub orders: Vec<OrderEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderEntry {
    pub id: TradeId,
    pub units: u64,
    pub side: Side,
    pub instrument: String,
    pub price: Decimal,
    #[serde(default)]
    pub stop_loss: Decimal,
}

impl OrderEntry {
    pub fn into_pending(self) -> Result<PendingOrder> {
        Ok(PendingOrder {
            id: self.id,
            pair: self.instrument.parse::<CurrencyPair>()?,
            side: self.side,
            units: self.units,
            price: self.price,
            stop_loss: non_zero(self.stop_loss),
        })
    }
}

/// Error body Oanda returns with non-2xx statuses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub more_info: Option<String>,
}

fn non_zero(value: Decimal) -> Option<Decimal> {
    if value.is_zero() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_prices() {
        let json = r#"{"prices":[{"instrument":"EUR_USD","time":"2015-12-03T10:00:00.000000Z","bid":1.0612,"ask":1.06138}]}"#;
        let response: PricesResponse = serde_json::from_str(json).unwrap();
        let quote = Quote::from(&response.prices[0]);
        assert_eq!(quote.bid, dec!(1.0612));
        assert_eq!(quote.ask, dec!(1.06138));
    }

    #[test]
    fn test_parse_trades_with_unset_stops() {
        let json = r#"{"trades":[
            {"id":175427639,"units":2,"side":"buy","instrument":"EUR_USD","time":"2015-12-03T10:00:00Z",
             "price":1.0612,"takeProfit":0,"stopLoss":1.0587,"trailingStop":0,"trailingAmount":0},
            {"id":175427640,"units":5,"side":"sell","instrument":"USD_JPY","time":"2015-12-03T10:00:00Z",
             "price":123.01,"takeProfit":0,"stopLoss":0,"trailingStop":50,"trailingAmount":122.9}
        ]}"#;
        let response: TradesResponse = serde_json::from_str(json).unwrap();
        let trades: Vec<RemoteTrade> = response
            .trades
            .into_iter()
            .map(|t| t.into_remote().unwrap())
            .collect();

        assert_eq!(trades[0].stop_loss, Some(dec!(1.0587)));
        assert_eq!(trades[0].trailing_stop, None);
        assert_eq!(trades[1].side, Side::Sell);
        assert_eq!(trades[1].stop_loss, None);
        assert_eq!(trades[1].trailing_stop, Some(dec!(50)));
    }

    #[test]
    fn test_parse_order_responses() {
        let market = r#"{"instrument":"EUR_USD","time":"2015-12-03T10:00:00Z","price":1.0614,
            "tradeOpened":{"id":175517237,"units":2,"side":"buy","takeProfit":0,"stopLoss":0,"trailingStop":0},
            "tradesClosed":[],"tradeReduced":{}}"#;
        let response: OrderResponse = serde_json::from_str(market).unwrap();
        assert_eq!(response.trade_opened.unwrap().id, Some(175517237));

        let limit = r#"{"instrument":"EUR_USD","time":"2015-12-03T10:00:00Z","price":1.05,
            "orderOpened":{"id":175517300,"units":2,"side":"buy","expiry":"2016-01-06T12:00:00Z"}}"#;
        let response: OrderResponse = serde_json::from_str(limit).unwrap();
        assert!(response.trade_opened.is_none());
        assert_eq!(response.order_opened.unwrap().id, Some(175517300));
    }

    #[test]
    fn test_unknown_instrument_is_rejected() {
        let entry = OrderEntry {
            id: 1,
            units: 1,
            side: Side::Buy,
            instrument: "XAU_USD".to_string(),
            price: dec!(1000),
            stop_loss: Decimal::ZERO,
        };
        assert!(entry.into_pending().is_err());
    }
}
