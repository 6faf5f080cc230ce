//! Common test utilities and fixtures
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use signal_bridge::broker::PaperBroker;
use signal_bridge::common::types::{CurrencyPair, ProviderAction, Side, TradeSignal};

/// Balance of every paper account in these tests, in AUD
pub const BALANCE: Decimal = dec!(10000);

pub fn pair(s: &str) -> CurrencyPair {
    s.parse().expect("valid pair")
}

pub fn open(side: Side, size: u64, pair: CurrencyPair, price: Decimal) -> TradeSignal {
    TradeSignal::new(ProviderAction::Open, side, size, pair, price)
}

pub fn close(side: Side, size: u64, pair: CurrencyPair, price: Decimal) -> TradeSignal {
    TradeSignal::new(ProviderAction::Close, side, size, pair, price)
}

/// Paper account with round-number prices
///
/// AUD_USD at 0.75 makes 160 provider units worth one local unit. GBP_USD at
/// 1.25 with GBP_AUD at 2.5, and EUR_USD at 1.25 with EUR_AUD at 2.0, give
/// exact pip values of 0.0002 and 0.00016 AUD per unit.
pub async fn paper_broker() -> Arc<PaperBroker> {
    let broker = Arc::new(PaperBroker::new(BALANCE));
    for (name, price) in [
        ("AUD_USD", dec!(0.75)),
        ("GBP_USD", dec!(1.25)),
        ("GBP_AUD", dec!(2.5)),
        ("EUR_USD", dec!(1.25)),
        ("EUR_AUD", dec!(2.0)),
    ] {
        broker.set_price(pair(name), price, price).await;
    }
    broker
}

/// A state file path unique to this process and test
pub fn temp_state_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "signal_bridge_{}_{}.json",
        name,
        std::process::id()
    ))
}

/// Sample Oanda v1 responses
pub mod api_responses {
    pub const PRICES: &str = r#"{"prices":[
        {"instrument":"EUR_USD","time":"2015-12-03T10:00:00.000000Z","bid":1.0612,"ask":1.06138}
    ]}"#;

    pub const ACCOUNT: &str = r#"{
        "accountId": 8954947,
        "accountName": "Primary",
        "balance": 10000.5,
        "unrealizedPl": 0,
        "realizedPl": 0,
        "marginUsed": 0,
        "marginAvail": 10000.5,
        "openTrades": 0,
        "openOrders": 0,
        "marginRate": 0.05,
        "accountCurrency": "AUD"
    }"#;

    pub const MARKET_ORDER: &str = r#"{
        "instrument": "EUR_USD",
        "time": "2015-12-03T10:00:00.000000Z",
        "price": 1.06138,
        "tradeOpened": {"id": 175517237, "units": 2, "side": "buy", "takeProfit": 0, "stopLoss": 0, "trailingStop": 0},
        "tradesClosed": [],
        "tradeReduced": {}
    }"#;

    pub const LIMIT_ORDER: &str = r#"{
        "instrument": "EUR_USD",
        "time": "2015-12-03T10:00:00.000000Z",
        "price": 1.05,
        "orderOpened": {"id": 175517300, "units": 2, "side": "sell", "expiry": "2016-01-06T12:00:00Z"}
    }"#;

    pub const TRADES: &str = r#"{"trades":[
        {"id":175427639,"units":2,"side":"buy","instrument":"EUR_USD","time":"2015-12-03T10:00:00Z",
         "price":1.0612,"takeProfit":0,"stopLoss":1.0587,"trailingStop":0,"trailingAmount":0}
    ]}"#;

    pub const ORDERS: &str = r#"{"orders":[
        {"id":175517300,"units":2,"side":"sell","instrument":"EUR_USD","time":"2015-12-03T10:00:00Z",
         "type":"limit","price":1.05,"takeProfit":0,"stopLoss":1.055,"expiry":"2016-01-06T12:00:00Z",
         "upperBound":0,"lowerBound":0,"trailingStop":0}
    ]}"#;

    pub const ERROR: &str = r#"{"code":4,"message":"The access token provided does not allow this request to be made","moreInfo":"http://developer.oanda.com/docs/v1/auth/#overview"}"#;
}
