//! Signal Bridge Library
//!
//! Turns third-party forex trade-signal notifications into brokerage orders.
//! Three strategies trade independent accounts from the same signals: an
//! exact copy, a risk-normalised copy that stacks additions under one stop,
//! and an inverse copy whose stops are promoted on a timer.

pub mod bridge;
pub mod broker;
pub mod common;
pub mod config;
pub mod oanda;
pub mod strategy;

// Re-export commonly used types
pub use common::errors::{BridgeError, EngineError, FatalError, Result};
pub use common::traits::{BrokerGateway, SignalSource};
pub use common::types::{
    Currency, CurrencyPair, ProviderAction, Quote, RemoteTrade, Side, SignalBundle, TradeSignal,
};
pub use config::types::AppConfig;

pub use bridge::{BridgeService, Dispatcher, OperatorCommand, TcpSignalSource};
pub use broker::{OrderExecutor, PaperBroker};
pub use oanda::OandaRestClient;

// Strategy types
pub use strategy::{
    BoxedEngine, CopyEngine, Decision, PairState, PairStateStore, ReverseEngine, SmartCopyEngine,
    StrategyEngine, TieredStopPromoter, TradeIntent,
};
