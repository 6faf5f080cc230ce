//! Types, traits and errors shared by every module

pub mod channels;
pub mod errors;
pub mod traits;
pub mod types;

pub use errors::{BridgeError, EngineError, FatalError, Result};
pub use traits::{BrokerGateway, SignalSource};
pub use types::{
    AccountSnapshot, Currency, CurrencyPair, PendingOrder, ProviderAction, Quote, RemoteTrade,
    Side, SignalBundle, TradeId, TradeSignal,
};
