//! Trait definitions for the brokerage gateway and signal sources

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::mpsc;

use super::errors::Result;
use super::types::{CurrencyPair, PendingOrder, Quote, RemoteTrade, SignalBundle, Side, TradeId};

/// Trait for brokerage clients (Oanda, paper, etc.)
///
/// One gateway is bound to one account. Calls are made one at a time and
/// each may fail with a transport-level error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrokerGateway: Send + Sync {
    /// Current ask and bid for a pair
    async fn get_price(&self, pair: CurrencyPair) -> Result<Quote>;

    /// Account balance in the account currency
    async fn get_account_balance(&self) -> Result<Decimal>;

    /// Open a market trade, returning the new trade id
    async fn open_trade(&self, side: Side, units: u64, pair: CurrencyPair) -> Result<TradeId>;

    /// Place a resting limit order, returning the new order id
    async fn create_order(
        &self,
        side: Side,
        units: u64,
        pair: CurrencyPair,
        limit_price: Decimal,
    ) -> Result<TradeId>;

    /// Open trades, either on one pair or on the whole account
    async fn get_open_trades(&self, pair: Option<CurrencyPair>) -> Result<Vec<RemoteTrade>>;

    /// Resting orders on a pair
    async fn get_pending_orders(&self, pair: CurrencyPair) -> Result<Vec<PendingOrder>>;

    async fn close_trade(&self, id: TradeId) -> Result<()>;

    async fn delete_order(&self, id: TradeId) -> Result<()>;

    /// Set a trade's stop-loss price and optional trailing distance in pips
    ///
    /// # Arguments
    /// * `id` - Trade to modify
    /// * `stop_loss` - Absolute stop-loss price
    /// * `trailing_stop` - Trailing distance in pips, `None` leaves it unset
    async fn modify_trade(
        &self,
        id: TradeId,
        stop_loss: Decimal,
        trailing_stop: Option<Decimal>,
    ) -> Result<()>;

    /// Set a resting order's stop-loss price and optional trailing distance in pips
    async fn modify_order(
        &self,
        id: TradeId,
        stop_loss: Decimal,
        trailing_stop: Option<Decimal>,
    ) -> Result<()>;
}

/// Trait for anything that delivers parsed provider notifications
#[async_trait]
pub trait SignalSource: Send {
    /// Run until the sender is closed or the source is exhausted, forwarding
    /// each notification in arrival order
    ///
    /// # Arguments
    /// * `sender` - Channel sender for forwarding bundles
    async fn run(&mut self, sender: mpsc::Sender<SignalBundle>) -> Result<()>;

    /// Short human-readable description for logs
    fn source_name(&self) -> &'static str;
}
