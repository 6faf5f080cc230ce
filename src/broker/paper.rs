//! In-memory brokerage for dry runs and tests

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::common::errors::{BridgeError, Result};
use crate::common::traits::BrokerGateway;
use crate::common::types::{
    Currency, CurrencyPair, PendingOrder, Quote, RemoteTrade, Side, TradeId,
};
use crate::strategy::PipMath;

/// Rough value of one unit of each currency in USD, used to seed dry-run prices
const SEED_USD_VALUES: [(Currency, Decimal); 8] = [
    (Currency::AUD, dec!(0.66)),
    (Currency::CAD, dec!(0.73)),
    (Currency::CHF, dec!(1.12)),
    (Currency::EUR, dec!(1.08)),
    (Currency::GBP, dec!(1.27)),
    (Currency::JPY, dec!(0.0067)),
    (Currency::NZD, dec!(0.61)),
    (Currency::USD, dec!(1)),
];

#[derive(Debug, Default)]
struct PaperState {
    balance: Decimal,
    prices: HashMap<CurrencyPair, Quote>,
    trades: BTreeMap<TradeId, RemoteTrade>,
    orders: BTreeMap<TradeId, PendingOrder>,
    next_id: TradeId,
    calls: Vec<String>,
    failing: HashSet<&'static str>,
}

impl PaperState {
    fn record(&mut self, call: &'static str) -> Result<()> {
        self.calls.push(call.to_string());
        if self.failing.contains(call) {
            return Err(BridgeError::InvalidResponse(format!(
                "paper broker: injected failure in {}",
                call
            )));
        }
        Ok(())
    }

    fn allocate_id(&mut self) -> TradeId {
        self.next_id += 1;
        self.next_id
    }

    fn quote(&self, pair: CurrencyPair) -> Result<Quote> {
        self.prices
            .get(&pair)
            .copied()
            .ok_or_else(|| BridgeError::InvalidResponse(format!("no price for {}", pair)))
    }
}

/// Simulated brokerage account
///
/// Trades fill instantly at the current quote. Prices only move when set.
/// Individual calls can be made to fail to exercise error paths.
#[derive(Debug, Default)]
pub struct PaperBroker {
    state: Mutex<PaperState>,
}

impl PaperBroker {
    pub fn new(balance: Decimal) -> Self {
        Self {
            state: Mutex::new(PaperState {
                balance,
                next_id: 1000,
                ..PaperState::default()
            }),
        }
    }

    /// A paper account with plausible quotes on every supported pair
    pub fn with_seed_prices(balance: Decimal) -> Self {
        let usd_value = |c: Currency| {
            SEED_USD_VALUES
                .iter()
                .find(|(currency, _)| *currency == c)
                .map(|(_, v)| *v)
                .unwrap_or(Decimal::ONE)
        };

        let mut prices = HashMap::new();
        for pair in CurrencyPair::all() {
            let mid = usd_value(pair.base()) / usd_value(pair.quote());
            let half_spread = PipMath::to_price(pair, dec!(0.8));
            prices.insert(
                pair,
                Quote::new(
                    PipMath::round_price(pair, mid + half_spread),
                    PipMath::round_price(pair, mid - half_spread),
                ),
            );
        }

        Self {
            state: Mutex::new(PaperState {
                balance,
                prices,
                next_id: 1000,
                ..PaperState::default()
            }),
        }
    }

    pub async fn set_price(&self, pair: CurrencyPair, ask: Decimal, bid: Decimal) {
        self.state.lock().await.prices.insert(pair, Quote::new(ask, bid));
    }

    pub async fn set_balance(&self, balance: Decimal) {
        self.state.lock().await.balance = balance;
    }

    /// Insert a trade directly, as if opened earlier or by hand
    pub async fn seed_trade(
        &self,
        pair: CurrencyPair,
        side: Side,
        units: u64,
        open_price: Decimal,
        stop_loss: Option<Decimal>,
        trailing_stop: Option<Decimal>,
    ) -> TradeId {
        let mut state = self.state.lock().await;
        let id = state.allocate_id();
        state.trades.insert(
            id,
            RemoteTrade {
                id,
                pair,
                side,
                units,
                open_price,
                stop_loss,
                trailing_stop,
            },
        );
        id
    }

    /// Remove a trade without a close call, as a stop-out would
    pub async fn stop_out(&self, id: TradeId) -> Option<RemoteTrade> {
        let removed = self.state.lock().await.trades.remove(&id);
        if let Some(trade) = &removed {
            info!(pair = %trade.pair, trade_id = id, "Paper trade stopped out");
        }
        removed
    }

    /// Turn a resting order into a trade at its limit price
    pub async fn fill_order(&self, id: TradeId) -> Option<TradeId> {
        let mut state = self.state.lock().await;
        let order = state.orders.remove(&id)?;
        let trade_id = state.allocate_id();
        state.trades.insert(
            trade_id,
            RemoteTrade {
                id: trade_id,
                pair: order.pair,
                side: order.side,
                units: order.units,
                open_price: order.price,
                stop_loss: order.stop_loss,
                trailing_stop: None,
            },
        );
        Some(trade_id)
    }

    /// Make every future call to `method` fail, e.g. `"modify_trade"`
    pub async fn fail_calls(&self, method: &'static str) {
        self.state.lock().await.failing.insert(method);
    }

    pub async fn clear_failures(&self) {
        self.state.lock().await.failing.clear();
    }

    /// Gateway method names called so far, in order
    pub async fn calls(&self) -> Vec<String> {
        self.state.lock().await.calls.clone()
    }

    /// Number of calls that change account state
    pub async fn mutating_calls(&self) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| !c.starts_with("get_"))
            .count()
    }

    pub async fn trades(&self) -> Vec<RemoteTrade> {
        self.state.lock().await.trades.values().cloned().collect()
    }

    pub async fn orders(&self) -> Vec<PendingOrder> {
        self.state.lock().await.orders.values().cloned().collect()
    }
}

#[async_trait]
impl BrokerGateway for PaperBroker {
    async fn get_price(&self, pair: CurrencyPair) -> Result<Quote> {
        let mut state = self.state.lock().await;
        state.record("get_price")?;
        state.quote(pair)
    }

    async fn get_account_balance(&self) -> Result<Decimal> {
        let mut state = self.state.lock().await;
        state.record("get_account_balance")?;
        Ok(state.balance)
    }

    async fn open_trade(&self, side: Side, units: u64, pair: CurrencyPair) -> Result<TradeId> {
        let mut state = self.state.lock().await;
        state.record("open_trade")?;
        if units == 0 {
            return Err(BridgeError::InvalidInput("units must be positive".to_string()));
        }
        let open_price = state.quote(pair)?.entry_price(side);
        let id = state.allocate_id();
        state.trades.insert(
            id,
            RemoteTrade {
                id,
                pair,
                side,
                units,
                open_price,
                stop_loss: None,
                trailing_stop: None,
            },
        );
        debug!(%pair, %side, units, %open_price, trade_id = id, "Paper trade opened");
        Ok(id)
    }

    async fn create_order(
        &self,
        side: Side,
        units: u64,
        pair: CurrencyPair,
        limit_price: Decimal,
    ) -> Result<TradeId> {
        let mut state = self.state.lock().await;
        state.record("create_order")?;
        if units == 0 {
            return Err(BridgeError::InvalidInput("units must be positive".to_string()));
        }
        let id = state.allocate_id();
        state.orders.insert(
            id,
            PendingOrder {
                id,
                pair,
                side,
                units,
                price: limit_price,
                stop_loss: None,
            },
        );
        Ok(id)
    }

    async fn get_open_trades(&self, pair: Option<CurrencyPair>) -> Result<Vec<RemoteTrade>> {
        let mut state = self.state.lock().await;
        state.record("get_open_trades")?;
        Ok(state
            .trades
            .values()
            .filter(|t| pair.map_or(true, |p| t.pair == p))
            .cloned()
            .collect())
    }

    async fn get_pending_orders(&self, pair: CurrencyPair) -> Result<Vec<PendingOrder>> {
        let mut state = self.state.lock().await;
        state.record("get_pending_orders")?;
        Ok(state
            .orders
            .values()
            .filter(|o| o.pair == pair)
            .cloned()
            .collect())
    }

    async fn close_trade(&self, id: TradeId) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record("close_trade")?;
        state
            .trades
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| BridgeError::InvalidResponse(format!("no trade {}", id)))
    }

    async fn delete_order(&self, id: TradeId) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record("delete_order")?;
        state
            .orders
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| BridgeError::InvalidResponse(format!("no order {}", id)))
    }

    async fn modify_trade(
        &self,
        id: TradeId,
        stop_loss: Decimal,
        trailing_stop: Option<Decimal>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record("modify_trade")?;
        let trade = state
            .trades
            .get_mut(&id)
            .ok_or_else(|| BridgeError::InvalidResponse(format!("no trade {}", id)))?;
        trade.stop_loss = Some(stop_loss);
        if trailing_stop.is_some() {
            trade.trailing_stop = trailing_stop;
        }
        Ok(())
    }

    async fn modify_order(
        &self,
        id: TradeId,
        stop_loss: Decimal,
        _trailing_stop: Option<Decimal>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record("modify_order")?;
        let order = state
            .orders
            .get_mut(&id)
            .ok_or_else(|| BridgeError::InvalidResponse(format!("no order {}", id)))?;
        order.stop_loss = Some(stop_loss);
        Ok(())
    }
}
