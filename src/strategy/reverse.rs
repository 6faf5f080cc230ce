//! Inverse copy strategy
//!
//! Takes the opposite side of the provider's first entry on a pair, sized by
//! a flat pip stop, and leaves the trade to its stop. The promoter moves that
//! stop as the trade runs and notices stop-outs. The operator may also
//! "unreverse" a pair, trading it in the provider's direction until the
//! provider closes it.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{error, info, warn};

use crate::broker::OrderExecutor;
use crate::common::errors::{EngineError, Result};
use crate::common::traits::BrokerGateway;
use crate::common::types::{CurrencyPair, ProviderAction, Side, TradeSignal};
use crate::config::{ProviderConfig, ReverseConfig};
use crate::strategy::pip_math::PipMath;
use crate::strategy::position_sizer::PositionSizer;
use crate::strategy::state_store::{PairState, PairStateStore, SharedStore};
use crate::strategy::traits::StrategyEngine;
use crate::strategy::types::{BrokerOperation, Decision, TradeIntent};

type EngineResult<T> = std::result::Result<T, EngineError>;

pub struct ReverseEngine {
    config: ReverseConfig,
    sizer: PositionSizer,
    executor: OrderExecutor,
    store: SharedStore,
}

impl ReverseEngine {
    pub const NAME: &'static str = "reverse";

    pub fn new(
        config: ReverseConfig,
        provider: ProviderConfig,
        gateway: Arc<dyn BrokerGateway>,
        store: SharedStore,
    ) -> Self {
        Self {
            config,
            sizer: PositionSizer::new(provider),
            executor: OrderExecutor::new(gateway, Self::NAME),
            store,
        }
    }

    /// Store shared with the promoter
    pub fn store(&self) -> SharedStore {
        self.store.clone()
    }

    async fn open(&self, store: &mut PairStateStore, signal: &TradeSignal) -> EngineResult<Decision> {
        let pair = signal.pair;
        let gateway = self.executor.gateway();

        let live = gateway.get_open_trades(Some(pair)).await?;
        if !live.is_empty() {
            info!(strategy = Self::NAME, %pair, trades = live.len(), "Trades already open on pair, ignoring");
            return Ok(Decision::no_go("trades already open on the pair"));
        }
        if !store.mark_provider_open(pair) {
            info!(strategy = Self::NAME, %pair, "Provider addition, not mirrored");
            return Ok(Decision::no_go("provider addition"));
        }
        let state = store.get(pair);
        if state != PairState::Fresh {
            info!(strategy = Self::NAME, %pair, %state, "Pair already tracked, ignoring");
            return Ok(Decision::no_go(format!("pair already {}", state)));
        }

        let side = signal.side.opposite();
        let current = gateway.get_price(pair).await?.entry_price(side);
        let diff = PipMath::distance_pips(pair, current, signal.provider_price);
        if !PipMath::entry_acceptable(pair, side, current, signal.provider_price, self.config.max_pip_diff) {
            warn!(
                strategy = Self::NAME,
                %pair,
                %side,
                %current,
                provider_price = %signal.provider_price,
                pip_diff = %diff,
                "Missed opportunity, price moved too far"
            );
            return Ok(Decision::no_go(format!("price moved {} pips", diff)));
        }

        let balance = self.sizer.account(gateway).await?.balance;
        let value_per_pip = self.sizer.value_per_pip(gateway, pair).await?;
        let Some(units) = self.risk_units(balance, value_per_pip) else {
            info!(strategy = Self::NAME, %pair, %balance, "Sized position is zero units, skipping");
            return Ok(Decision::no_go("sized position is zero units"));
        };

        let stop_delta = PipMath::to_price(pair, self.config.initial_stop_pips) * side.direction();
        let stop_loss = PipMath::round_price(pair, current - stop_delta);

        let intent = TradeIntent::single(
            BrokerOperation::OpenTrade {
                side,
                units,
                pair,
                stop_loss: Some(stop_loss),
            },
            format!(
                "reverse provider {} with {} {} {} (pip diff {})",
                signal.side, side, units, pair, diff
            ),
        );
        self.executor.execute(&intent).await?;
        store.transition(pair, &[PairState::Fresh], PairState::Reversed)?;
        Ok(Decision::Go(intent))
    }

    /// Units risking `risk_pct` of balance over the initial stop
    fn risk_units(&self, balance: Decimal, value_per_pip: Decimal) -> Option<u64> {
        use rust_decimal::prelude::ToPrimitive;

        if value_per_pip <= Decimal::ZERO {
            return None;
        }
        let units = (balance * self.config.risk_pct / dec!(100)
            / (value_per_pip * self.config.initial_stop_pips))
            .floor();
        units.to_u64().filter(|u| *u > 0)
    }

    async fn close(&self, store: &mut PairStateStore, pair: CurrencyPair) -> Result<Decision> {
        store.mark_provider_closed(pair);
        if !store.is(pair, PairState::Unreversed) {
            return Ok(Decision::no_go("reversed trades run to their stops"));
        }

        let trades = self.executor.gateway().get_open_trades(Some(pair)).await?;
        store.clear(pair);
        if trades.is_empty() {
            error!(
                strategy = Self::NAME,
                %pair,
                "Provider closed an unreversed pair but no trades were found"
            );
            return Ok(Decision::no_go("no unreversed trades found"));
        }

        let intent = TradeIntent::multi(
            trades
                .iter()
                .map(|t| BrokerOperation::CloseTrade { id: t.id, pair })
                .collect(),
            format!("provider closed unreversed {}", pair),
        );
        self.executor.execute(&intent).await?;
        Ok(Decision::Go(intent))
    }

    /// Reasons an unreverse of `units` on `pair` is refused, empty if allowed
    fn unreverse_refusals(
        &self,
        store: &PairStateStore,
        pair: CurrencyPair,
        units: u64,
        additional: bool,
    ) -> Vec<String> {
        let mut reasons = Vec::new();
        if !store.is_provider_open(pair) {
            reasons.push(format!("{} is not currently open on the provider", pair));
        }
        if store.is(pair, PairState::Unreversed) && !additional {
            reasons.push(format!("{} has already been unreversed", pair));
        }
        if units == 0 {
            reasons.push("unreverse size must be positive".to_string());
        }
        if units > self.config.max_unreverse_units {
            reasons.push(format!(
                "unreverse size cannot exceed {} units",
                self.config.max_unreverse_units
            ));
        }
        reasons
    }

    /// Check the unreverse rules against current state
    pub async fn can_unreverse(
        &self,
        pair: CurrencyPair,
        units: u64,
        additional: bool,
    ) -> std::result::Result<(), Vec<String>> {
        let store = self.store.lock().await;
        let reasons = self.unreverse_refusals(&store, pair, units, additional);
        if reasons.is_empty() {
            Ok(())
        } else {
            Err(reasons)
        }
    }

    /// Operator-requested trade in the provider's direction
    ///
    /// The rules are checked and the trade placed inside one critical section,
    /// so a refused request never reaches the brokerage.
    pub async fn open_unreverse(
        &self,
        side: Side,
        units: u64,
        pair: CurrencyPair,
        additional: bool,
    ) -> EngineResult<Decision> {
        let mut store = self.store.lock().await;

        let reasons = self.unreverse_refusals(&store, pair, units, additional);
        if !reasons.is_empty() {
            info!(strategy = Self::NAME, %pair, reasons = %reasons.join("; "), "Unreverse refused");
            return Ok(Decision::no_go(reasons.join("; ")));
        }

        let intent = TradeIntent::single(
            BrokerOperation::OpenTrade {
                side,
                units,
                pair,
                stop_loss: None,
            },
            format!("unreverse {} {} {}", side, units, pair),
        );
        self.executor.execute(&intent).await?;
        store.transition(
            pair,
            &[PairState::Fresh, PairState::Reversed, PairState::Unreversed],
            PairState::Unreversed,
        )?;
        Ok(Decision::Go(intent))
    }

    /// Round-trip a one-unit trade to prove the account is reachable
    pub async fn connectivity_test(&self) -> Result<()> {
        let gateway = self.executor.gateway();
        let pair = CurrencyPair::EUR_USD;
        let id = gateway.open_trade(Side::Buy, 1, pair).await?;
        info!(strategy = Self::NAME, %pair, trade_id = id, "Connectivity test trade opened");
        gateway.close_trade(id).await?;
        info!(strategy = Self::NAME, %pair, trade_id = id, "Connectivity test trade closed");
        Ok(())
    }
}

#[async_trait]
impl StrategyEngine for ReverseEngine {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn handle(&self, signal: &TradeSignal) -> EngineResult<Decision> {
        let mut store = self.store.lock().await;
        match signal.action {
            ProviderAction::Open => self.open(&mut store, signal).await,
            ProviderAction::Close => Ok(self.close(&mut store, signal.pair).await?),
        }
    }

    async fn persist(&self) -> Result<()> {
        self.store.lock().await.save()
    }

    async fn status(&self) -> String {
        format!("{}: {}", Self::NAME, self.store.lock().await.summary())
    }
}
