//! Exact-copy strategy
//!
//! Mirrors the provider at a fixed multiple of the proportional size. Keeps no
//! state of its own: every `Open` is evaluated afresh and every `Close`
//! flattens whatever the account holds on the pair.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::broker::OrderExecutor;
use crate::common::errors::EngineError;
use crate::common::traits::BrokerGateway;
use crate::common::types::{ProviderAction, TradeSignal};
use crate::config::{CopyConfig, ProviderConfig};
use crate::strategy::pip_math::PipMath;
use crate::strategy::position_sizer::PositionSizer;
use crate::strategy::traits::StrategyEngine;
use crate::strategy::types::{BrokerOperation, Decision, TradeIntent};

pub struct CopyEngine {
    config: CopyConfig,
    sizer: PositionSizer,
    executor: OrderExecutor,
    /// Serialises signal handling
    turn: Mutex<()>,
}

impl CopyEngine {
    pub const NAME: &'static str = "copy";

    pub fn new(config: CopyConfig, provider: ProviderConfig, gateway: Arc<dyn BrokerGateway>) -> Self {
        Self {
            config,
            sizer: PositionSizer::new(provider),
            executor: OrderExecutor::new(gateway, Self::NAME),
            turn: Mutex::new(()),
        }
    }

    async fn open(&self, signal: &TradeSignal) -> crate::common::errors::Result<Decision> {
        let gateway = self.executor.gateway();
        let pair = signal.pair;

        let quote = gateway.get_price(pair).await?;
        let current = quote.entry_price(signal.side);
        let diff = PipMath::distance_pips(pair, current, signal.provider_price);

        if !PipMath::entry_acceptable(
            pair,
            signal.side,
            current,
            signal.provider_price,
            self.config.max_pip_diff,
        ) {
            warn!(
                strategy = Self::NAME,
                %pair,
                side = %signal.side,
                %current,
                provider_price = %signal.provider_price,
                pip_diff = %diff,
                "Missed opportunity, price moved too far"
            );
            return Ok(Decision::no_go(format!("price moved {} pips", diff)));
        }

        let balance = self.sizer.account(gateway).await?.balance;
        let units = self.sizer.size(gateway, signal.size, balance).await? * self.config.multiplier;
        if units == 0 {
            info!(strategy = Self::NAME, %pair, %balance, "Sized position is zero units, skipping");
            return Ok(Decision::no_go("sized position is zero units"));
        }

        let intent = TradeIntent::single(
            BrokerOperation::OpenTrade {
                side: signal.side,
                units,
                pair,
                stop_loss: None,
            },
            format!("copy {} {} {} (pip diff {})", signal.side, units, pair, diff),
        );
        self.executor.execute(&intent).await?;
        Ok(Decision::Go(intent))
    }

    async fn close(&self, signal: &TradeSignal) -> crate::common::errors::Result<Decision> {
        let pair = signal.pair;
        let trades = self.executor.gateway().get_open_trades(Some(pair)).await?;
        if trades.is_empty() {
            info!(strategy = Self::NAME, %pair, "Provider closed but no trades are open here");
            return Ok(Decision::no_go("no open trades"));
        }

        let intent = TradeIntent::multi(
            trades
                .iter()
                .map(|t| BrokerOperation::CloseTrade { id: t.id, pair })
                .collect(),
            format!("provider closed {}", pair),
        );
        self.executor.execute(&intent).await?;
        Ok(Decision::Go(intent))
    }
}

#[async_trait]
impl StrategyEngine for CopyEngine {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn handle(&self, signal: &TradeSignal) -> Result<Decision, EngineError> {
        let _turn = self.turn.lock().await;
        let decision = match signal.action {
            ProviderAction::Open => self.open(signal).await?,
            ProviderAction::Close => self.close(signal).await?,
        };
        Ok(decision)
    }
}
