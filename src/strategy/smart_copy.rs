//! Risk-normalised copy strategy
//!
//! Follows the provider at a multiple of the proportional size, but sizes the
//! stop-loss from a fixed share of the local balance. Additions on a pair that
//! is already open are stacked under one shared stop; a pair whose trades
//! disappear between signals is treated as stopped out and blacklisted until
//! the provider closes it.
//!
//! Per pair: `Fresh -> Open -> {Blacklisted | Fresh}`.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{error, info, warn};

use crate::broker::OrderExecutor;
use crate::common::errors::{BridgeError, EngineError, FatalError, Result};
use crate::common::traits::BrokerGateway;
use crate::common::types::{CurrencyPair, ProviderAction, RemoteTrade, TradeSignal};
use crate::config::{ProviderConfig, SmartCopyConfig};
use crate::strategy::pip_math::PipMath;
use crate::strategy::position_sizer::PositionSizer;
use crate::strategy::stacker::{self, StackLimits, StackOutcome, StackRequest};
use crate::strategy::state_store::{PairState, PairStateStore, SharedStore};
use crate::strategy::traits::StrategyEngine;
use crate::strategy::types::{BrokerOperation, Decision, TradeIntent};

type EngineResult<T> = std::result::Result<T, EngineError>;

pub struct SmartCopyEngine {
    config: SmartCopyConfig,
    sizer: PositionSizer,
    executor: OrderExecutor,
    store: SharedStore,
}

impl SmartCopyEngine {
    pub const NAME: &'static str = "smart_copy";

    pub fn new(
        config: SmartCopyConfig,
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

    pub fn store(&self) -> SharedStore {
        self.store.clone()
    }

    fn limits(&self) -> StackLimits {
        StackLimits {
            risk_pct: self.config.risk_pct,
            max_increase_pct: self.config.max_stack_risk_increase_pct,
            min_gap_pips: self.config.min_stop_gap_pips,
        }
    }

    /// Sized and multiplied local units for the signal, or `None` for zero
    async fn local_units(&self, signal: &TradeSignal, balance: Decimal) -> Result<Option<u64>> {
        let units = self
            .sizer
            .size(self.executor.gateway(), signal.size, balance)
            .await?
            * self.config.multiplier;
        if units == 0 {
            info!(strategy = Self::NAME, pair = %signal.pair, %balance, "Sized position is zero units, skipping");
            return Ok(None);
        }
        Ok(Some(units))
    }

    async fn open(&self, store: &mut PairStateStore, signal: &TradeSignal) -> EngineResult<Decision> {
        let pair = signal.pair;
        match store.get(pair) {
            PairState::Blacklisted => {
                info!(strategy = Self::NAME, %pair, "Pair is blacklisted, ignoring provider addition");
                Ok(Decision::no_go("pair is blacklisted"))
            }
            PairState::Open => self.open_while_open(store, signal).await,
            PairState::Fresh => self.open_fresh(store, signal).await,
            other => Err(FatalError::InvariantViolation(format!(
                "{} tracked as {} by the smart-copy strategy",
                pair, other
            ))
            .into()),
        }
    }

    async fn open_while_open(
        &self,
        store: &mut PairStateStore,
        signal: &TradeSignal,
    ) -> EngineResult<Decision> {
        let pair = signal.pair;
        let gateway = self.executor.gateway();

        let trades = gateway.get_open_trades(Some(pair)).await?;
        if !trades.is_empty() {
            return Ok(self.stack(signal, &trades).await?);
        }

        let orders = gateway.get_pending_orders(pair).await?;
        if !orders.is_empty() {
            warn!(
                strategy = Self::NAME,
                %pair,
                orders = orders.len(),
                "Limit order still resting, ignoring provider addition"
            );
            return Ok(Decision::no_go("entry order has not filled yet"));
        }

        store.transition(pair, &[PairState::Open], PairState::Blacklisted)?;
        info!(
            strategy = Self::NAME,
            %pair,
            "No trades left on an open pair, assuming stop-out and blacklisting"
        );
        Ok(Decision::no_go("position was stopped out, pair blacklisted"))
    }

    async fn stack(&self, signal: &TradeSignal, trades: &[RemoteTrade]) -> Result<Decision> {
        let pair = signal.pair;
        let gateway = self.executor.gateway();

        let balance = self.sizer.account(gateway).await?.balance;
        let Some(units) = self.local_units(signal, balance).await? else {
            return Ok(Decision::no_go("sized position is zero units"));
        };
        let price = gateway.get_price(pair).await?.entry_price(signal.side);
        let value_per_pip = self.sizer.value_per_pip(gateway, pair).await?;

        let request = StackRequest {
            pair,
            side: signal.side,
            trades,
            candidate_units: units,
            price,
            value_per_pip,
            balance,
        };

        match stacker::stack(&request, &self.limits())? {
            StackOutcome::Rejected {
                attempted_stop,
                previous_stop,
                gap_pips,
            } => {
                info!(
                    strategy = Self::NAME,
                    %pair,
                    %attempted_stop,
                    %previous_stop,
                    %gap_pips,
                    "Shared stop cannot widen within the risk cap and gap, rejecting addition"
                );
                Ok(Decision::no_go(format!(
                    "stacked stop {} would sit {} pips from price",
                    attempted_stop, gap_pips
                )))
            }
            StackOutcome::Accepted {
                stop_loss,
                previous_stop,
                aggregate_risk,
                cap,
            } => {
                let mut operations: Vec<BrokerOperation> = trades
                    .iter()
                    .map(|t| BrokerOperation::ModifyTrade {
                        id: t.id,
                        pair,
                        stop_loss,
                        trailing_stop: None,
                    })
                    .collect();
                operations.push(BrokerOperation::OpenTrade {
                    side: signal.side,
                    units,
                    pair,
                    stop_loss: Some(stop_loss),
                });
                let intent = TradeIntent::multi(
                    operations,
                    format!(
                        "stack {} {} onto {} trades, stop {} -> {} (risk {} of {})",
                        units,
                        pair,
                        trades.len(),
                        previous_stop,
                        stop_loss,
                        aggregate_risk.round_dp(2),
                        cap.round_dp(2)
                    ),
                );

                if let Err(e) = self.executor.execute(&intent).await {
                    error!(
                        strategy = Self::NAME,
                        %pair,
                        %stop_loss,
                        %previous_stop,
                        "Shared stop update may be partial, reconcile the pair by hand"
                    );
                    return Err(e);
                }
                Ok(Decision::Go(intent))
            }
        }
    }

    async fn open_fresh(&self, store: &mut PairStateStore, signal: &TradeSignal) -> EngineResult<Decision> {
        let pair = signal.pair;
        let side = signal.side;
        let gateway = self.executor.gateway();

        let orders = gateway.get_pending_orders(pair).await?;
        if !orders.is_empty() {
            return Err(BridgeError::UnexpectedPendingOrder(format!(
                "{} has {} resting orders but is not tracked",
                pair,
                orders.len()
            ))
            .into());
        }

        let balance = self.sizer.account(gateway).await?.balance;
        let Some(units) = self.local_units(signal, balance).await? else {
            return Ok(Decision::no_go("sized position is zero units"));
        };
        let value_per_pip = self.sizer.value_per_pip(gateway, pair).await?;
        let stop_pips = (balance * self.config.risk_pct / dec!(100)
            / (value_per_pip * Decimal::from(units)))
        .floor();
        if stop_pips < Decimal::ONE {
            info!(
                strategy = Self::NAME,
                %pair,
                units,
                %balance,
                "Risk budget allows less than one pip of stop, skipping"
            );
            return Ok(Decision::no_go("stop-loss distance below one pip"));
        }
        let stop_delta = PipMath::to_price(pair, stop_pips) * side.direction();

        let current = gateway.get_price(pair).await?.entry_price(side);
        let diff = PipMath::distance_pips(pair, current, signal.provider_price);

        let operation = if PipMath::entry_acceptable(
            pair,
            side,
            current,
            signal.provider_price,
            self.config.max_pip_diff,
        ) {
            BrokerOperation::OpenTrade {
                side,
                units,
                pair,
                stop_loss: Some(PipMath::round_price(pair, current - stop_delta)),
            }
        } else {
            let offset = PipMath::to_price(pair, self.config.limit_offset_pips) * side.direction();
            let limit_price = PipMath::round_price(pair, signal.provider_price - offset);
            info!(
                strategy = Self::NAME,
                %pair,
                %current,
                provider_price = %signal.provider_price,
                pip_diff = %diff,
                %limit_price,
                "Price moved, resting a limit order instead"
            );
            BrokerOperation::CreateOrder {
                side,
                units,
                pair,
                limit_price,
                stop_loss: Some(PipMath::round_price(pair, limit_price - stop_delta)),
            }
        };

        let intent = TradeIntent::single(
            operation,
            format!(
                "new {} {} {} with {} pip stop (pip diff {})",
                side, units, pair, stop_pips, diff
            ),
        );
        self.executor.execute(&intent).await?;
        store.transition(pair, &[PairState::Fresh], PairState::Open)?;
        Ok(Decision::Go(intent))
    }

    async fn close(&self, store: &mut PairStateStore, pair: CurrencyPair) -> EngineResult<Decision> {
        let gateway = self.executor.gateway();
        let trades = gateway.get_open_trades(Some(pair)).await?;
        let orders = gateway.get_pending_orders(pair).await?;

        let operations: Vec<BrokerOperation> = trades
            .iter()
            .map(|t| BrokerOperation::CloseTrade { id: t.id, pair })
            .chain(orders.iter().map(|o| BrokerOperation::DeleteOrder { id: o.id, pair }))
            .collect();

        if operations.is_empty() {
            let previous = store.clear(pair);
            info!(strategy = Self::NAME, %pair, %previous, "Provider closed, nothing left to close");
            return Ok(Decision::no_go("nothing open on the pair"));
        }

        let intent = TradeIntent::multi(operations, format!("provider closed {}", pair));
        self.executor.execute(&intent).await?;
        let previous = store.clear(pair);
        info!(strategy = Self::NAME, %pair, %previous, "Pair flattened and reset");
        Ok(Decision::Go(intent))
    }
}

#[async_trait]
impl StrategyEngine for SmartCopyEngine {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn handle(&self, signal: &TradeSignal) -> EngineResult<Decision> {
        let mut store = self.store.lock().await;
        match signal.action {
            ProviderAction::Open => self.open(&mut store, signal).await,
            ProviderAction::Close => self.close(&mut store, signal.pair).await,
        }
    }

    async fn persist(&self) -> Result<()> {
        self.store.lock().await.save()
    }

    async fn status(&self) -> String {
        format!("{}: {}", Self::NAME, self.store.lock().await.summary())
    }
}
