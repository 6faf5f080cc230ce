//! Applies a [`TradeIntent`] through a gateway

use std::sync::Arc;

use tracing::{error, info, instrument};

use crate::common::errors::Result;
use crate::common::traits::BrokerGateway;
use crate::common::types::TradeId;
use crate::strategy::{BrokerOperation, TradeIntent};

/// What an executed intent produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionReport {
    pub opened_trades: Vec<TradeId>,
    pub created_orders: Vec<TradeId>,
    pub completed: usize,
}

/// Runs brokerage operations one after another
///
/// Opening calls that carry a stop-loss are followed by the matching
/// modify call on the id the brokerage returned.
#[derive(Clone)]
pub struct OrderExecutor {
    gateway: Arc<dyn BrokerGateway>,
    strategy: String,
}

impl OrderExecutor {
    pub fn new(gateway: Arc<dyn BrokerGateway>, strategy: impl Into<String>) -> Self {
        Self {
            gateway,
            strategy: strategy.into(),
        }
    }

    pub fn gateway(&self) -> &dyn BrokerGateway {
        self.gateway.as_ref()
    }

    /// Execute every operation in order, stopping at the first failure
    #[instrument(skip(self, intent), fields(strategy = %self.strategy, operations = intent.len()))]
    pub async fn execute(&self, intent: &TradeIntent) -> Result<ExecutionReport> {
        let mut report = ExecutionReport::default();

        for operation in &intent.operations {
            if let Err(e) = self.apply(operation, &mut report).await {
                error!(
                    strategy = %self.strategy,
                    operation = %operation,
                    completed = report.completed,
                    total = intent.len(),
                    error = %e,
                    "Brokerage operation failed, abandoning the rest of the intent"
                );
                return Err(e);
            }
            report.completed += 1;
        }

        info!(
            strategy = %self.strategy,
            completed = report.completed,
            reason = %intent.reason,
            "Executed trade intent"
        );
        Ok(report)
    }

    async fn apply(&self, operation: &BrokerOperation, report: &mut ExecutionReport) -> Result<()> {
        match *operation {
            BrokerOperation::OpenTrade {
                side,
                units,
                pair,
                stop_loss,
            } => {
                let id = self.gateway.open_trade(side, units, pair).await?;
                report.opened_trades.push(id);
                info!(strategy = %self.strategy, %pair, %side, units, trade_id = id, "Opened trade");
                if let Some(stop_loss) = stop_loss {
                    self.gateway.modify_trade(id, stop_loss, None).await?;
                }
            }
            BrokerOperation::CreateOrder {
                side,
                units,
                pair,
                limit_price,
                stop_loss,
            } => {
                let id = self.gateway.create_order(side, units, pair, limit_price).await?;
                report.created_orders.push(id);
                info!(
                    strategy = %self.strategy,
                    %pair,
                    %side,
                    units,
                    %limit_price,
                    order_id = id,
                    "Placed limit order"
                );
                if let Some(stop_loss) = stop_loss {
                    self.gateway.modify_order(id, stop_loss, None).await?;
                }
            }
            BrokerOperation::CloseTrade { id, pair } => {
                self.gateway.close_trade(id).await?;
                info!(strategy = %self.strategy, %pair, trade_id = id, "Closed trade");
            }
            BrokerOperation::DeleteOrder { id, pair } => {
                self.gateway.delete_order(id).await?;
                info!(strategy = %self.strategy, %pair, order_id = id, "Deleted order");
            }
            BrokerOperation::ModifyTrade {
                id,
                pair,
                stop_loss,
                trailing_stop,
            } => {
                self.gateway.modify_trade(id, stop_loss, trailing_stop).await?;
                info!(
                    strategy = %self.strategy,
                    %pair,
                    trade_id = id,
                    %stop_loss,
                    trailing_stop = ?trailing_stop,
                    "Modified trade"
                );
            }
        }
        Ok(())
    }
}
