//! Staged stop-loss promotion for the reverse account
//!
//! On every pass each open trade is priced and, once far enough in profit,
//! has its stop moved to breakeven with a trailing stop armed; further on the
//! trailing distance is widened. The same pass diffs tracked pairs against
//! the account and forgets those whose trades have gone, which is how
//! stop-outs are noticed.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument};

use crate::broker::OrderExecutor;
use crate::common::errors::Result;
use crate::common::traits::BrokerGateway;
use crate::common::types::{CurrencyPair, Quote, RemoteTrade, TradeId};
use crate::config::ReverseConfig;
use crate::strategy::pip_math::PipMath;
use crate::strategy::state_store::{PairState, SharedStore};
use crate::strategy::types::{BrokerOperation, TradeIntent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromotionStage {
    /// Stop at entry, trailing stop armed
    Breakeven,
    /// Trailing distance widened
    Widened,
}

/// New stop settings for one trade
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopPromotion {
    pub stop_loss: Decimal,
    pub trailing_stop: Decimal,
    pub stage: PromotionStage,
}

/// What one pass did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromotionReport {
    pub scanned: usize,
    pub promoted: Vec<(TradeId, PromotionStage)>,
    pub stopped_out: Vec<CurrencyPair>,
    pub failures: usize,
}

/// Unrealised profit of `trade` in pips at the price it would close at
pub fn profit_pips(trade: &RemoteTrade, quote: &Quote) -> Decimal {
    let exit = quote.exit_price(trade.side);
    PipMath::round_pips(trade.pair, (exit - trade.open_price) * trade.side.direction())
}

/// The promotion due for `trade`, if any
pub fn promotion_for(
    trade: &RemoteTrade,
    profit_pips: Decimal,
    config: &ReverseConfig,
) -> Option<StopPromotion> {
    let stop_loss = PipMath::round_price(trade.pair, trade.open_price);
    match trade.trailing_stop {
        None if profit_pips >= config.initial_stop_pips => Some(StopPromotion {
            stop_loss,
            trailing_stop: config.trailing_stop_pips,
            stage: PromotionStage::Breakeven,
        }),
        Some(trailing)
            if trailing < config.widened_trailing_pips()
                && profit_pips >= config.widen_trigger_pips() =>
        {
            Some(StopPromotion {
                stop_loss,
                trailing_stop: config.widened_trailing_pips(),
                stage: PromotionStage::Widened,
            })
        }
        _ => None,
    }
}

pub struct TieredStopPromoter {
    config: ReverseConfig,
    executor: OrderExecutor,
    store: SharedStore,
}

impl TieredStopPromoter {
    pub fn new(config: ReverseConfig, gateway: Arc<dyn BrokerGateway>, store: SharedStore) -> Self {
        Self {
            config,
            executor: OrderExecutor::new(gateway, "reverse_promoter"),
            store,
        }
    }

    /// One promotion and stop-out pass, holding the store for its duration
    ///
    /// The lock stays held across every brokerage call of the pass, each of
    /// them paced by the gateway, so signals for the reverse strategy wait
    /// roughly one pacing interval per trade scanned and promoted.
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> Result<PromotionReport> {
        let mut store = self.store.lock().await;
        let gateway = self.executor.gateway();

        let trades = gateway.get_open_trades(None).await?;
        let mut report = PromotionReport {
            scanned: trades.len(),
            ..Default::default()
        };
        let mut quotes: HashMap<CurrencyPair, Quote> = HashMap::new();

        for trade in &trades {
            let quote = match quotes.get(&trade.pair) {
                Some(q) => *q,
                None => match gateway.get_price(trade.pair).await {
                    Ok(q) => *quotes.entry(trade.pair).or_insert(q),
                    Err(e) => {
                        error!(pair = %trade.pair, trade_id = trade.id, error = %e, "Could not price trade");
                        report.failures += 1;
                        continue;
                    }
                },
            };

            let profit = profit_pips(trade, &quote);
            let Some(promotion) = promotion_for(trade, profit, &self.config) else {
                debug!(pair = %trade.pair, trade_id = trade.id, %profit, "No promotion due");
                continue;
            };

            let intent = TradeIntent::single(
                BrokerOperation::ModifyTrade {
                    id: trade.id,
                    pair: trade.pair,
                    stop_loss: promotion.stop_loss,
                    trailing_stop: Some(promotion.trailing_stop),
                },
                format!("{:?} at {} pips profit", promotion.stage, profit),
            );
            match self.executor.execute(&intent).await {
                Ok(_) => report.promoted.push((trade.id, promotion.stage)),
                Err(_) => report.failures += 1,
            }
        }

        let remote: BTreeSet<CurrencyPair> = trades.iter().map(|t| t.pair).collect();
        let mut tracked = store.pairs_in(PairState::Reversed);
        tracked.extend(store.pairs_in(PairState::Unreversed));
        for pair in tracked {
            if !remote.contains(&pair) {
                let previous = store.clear(pair);
                info!(%pair, %previous, "Trade appears to have been stopped out");
                report.stopped_out.push(pair);
            }
        }

        info!(
            scanned = report.scanned,
            promoted = report.promoted.len(),
            stopped_out = report.stopped_out.len(),
            failures = report.failures,
            "Promoter pass finished"
        );
        Ok(report)
    }

    /// Run a pass every `period` until shutdown is signalled
    ///
    /// The first pass runs one `period` after start. Each pass holds the
    /// pair-state lock throughout, see [`Self::run_once`].
    pub async fn run(&self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        error!(error = %e, "Promoter pass failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Promoter stopping");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::PaperBroker;
    use crate::common::channels::create_shutdown_channel;
    use crate::common::types::Side;
    use crate::strategy::state_store::PairStateStore;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn trade(side: Side, open_price: Decimal, trailing_stop: Option<Decimal>) -> RemoteTrade {
        RemoteTrade {
            id: 7,
            pair: CurrencyPair::EUR_USD,
            side,
            units: 1000,
            open_price,
            stop_loss: Some(dec!(1.0975)),
            trailing_stop,
        }
    }

    #[test]
    fn test_profit_uses_closing_side() {
        let quote = Quote::new(dec!(1.1027), dec!(1.1025));
        assert_eq!(profit_pips(&trade(Side::Buy, dec!(1.1000), None), &quote), dec!(25));
        assert_eq!(profit_pips(&trade(Side::Sell, dec!(1.1000), None), &quote), dec!(-27));
    }

    #[test]
    fn test_promotion_stages() {
        let config = ReverseConfig::default();
        let fresh = trade(Side::Buy, dec!(1.1000), None);

        assert_eq!(promotion_for(&fresh, dec!(24.9), &config), None);
        assert_eq!(
            promotion_for(&fresh, dec!(25), &config),
            Some(StopPromotion {
                stop_loss: dec!(1.1000),
                trailing_stop: dec!(50),
                stage: PromotionStage::Breakeven,
            })
        );

        let armed = trade(Side::Buy, dec!(1.1000), Some(dec!(50)));
        assert_eq!(promotion_for(&armed, dec!(150), &config), None);
        assert_eq!(
            promotion_for(&armed, dec!(200), &config).map(|p| p.trailing_stop),
            Some(dec!(100))
        );

        let widened = trade(Side::Buy, dec!(1.1000), Some(dec!(100)));
        assert_eq!(promotion_for(&widened, dec!(400), &config), None);
    }

    #[tokio::test]
    async fn test_pass_promotes_and_forgets_stopped_pairs() {
        let broker = Arc::new(PaperBroker::new(dec!(10000)));
        broker.set_price(CurrencyPair::EUR_USD, dec!(1.1002), dec!(1.1000)).await;
        let id = broker
            .seed_trade(CurrencyPair::EUR_USD, Side::Sell, 1000, dec!(1.1027), Some(dec!(1.1052)), None)
            .await;

        let mut store = PairStateStore::in_memory();
        store.set(CurrencyPair::EUR_USD, PairState::Reversed);
        store.set(CurrencyPair::AUD_USD, PairState::Reversed);
        let store = store.into_shared();

        let promoter = TieredStopPromoter::new(ReverseConfig::default(), broker.clone(), store.clone());
        let report = promoter.run_once().await.unwrap();

        assert_eq!(report.promoted, vec![(id, PromotionStage::Breakeven)]);
        assert_eq!(report.stopped_out, vec![CurrencyPair::AUD_USD]);

        let trades = broker.trades().await;
        assert_eq!(trades[0].stop_loss, Some(dec!(1.1027)));
        assert_eq!(trades[0].trailing_stop, Some(dec!(50)));

        let store = store.lock().await;
        assert!(store.is(CurrencyPair::EUR_USD, PairState::Reversed));
        assert!(store.is(CurrencyPair::AUD_USD, PairState::Fresh));
    }

    #[tokio::test]
    async fn test_modify_failure_does_not_stop_the_pass() {
        let broker = Arc::new(PaperBroker::new(dec!(10000)));
        broker.set_price(CurrencyPair::EUR_USD, dec!(1.1030), dec!(1.1030)).await;
        broker
            .seed_trade(CurrencyPair::EUR_USD, Side::Buy, 1000, dec!(1.1000), Some(dec!(1.0975)), None)
            .await;
        broker.fail_calls("modify_trade").await;

        let mut store = PairStateStore::in_memory();
        store.set(CurrencyPair::AUD_USD, PairState::Unreversed);
        let store = store.into_shared();

        let promoter = TieredStopPromoter::new(ReverseConfig::default(), broker, store);
        let report = promoter.run_once().await.unwrap();
        assert_eq!(report.failures, 1);
        assert_eq!(report.stopped_out, vec![CurrencyPair::AUD_USD]);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let broker = Arc::new(PaperBroker::new(dec!(10000)));
        let promoter = TieredStopPromoter::new(
            ReverseConfig::default(),
            broker.clone(),
            PairStateStore::in_memory().into_shared(),
        );
        let (tx, rx) = create_shutdown_channel();

        let handle = tokio::spawn(async move {
            promoter.run(Duration::from_secs(300), rx).await;
        });
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(broker.calls().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_pass_waits_one_period() {
        let broker = Arc::new(PaperBroker::new(dec!(10000)));
        let promoter = TieredStopPromoter::new(
            ReverseConfig::default(),
            broker.clone(),
            PairStateStore::in_memory().into_shared(),
        );
        let (tx, rx) = create_shutdown_channel();
        let handle = tokio::spawn(async move {
            promoter.run(Duration::from_secs(300), rx).await;
        });

        tokio::time::sleep(Duration::from_secs(299)).await;
        assert!(broker.calls().await.is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(broker.calls().await, vec!["get_open_trades".to_string()]);

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(broker.calls().await.len(), 2);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
