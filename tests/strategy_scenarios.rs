//! End-to-end strategy scenarios against the paper broker
//!
//! ```
//! cargo test --test strategy_scenarios
//! ```

mod common;

use std::sync::Arc;

use common::{close, open, pair, paper_broker, temp_state_path, BALANCE};
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;
use signal_bridge::common::traits::BrokerGateway;
use signal_bridge::common::types::{CurrencyPair, Side};
use signal_bridge::config::{CopyConfig, ProviderConfig, ReverseConfig, SmartCopyConfig};
use signal_bridge::strategy::{
    CopyEngine, PairState, PairStateStore, PositionSizer, PromotionStage, ReverseEngine,
    SmartCopyEngine, StrategyEngine, TieredStopPromoter,
};

// ============================================================================
// Copy
// ============================================================================

#[tokio::test]
async fn test_copy_opens_multiplied_market_order() {
    let broker = paper_broker().await;
    broker.set_price(CurrencyPair::EUR_USD, dec!(1.1001), dec!(1.0999)).await;
    let config = CopyConfig::default();
    let multiplier = config.multiplier;
    let engine = CopyEngine::new(config, ProviderConfig::default(), broker.clone());

    let decision = engine
        .handle(&open(Side::Buy, 10_000, CurrencyPair::EUR_USD, dec!(1.1000)))
        .await
        .unwrap();
    assert!(decision.is_go());

    let sized = PositionSizer::new(ProviderConfig::default())
        .size_with_rate(10_000, BALANCE, dec!(0.75))
        .unwrap();
    let trades = broker.trades().await;
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].side, Side::Buy);
    assert_eq!(trades[0].units, multiplier * sized);
    assert_eq!(trades[0].units, 248);
    assert_eq!(trades[0].stop_loss, None);
}

// ============================================================================
// Smart copy
// ============================================================================

fn smart_copy(
    broker: Arc<signal_bridge::broker::PaperBroker>,
    config: SmartCopyConfig,
) -> SmartCopyEngine {
    SmartCopyEngine::new(
        config,
        ProviderConfig::default(),
        broker,
        PairStateStore::in_memory().into_shared(),
    )
}

#[tokio::test]
async fn test_smart_copy_rejects_stack_too_close_to_price() {
    let broker = paper_broker().await;
    let gbp_usd = pair("GBP_USD");
    broker
        .seed_trade(gbp_usd, Side::Buy, 150_000, dec!(1.2500), Some(dec!(1.2490)), None)
        .await;

    // cap = 10000 * 3% * 1.2 = 360; two 150000-unit trades at 0.0002 per
    // pip each risk 60 per pip, so widening to 11 pips breaches the cap and
    // only a stop 6 pips away would fit
    let config = SmartCopyConfig {
        risk_pct: dec!(3),
        max_stack_risk_increase_pct: dec!(20),
        ..SmartCopyConfig::default()
    };
    let engine = smart_copy(broker.clone(), config);
    engine.store().lock().await.set(gbp_usd, PairState::Open);
    let before = broker.mutating_calls().await;

    let decision = engine
        .handle(&open(Side::Buy, 8_000_000, gbp_usd, dec!(1.2500)))
        .await
        .unwrap();

    assert!(!decision.is_go());
    assert!(decision.reason().contains("1.2494"));
    assert_eq!(broker.mutating_calls().await, before);
    let trades = broker.trades().await;
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].stop_loss, Some(dec!(1.2490)));
    assert!(engine.store().lock().await.is(gbp_usd, PairState::Open));
}

#[tokio::test]
async fn test_smart_copy_stacks_one_pip_wider() {
    let broker = paper_broker().await;
    let gbp_usd = pair("GBP_USD");
    let first = broker
        .seed_trade(gbp_usd, Side::Buy, 150_000, dec!(1.2500), Some(dec!(1.2490)), None)
        .await;
    let engine = smart_copy(broker.clone(), SmartCopyConfig::default());
    engine.store().lock().await.set(gbp_usd, PairState::Open);

    // cap = 10000 * 10% * 1.4 = 1400; one pip wider is 11 pips at 60 per pip
    let decision = engine
        .handle(&open(Side::Buy, 8_000_000, gbp_usd, dec!(1.2500)))
        .await
        .unwrap();
    assert!(decision.is_go());
    assert_eq!(decision.operations().len(), 2);

    let trades = broker.trades().await;
    assert_eq!(trades.len(), 2);
    for trade in &trades {
        assert_eq!(trade.stop_loss, Some(dec!(1.2489)), "trade {}", trade.id);
    }
    assert!(trades.iter().any(|t| t.id == first));
    assert!(engine.store().lock().await.is(gbp_usd, PairState::Open));
}

#[tokio::test]
async fn test_smart_copy_close_on_blacklisted_pair() {
    let broker = paper_broker().await;
    let gbp_usd = pair("GBP_USD");
    let engine = smart_copy(broker.clone(), SmartCopyConfig::default());

    // open, get stopped out, blacklist on the next addition
    engine
        .handle(&open(Side::Buy, 8_000_000, gbp_usd, dec!(1.2500)))
        .await
        .unwrap();
    let id = broker.trades().await[0].id;
    broker.stop_out(id).await;
    engine
        .handle(&open(Side::Buy, 8_000_000, gbp_usd, dec!(1.2500)))
        .await
        .unwrap();
    assert!(engine.store().lock().await.is(gbp_usd, PairState::Blacklisted));

    // the operator re-entered by hand and left an order resting
    broker
        .seed_trade(gbp_usd, Side::Buy, 1000, dec!(1.2500), Some(dec!(1.2400)), None)
        .await;
    broker.create_order(Side::Buy, 1000, gbp_usd, dec!(1.2300)).await.unwrap();

    engine
        .handle(&close(Side::Buy, 8_000_000, gbp_usd, dec!(1.2600)))
        .await
        .unwrap();

    assert!(broker.trades().await.is_empty());
    assert!(broker.orders().await.is_empty());
    assert!(engine.store().lock().await.is(gbp_usd, PairState::Fresh));
}

// ============================================================================
// Reverse and promoter
// ============================================================================

#[tokio::test]
async fn test_reverse_trade_promoted_through_both_stages() {
    let broker = paper_broker().await;
    let eur_usd = CurrencyPair::EUR_USD;
    let store = PairStateStore::in_memory().into_shared();
    let engine = ReverseEngine::new(
        ReverseConfig::default(),
        ProviderConfig::default(),
        broker.clone(),
        store.clone(),
    );
    let promoter = TieredStopPromoter::new(ReverseConfig::default(), broker.clone(), store.clone());

    engine
        .handle(&open(Side::Buy, 10_000, eur_usd, dec!(1.2500)))
        .await
        .unwrap();
    let trade = broker.trades().await.remove(0);
    assert_eq!(trade.side, Side::Sell);
    assert_eq!(trade.stop_loss, Some(dec!(1.2525)));

    // not yet in profit
    let report = promoter.run_once().await.unwrap();
    assert!(report.promoted.is_empty());

    // 25 pips in profit at the ask
    broker.set_price(eur_usd, dec!(1.2475), dec!(1.2473)).await;
    let report = promoter.run_once().await.unwrap();
    assert_eq!(report.promoted, vec![(trade.id, PromotionStage::Breakeven)]);
    let promoted = broker.get_open_trades(Some(eur_usd)).await.unwrap();
    assert_eq!(promoted[0].stop_loss, Some(dec!(1.2500)));
    assert_eq!(promoted[0].trailing_stop, Some(dec!(50)));

    // 200 pips in profit widens the trailing stop once
    broker.set_price(eur_usd, dec!(1.2300), dec!(1.2298)).await;
    let report = promoter.run_once().await.unwrap();
    assert_eq!(report.promoted, vec![(trade.id, PromotionStage::Widened)]);
    assert_eq!(broker.trades().await[0].trailing_stop, Some(dec!(100)));
    assert!(promoter.run_once().await.unwrap().promoted.is_empty());

    // stopped out: the promoter forgets the pair
    broker.stop_out(trade.id).await;
    let report = promoter.run_once().await.unwrap();
    assert_eq!(report.stopped_out, vec![eur_usd]);
    assert!(store.lock().await.is(eur_usd, PairState::Fresh));
}

#[tokio::test]
async fn test_reverse_state_survives_restart() {
    let path = temp_state_path("reverse_restart");
    std::fs::remove_file(&path).ok();
    let broker = paper_broker().await;
    let eur_usd = CurrencyPair::EUR_USD;

    {
        let engine = ReverseEngine::new(
            ReverseConfig::default(),
            ProviderConfig::default(),
            broker.clone(),
            PairStateStore::load(&path).unwrap().into_shared(),
        );
        engine
            .handle(&open(Side::Buy, 10_000, eur_usd, dec!(1.2500)))
            .await
            .unwrap();
        engine.persist().await.unwrap();
    }

    let reloaded = PairStateStore::load(&path).unwrap();
    assert!(reloaded.is(eur_usd, PairState::Reversed));
    assert!(reloaded.is_provider_open(eur_usd));
    std::fs::remove_file(&path).ok();
}

// ============================================================================
// Exclusivity
// ============================================================================

#[tokio::test]
async fn test_classifications_stay_exclusive_across_signals() {
    let broker = paper_broker().await;
    let gbp_usd = pair("GBP_USD");
    let eur_usd = CurrencyPair::EUR_USD;
    let engine = smart_copy(broker.clone(), SmartCopyConfig::default());

    let steps = [
        open(Side::Buy, 8_000_000, gbp_usd, dec!(1.2500)),
        open(Side::Sell, 10_000_000, eur_usd, dec!(1.2600)),
        open(Side::Buy, 8_000_000, gbp_usd, dec!(1.2500)),
        close(Side::Sell, 10_000_000, eur_usd, dec!(1.2400)),
        open(Side::Buy, 8_000_000, gbp_usd, dec!(1.2500)),
        close(Side::Buy, 8_000_000, gbp_usd, dec!(1.2700)),
        open(Side::Buy, 8_000_000, gbp_usd, dec!(1.2500)),
    ];

    for (i, signal) in steps.iter().enumerate() {
        if i == 4 {
            for trade in broker.trades().await {
                broker.stop_out(trade.id).await;
            }
        }
        engine.handle(signal).await.unwrap();

        let record = engine.store().lock().await.to_record();
        let mut seen = std::collections::HashSet::new();
        for key in ["open", "blacklisted", "reversed", "unreversed"] {
            for token in record[key].split(',').filter(|t| !t.is_empty()) {
                assert!(seen.insert(token.to_string()), "{} in two lists at step {}", token, i);
            }
        }
    }
}
