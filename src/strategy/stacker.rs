//! Shared stop-loss for adding to an open position
//!
//! Every trade on a pair carries the same stop. When a trade is added, the
//! shared stop moves one pip further from price, and the search halts there
//! if aggregate risk at that stop is within the cap. The accepted stop is
//! always strictly farther from price than the previous one.
//!
//! An addition is rejected when that first outward pip already exceeds the
//! cap, or when the stop would sit closer to price than the minimum gap. For
//! a rejection over the cap, the stop that would have fit (searched inward
//! toward price) is reported for the log.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::common::errors::{BridgeError, Result};
use crate::common::types::{CurrencyPair, RemoteTrade, Side};
use crate::strategy::pip_math::PipMath;

/// Risk limits applied by the stacker
#[derive(Debug, Clone, Copy)]
pub struct StackLimits {
    /// Percentage of balance a single fresh position risks
    pub risk_pct: Decimal,
    /// Allowed increase over `risk_pct`, in percent of it
    pub max_increase_pct: Decimal,
    /// Closest the shared stop may sit to the live price
    pub min_gap_pips: Decimal,
}

impl StackLimits {
    /// Aggregate monetary risk allowed across all trades on the pair
    pub fn cap(&self, balance: Decimal) -> Decimal {
        balance * self.risk_pct / dec!(100) * (Decimal::ONE + self.max_increase_pct / dec!(100))
    }
}

/// Everything the stacker needs about the position and the addition
#[derive(Debug, Clone)]
pub struct StackRequest<'a> {
    pub pair: CurrencyPair,
    pub side: Side,
    pub trades: &'a [RemoteTrade],
    pub candidate_units: u64,
    /// Live entry price for the candidate trade
    pub price: Decimal,
    /// Account currency per pip per unit
    pub value_per_pip: Decimal,
    pub balance: Decimal,
}

/// Result of a stacking attempt
#[derive(Debug, Clone, PartialEq)]
pub enum StackOutcome {
    /// Move every trade, including the new one, to `stop_loss`
    Accepted {
        stop_loss: Decimal,
        previous_stop: Decimal,
        aggregate_risk: Decimal,
        cap: Decimal,
    },
    /// Widening by one pip breaches the cap, or the widened stop sits closer
    /// to price than the minimum gap
    Rejected {
        attempted_stop: Decimal,
        previous_stop: Decimal,
        gap_pips: Decimal,
    },
}

/// The single stop currently shared by `trades`
pub fn shared_stop(pair: CurrencyPair, trades: &[RemoteTrade]) -> Result<Decimal> {
    let mut stops = trades.iter().map(|t| {
        t.stop_loss.ok_or_else(|| BridgeError::InconsistentRemote {
            pair: pair.to_string(),
            message: format!("trade {} has no stop-loss", t.id),
        })
    });

    let first = stops.next().ok_or_else(|| {
        BridgeError::InvalidInput(format!("no open trades on {} to stack onto", pair))
    })??;

    for stop in stops {
        let stop = stop?;
        if stop != first {
            return Err(BridgeError::InconsistentRemote {
                pair: pair.to_string(),
                message: format!("trades carry different stops {} and {}", first, stop),
            });
        }
    }
    Ok(first)
}

/// Aggregate monetary risk if every trade, plus the candidate, stopped at `stop`
pub fn aggregate_risk(request: &StackRequest<'_>, stop: Decimal) -> Decimal {
    let direction = request.side.direction();
    let loss_pips = |entry: Decimal| PipMath::to_pips(request.pair, (entry - stop) * direction);

    let existing: Decimal = request
        .trades
        .iter()
        .map(|t| Decimal::from(t.units) * request.value_per_pip * loss_pips(t.open_price))
        .sum();
    let candidate =
        Decimal::from(request.candidate_units) * request.value_per_pip * loss_pips(request.price);

    existing + candidate
}

/// Find the shared stop for the position after adding the candidate trade
pub fn stack(request: &StackRequest<'_>, limits: &StackLimits) -> Result<StackOutcome> {
    if request.value_per_pip <= Decimal::ZERO || request.balance <= Decimal::ZERO {
        return Err(BridgeError::InvalidInput(format!(
            "cannot stack {} with value per pip {} and balance {}",
            request.pair, request.value_per_pip, request.balance
        )));
    }
    if let Some(t) = request.trades.iter().find(|t| t.side != request.side) {
        return Err(BridgeError::InconsistentRemote {
            pair: request.pair.to_string(),
            message: format!("trade {} is {} but the addition is {}", t.id, t.side, request.side),
        });
    }

    let previous_stop = shared_stop(request.pair, request.trades)?;
    let cap = limits.cap(request.balance);
    let step = PipMath::pip_size(request.pair) * request.side.direction();
    let outward = |s: Decimal| s - step;
    let inward = |s: Decimal| s + step;
    let gap = |s: Decimal| PipMath::to_pips(request.pair, (request.price - s) * request.side.direction());

    let candidate = PipMath::round_price(request.pair, outward(previous_stop));
    let risk = aggregate_risk(request, candidate);
    if risk > cap {
        let mut stop = previous_stop;
        while aggregate_risk(request, stop) > cap && gap(stop) > Decimal::ZERO {
            stop = inward(stop);
        }
        let stop = PipMath::round_price(request.pair, stop);
        debug!(
            pair = %request.pair,
            %previous_stop,
            attempted_stop = %stop,
            %risk,
            %cap,
            "Widening the shared stop exceeds the risk cap"
        );
        return Ok(StackOutcome::Rejected {
            attempted_stop: stop,
            previous_stop,
            gap_pips: gap(stop),
        });
    }

    let gap_pips = gap(candidate);
    debug!(
        pair = %request.pair,
        %previous_stop,
        stop = %candidate,
        %gap_pips,
        "Stop-loss search finished"
    );
    if gap_pips < limits.min_gap_pips {
        return Ok(StackOutcome::Rejected {
            attempted_stop: candidate,
            previous_stop,
            gap_pips,
        });
    }

    Ok(StackOutcome::Accepted {
        stop_loss: candidate,
        previous_stop,
        aggregate_risk: risk,
        cap,
    })
}
