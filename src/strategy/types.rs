use std::fmt;

use rust_decimal::Decimal;

use crate::common::types::{CurrencyPair, Side, TradeId};

/// A single call against the brokerage
///
/// Opening calls carry the stop-loss to apply once the brokerage has returned
/// the new id; the executor issues the follow-up modify call.
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerOperation {
    OpenTrade {
        side: Side,
        units: u64,
        pair: CurrencyPair,
        stop_loss: Option<Decimal>,
    },
    CreateOrder {
        side: Side,
        units: u64,
        pair: CurrencyPair,
        limit_price: Decimal,
        stop_loss: Option<Decimal>,
    },
    CloseTrade {
        id: TradeId,
        pair: CurrencyPair,
    },
    DeleteOrder {
        id: TradeId,
        pair: CurrencyPair,
    },
    ModifyTrade {
        id: TradeId,
        pair: CurrencyPair,
        stop_loss: Decimal,
        /// Trailing distance in pips
        trailing_stop: Option<Decimal>,
    },
}

impl BrokerOperation {
    pub fn pair(&self) -> CurrencyPair {
        match self {
            BrokerOperation::OpenTrade { pair, .. }
            | BrokerOperation::CreateOrder { pair, .. }
            | BrokerOperation::CloseTrade { pair, .. }
            | BrokerOperation::DeleteOrder { pair, .. }
            | BrokerOperation::ModifyTrade { pair, .. } => *pair,
        }
    }
}

impl fmt::Display for BrokerOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerOperation::OpenTrade {
                side,
                units,
                pair,
                stop_loss,
            } => write!(f, "open {} {} {} stop {:?}", side, units, pair, stop_loss),
            BrokerOperation::CreateOrder {
                side,
                units,
                pair,
                limit_price,
                stop_loss,
            } => write!(
                f,
                "limit {} {} {} @ {} stop {:?}",
                side, units, pair, limit_price, stop_loss
            ),
            BrokerOperation::CloseTrade { id, pair } => write!(f, "close trade {} on {}", id, pair),
            BrokerOperation::DeleteOrder { id, pair } => write!(f, "delete order {} on {}", id, pair),
            BrokerOperation::ModifyTrade {
                id,
                pair,
                stop_loss,
                trailing_stop,
            } => write!(
                f,
                "modify trade {} on {} stop {} trailing {:?}",
                id, pair, stop_loss, trailing_stop
            ),
        }
    }
}

/// An ordered list of brokerage operations
///
/// Operations run in order; a failure abandons the rest.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeIntent {
    pub operations: Vec<BrokerOperation>,
    pub reason: String,
}

impl TradeIntent {
    /// Create a single-operation intent
    pub fn single(operation: BrokerOperation, reason: impl Into<String>) -> Self {
        Self {
            operations: vec![operation],
            reason: reason.into(),
        }
    }

    /// Create a multi-operation intent
    pub fn multi(operations: Vec<BrokerOperation>, reason: impl Into<String>) -> Self {
        Self {
            operations,
            reason: reason.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Strategy decision output
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// No action taken, with the reason
    NoGo(String),
    /// The intent was executed
    Go(TradeIntent),
}

impl Decision {
    /// Create a NoGo decision
    pub fn no_go(reason: impl Into<String>) -> Self {
        Self::NoGo(reason.into())
    }

    /// Create a Go decision with a single operation
    pub fn go_single(operation: BrokerOperation, reason: impl Into<String>) -> Self {
        Self::Go(TradeIntent::single(operation, reason))
    }

    /// Returns true if this is a Go decision
    pub fn is_go(&self) -> bool {
        matches!(self, Self::Go(_))
    }

    /// Operations executed, empty for NoGo
    pub fn operations(&self) -> &[BrokerOperation] {
        match self {
            Self::Go(intent) => &intent.operations,
            Self::NoGo(_) => &[],
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            Self::Go(intent) => &intent.reason,
            Self::NoGo(reason) => reason,
        }
    }
}
