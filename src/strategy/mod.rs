//! Strategy module for signal-to-order decisions
//!
//! Each engine owns one brokerage account and reacts to every provider signal
//! independently of the others.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    SIGNAL PATH (sequential)                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TradeSignal arrives                                        │
//! │       │                                                     │
//! │       ▼                                                     │
//! │  StrategyEngine.handle()  (Copy / SmartCopy / Reverse)      │
//! │    - PipMath, PositionSizer, StopLossStacker                │
//! │    - PairStateStore lock held for the whole signal          │
//! │       │                                                     │
//! │       ▼ (if Go)                                             │
//! │  OrderExecutor → BrokerGateway                              │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    TIMER (background)                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TieredStopPromoter                                         │
//! │    - Breakeven + trailing stop, then widened trailing stop  │
//! │    - Forgets reversed pairs whose trades are gone           │
//! │    - Shares the reverse engine's PairStateStore             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`StrategyEngine`]: Trait implemented by the three engines
//! - [`Decision`]: Go/NoGo outcome of one signal
//! - [`TradeIntent`]: Ordered [`BrokerOperation`]s to execute
//! - [`PairStateStore`]: Persisted per-pair classification
//! - [`TieredStopPromoter`]: Periodic stop promotion for the reverse account

mod copy;
mod pip_math;
mod position_sizer;
mod promoter;
mod reverse;
mod smart_copy;
mod stacker;
mod state_store;
mod traits;
mod types;

pub use copy::CopyEngine;
pub use pip_math::PipMath;
pub use position_sizer::{pip_value_in_account, PositionSizer};
pub use promoter::{
    profit_pips, promotion_for, PromotionReport, PromotionStage, StopPromotion,
    TieredStopPromoter,
};
pub use reverse::ReverseEngine;
pub use smart_copy::SmartCopyEngine;
pub use stacker::{
    aggregate_risk, shared_stop, stack, StackLimits, StackOutcome, StackRequest,
};
pub use state_store::{PairState, PairStateStore, SharedStore};
pub use traits::{BoxedEngine, StrategyEngine};
pub use types::{BrokerOperation, Decision, TradeIntent};
