use std::sync::Arc;

use async_trait::async_trait;

use crate::common::errors::{EngineError, Result};
use crate::common::types::TradeSignal;
use crate::strategy::types::Decision;

/// Core strategy trait
///
/// Each engine trades its own account and keeps its own state. An engine
/// receives every signal, decides on zero or more brokerage operations,
/// executes them and updates its state before returning.
///
/// # Implementation Notes
///
/// - `handle` runs as one critical section over the engine's state
/// - A recoverable error abandons the rest of this signal for this engine only
/// - A fatal error means local state can no longer be trusted
#[async_trait]
pub trait StrategyEngine: Send + Sync {
    /// Unique identifier for this strategy
    fn name(&self) -> &str;

    /// Handle one provider signal
    ///
    /// # Returns
    /// * `Decision::NoGo` - Nothing was sent to the brokerage
    /// * `Decision::Go(intent)` - The intent was executed
    async fn handle(&self, signal: &TradeSignal) -> std::result::Result<Decision, EngineError>;

    /// Flush state to disk
    ///
    /// Default implementation does nothing.
    async fn persist(&self) -> Result<()> {
        Ok(())
    }

    /// One-line description of tracked state for the operator
    async fn status(&self) -> String {
        format!("{}: stateless", self.name())
    }
}

/// Shared strategy for dynamic dispatch
pub type BoxedEngine = Arc<dyn StrategyEngine>;
