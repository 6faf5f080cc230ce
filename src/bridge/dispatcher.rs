//! Fan-out of provider signals to every configured strategy

use std::time::Duration;

use tracing::{error, info, warn};

use crate::common::errors::{EngineError, FatalError};
use crate::common::types::{ProviderAction, SignalBundle};
use crate::strategy::{BoxedEngine, Decision};

/// What happened to one bundle
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// `(strategy, decision)` for every signal each strategy handled
    pub decisions: Vec<(String, Decision)>,
    /// Open legs of multi-signal bundles that were not dispatched
    pub skipped: usize,
    /// Strategy invocations that failed recoverably
    pub failed: usize,
}

/// Runs each signal through every engine in turn
pub struct Dispatcher {
    engines: Vec<BoxedEngine>,
    strategy_delay: Duration,
}

impl Dispatcher {
    /// # Arguments
    /// * `engines` - Strategies, in the order they see each signal
    /// * `strategy_delay` - Pause between strategies for the same signal
    pub fn new(engines: Vec<BoxedEngine>, strategy_delay: Duration) -> Self {
        Self {
            engines,
            strategy_delay,
        }
    }

    pub fn engines(&self) -> &[BoxedEngine] {
        &self.engines
    }

    /// Dispatch every leg of a bundle
    ///
    /// A bundle with several signals only has its `Close` legs dispatched.
    /// A recoverable failure abandons that signal for that strategy only; a
    /// fatal one stops dispatch and is returned.
    pub async fn dispatch(&self, bundle: &SignalBundle) -> Result<DispatchReport, FatalError> {
        let mut report = DispatchReport::default();

        for signal in &bundle.signals {
            if bundle.is_multi() && signal.action == ProviderAction::Open {
                info!(%signal, "Skipping open leg of a multi-signal notification");
                report.skipped += 1;
                continue;
            }
            info!(%signal, "Dispatching signal");

            for (i, engine) in self.engines.iter().enumerate() {
                if i > 0 && !self.strategy_delay.is_zero() {
                    tokio::time::sleep(self.strategy_delay).await;
                }

                match engine.handle(signal).await {
                    Ok(decision) => {
                        match &decision {
                            Decision::Go(intent) => info!(
                                strategy = engine.name(),
                                operations = intent.len(),
                                reason = %intent.reason,
                                "Signal acted on"
                            ),
                            Decision::NoGo(reason) => {
                                info!(strategy = engine.name(), reason = %reason, "Signal not acted on")
                            }
                        }
                        report.decisions.push((engine.name().to_string(), decision));
                    }
                    Err(EngineError::Recoverable(e)) => {
                        error!(
                            strategy = engine.name(),
                            %signal,
                            error = %e,
                            "Strategy failed to handle signal"
                        );
                        report.failed += 1;
                    }
                    Err(EngineError::Fatal(e)) => {
                        error!(strategy = engine.name(), %signal, error = %e, "Fatal strategy error");
                        return Err(e);
                    }
                }
            }
        }

        Ok(report)
    }

    /// Persist every engine, logging failures and carrying on
    pub async fn persist_all(&self) -> usize {
        let mut failures = 0;
        for engine in &self.engines {
            match engine.persist().await {
                Ok(()) => info!(strategy = engine.name(), "State saved"),
                Err(e) => {
                    warn!(strategy = engine.name(), error = %e, "Failed to save state");
                    failures += 1;
                }
            }
        }
        failures
    }

    pub async fn status(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.engines.len());
        for engine in &self.engines {
            lines.push(engine.status().await);
        }
        lines
    }
}
