//! The single loop that serialises signals and operator commands

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use super::commands::OperatorCommand;
use super::dispatcher::Dispatcher;
use crate::common::errors::{EngineError, FatalError};
use crate::common::types::SignalBundle;
use crate::strategy::{Decision, ReverseEngine};

/// Result of one operator command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Reply(String),
    Shutdown,
}

/// Owns the dispatcher and handles one input at a time
pub struct BridgeService {
    dispatcher: Dispatcher,
    reverse: Option<Arc<ReverseEngine>>,
}

impl BridgeService {
    pub fn new(dispatcher: Dispatcher, reverse: Option<Arc<ReverseEngine>>) -> Self {
        Self { dispatcher, reverse }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Apply one operator command
    pub async fn execute(&self, command: OperatorCommand) -> Result<CommandOutcome, FatalError> {
        let reply = match command {
            OperatorCommand::Shutdown => return Ok(CommandOutcome::Shutdown),
            OperatorCommand::Status => self.dispatcher.status().await.join("\n"),
            OperatorCommand::ReverseTest => match &self.reverse {
                None => "reverse strategy is not configured".to_string(),
                Some(reverse) => match reverse.connectivity_test().await {
                    Ok(()) => "connectivity test passed".to_string(),
                    Err(e) => format!("connectivity test failed: {}", e),
                },
            },
            OperatorCommand::Unreverse {
                side,
                pair,
                units,
                additional,
            } => match &self.reverse {
                None => "reverse strategy is not configured".to_string(),
                Some(reverse) => match reverse.open_unreverse(side, units, pair, additional).await {
                    Ok(Decision::Go(intent)) => format!("unreverse placed: {}", intent.reason),
                    Ok(Decision::NoGo(reason)) => format!("unreverse refused: {}", reason),
                    Err(EngineError::Recoverable(e)) => format!("unreverse failed: {}", e),
                    Err(EngineError::Fatal(e)) => return Err(e),
                },
            },
        };
        Ok(CommandOutcome::Reply(reply))
    }

    /// Serve signals and commands until shutdown, an operator `shutdown`, or
    /// a fatal error
    ///
    /// Every exit flips `shutdown` so background tasks stop too.
    pub async fn run(
        &self,
        mut signals: mpsc::Receiver<SignalBundle>,
        mut commands: mpsc::Receiver<OperatorCommand>,
        shutdown: &watch::Sender<bool>,
    ) -> Result<(), FatalError> {
        let mut stop = shutdown.subscribe();
        let mut commands_open = true;

        let result = loop {
            tokio::select! {
                bundle = signals.recv() => match bundle {
                    Some(bundle) => {
                        if let Err(e) = self.dispatcher.dispatch(&bundle).await {
                            break Err(e);
                        }
                    }
                    None => {
                        warn!("Signal source closed");
                        break Ok(());
                    }
                },
                command = commands.recv(), if commands_open => match command {
                    Some(command) => match self.execute(command).await {
                        Ok(CommandOutcome::Reply(reply)) => {
                            for line in reply.lines() {
                                info!("{}", line);
                            }
                        }
                        Ok(CommandOutcome::Shutdown) => {
                            info!("Shutdown requested by operator");
                            break Ok(());
                        }
                        Err(e) => break Err(e),
                    },
                    None => commands_open = false,
                },
                _ = stop.changed() => {
                    info!("Shutdown signalled");
                    break Ok(());
                }
            }
        };

        if let Err(e) = &result {
            error!(error = %e, "Stopping on fatal error");
        }
        let _ = shutdown.send(true);
        result
    }
}
