//! Error types for the application

use thiserror::Error;

/// Result type alias using our BridgeError
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Recoverable error for a single signal or command
///
/// A `BridgeError` abandons the remaining steps of one strategy's handling of
/// one signal. The dispatcher logs it and moves on to the next strategy.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Transport or HTTP errors talking to the brokerage
    #[error("HTTP request error: {0}")]
    Broker(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// File system errors outside of state loading
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid API response
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// A precondition on a numeric input failed
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Pair token is not a supported currency pair
    #[error("Invalid currency pair: {0}")]
    InvalidPair(String),

    /// The brokerage reports something the strategy cannot reconcile
    #[error("Inconsistent remote state for {pair}: {message}")]
    InconsistentRemote { pair: String, message: String },

    /// A fresh position was requested while an order was still resting
    #[error("Unexpected pending order on {0}")]
    UnexpectedPendingOrder(String),

    /// Malformed signal or operator command
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Non-recoverable error
///
/// Continuing after one of these risks placing trades against inconsistent
/// state, so the process terminates once it has been logged.
#[derive(Error, Debug)]
pub enum FatalError {
    /// Persisted state could not be read or is self-contradictory
    #[error("Corrupt persisted state in {path}: {message}")]
    CorruptState { path: String, message: String },

    /// A pair was observed in two mutually exclusive classifications
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

/// Outcome of an operation that can fail either way
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Recoverable(#[from] BridgeError),

    #[error(transparent)]
    Fatal(#[from] FatalError),
}

impl EngineError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Fatal(_))
    }
}
