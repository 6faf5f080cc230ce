//! Order execution and the simulated brokerage

pub mod executor;
pub mod paper;

pub use executor::{ExecutionReport, OrderExecutor};
pub use paper::PaperBroker;
