//! Oanda brokerage client

pub mod messages;
pub mod rest;

pub use rest::{limit_order_expiry, OandaRestClient};
