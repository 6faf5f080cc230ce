//! Configuration types

use std::path::PathBuf;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::common::types::{Currency, CurrencyPair};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Brokerage connection settings shared by every account
    #[serde(default)]
    pub broker: BrokerConfig,
    /// Assumptions about the signal provider's account
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Exact-copy strategy; disabled without an account id
    #[serde(default)]
    pub copy: CopyConfig,
    /// Risk-normalised copy strategy
    #[serde(default)]
    pub smart_copy: SmartCopyConfig,
    /// Inverse copy strategy
    #[serde(default)]
    pub reverse: ReverseConfig,
    /// General application settings
    #[serde(default)]
    pub settings: AppSettings,
}

/// Oanda REST connection settings
#[derive(Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Base URL of the REST API
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Bearer token for authenticated requests
    #[serde(default)]
    pub api_key: Option<String>,
    /// Pause after every request, in milliseconds
    #[serde(default = "default_request_delay")]
    pub request_delay_ms: u64,
    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl std::fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("request_delay_ms", &self.request_delay_ms)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .finish()
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: None,
            request_delay_ms: default_request_delay(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

fn default_api_url() -> String {
    "https://api-fxtrade.oanda.com".to_string()
}

fn default_request_delay() -> u64 {
    500
}

fn default_request_timeout() -> u64 {
    30
}

/// How provider sizes relate to the local account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Equity the provider's sizes are quoted against, in the reference currency
    #[serde(default = "default_reference_equity")]
    pub reference_equity: Decimal,
    /// Pair whose ask converts the local balance into the reference currency
    #[serde(default = "default_reference_pair")]
    pub reference_pair: CurrencyPair,
    /// Currency the local accounts are denominated in
    #[serde(default = "default_account_currency")]
    pub account_currency: Currency,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            reference_equity: default_reference_equity(),
            reference_pair: default_reference_pair(),
            account_currency: default_account_currency(),
        }
    }
}

fn default_reference_equity() -> Decimal {
    dec!(1200000)
}

fn default_reference_pair() -> CurrencyPair {
    CurrencyPair::AUD_USD
}

fn default_account_currency() -> Currency {
    Currency::AUD
}

/// Copy strategy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyConfig {
    #[serde(default)]
    pub account_id: Option<String>,
    /// Applied on top of the proportional size
    #[serde(default = "default_copy_multiplier")]
    pub multiplier: u64,
    /// Largest adverse gap to the provider's price still worth taking, in pips
    #[serde(default = "default_copy_max_pip_diff")]
    pub max_pip_diff: Decimal,
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            account_id: None,
            multiplier: default_copy_multiplier(),
            max_pip_diff: default_copy_max_pip_diff(),
        }
    }
}

fn default_copy_multiplier() -> u64 {
    4
}

fn default_copy_max_pip_diff() -> Decimal {
    dec!(5)
}

/// Smart-copy strategy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartCopyConfig {
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default = "default_smart_multiplier")]
    pub multiplier: u64,
    #[serde(default = "default_smart_max_pip_diff")]
    pub max_pip_diff: Decimal,
    /// Offset in our favour from the provider's price for a missed entry
    #[serde(default = "default_limit_offset")]
    pub limit_offset_pips: Decimal,
    /// Closest a stacked stop may sit to the live price
    #[serde(default = "default_min_stop_gap")]
    pub min_stop_gap_pips: Decimal,
    /// Percentage of balance risked by a fresh position
    #[serde(default = "default_smart_risk")]
    pub risk_pct: Decimal,
    /// How far stacking may push aggregate risk above `risk_pct`, in percent of it
    #[serde(default = "default_stack_increase")]
    pub max_stack_risk_increase_pct: Decimal,
    #[serde(default = "default_smart_state_file")]
    pub state_file: String,
}

impl Default for SmartCopyConfig {
    fn default() -> Self {
        Self {
            account_id: None,
            multiplier: default_smart_multiplier(),
            max_pip_diff: default_smart_max_pip_diff(),
            limit_offset_pips: default_limit_offset(),
            min_stop_gap_pips: default_min_stop_gap(),
            risk_pct: default_smart_risk(),
            max_stack_risk_increase_pct: default_stack_increase(),
            state_file: default_smart_state_file(),
        }
    }
}

fn default_smart_multiplier() -> u64 {
    3
}

fn default_smart_max_pip_diff() -> Decimal {
    dec!(1)
}

fn default_limit_offset() -> Decimal {
    dec!(5)
}

fn default_min_stop_gap() -> Decimal {
    dec!(10)
}

fn default_smart_risk() -> Decimal {
    dec!(10)
}

fn default_stack_increase() -> Decimal {
    dec!(40)
}

fn default_smart_state_file() -> String {
    "smartcopy.json".to_string()
}

/// Reverse strategy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReverseConfig {
    #[serde(default)]
    pub account_id: Option<String>,
    /// Percentage of balance lost if the initial stop is hit
    #[serde(default = "default_reverse_risk")]
    pub risk_pct: Decimal,
    #[serde(default = "default_reverse_max_pip_diff")]
    pub max_pip_diff: Decimal,
    #[serde(default = "default_initial_stop")]
    pub initial_stop_pips: Decimal,
    /// Trailing distance armed when a trade reaches breakeven
    #[serde(default = "default_trailing_stop")]
    pub trailing_stop_pips: Decimal,
    /// Profit, in multiples of the initial stop, that widens the trailing stop
    #[serde(default = "default_widen_multiple")]
    pub widen_trigger_multiple: Decimal,
    /// Largest operator-requested unreverse trade
    #[serde(default = "default_max_unreverse")]
    pub max_unreverse_units: u64,
    #[serde(default = "default_promoter_interval")]
    pub promoter_interval_seconds: u64,
    #[serde(default = "default_reverse_state_file")]
    pub state_file: String,
}

impl Default for ReverseConfig {
    fn default() -> Self {
        Self {
            account_id: None,
            risk_pct: default_reverse_risk(),
            max_pip_diff: default_reverse_max_pip_diff(),
            initial_stop_pips: default_initial_stop(),
            trailing_stop_pips: default_trailing_stop(),
            widen_trigger_multiple: default_widen_multiple(),
            max_unreverse_units: default_max_unreverse(),
            promoter_interval_seconds: default_promoter_interval(),
            state_file: default_reverse_state_file(),
        }
    }
}

impl ReverseConfig {
    /// Profit in pips at which an armed trailing stop is widened
    pub fn widen_trigger_pips(&self) -> Decimal {
        self.initial_stop_pips * self.widen_trigger_multiple
    }

    /// Trailing distance after widening
    pub fn widened_trailing_pips(&self) -> Decimal {
        self.trailing_stop_pips * Decimal::TWO
    }
}

fn default_reverse_risk() -> Decimal {
    dec!(2)
}

fn default_reverse_max_pip_diff() -> Decimal {
    dec!(10)
}

fn default_initial_stop() -> Decimal {
    dec!(25)
}

fn default_trailing_stop() -> Decimal {
    dec!(50)
}

fn default_widen_multiple() -> Decimal {
    dec!(8)
}

fn default_max_unreverse() -> u64 {
    50_000
}

fn default_promoter_interval() -> u64 {
    300
}

fn default_reverse_state_file() -> String {
    "reverse.json".to_string()
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit logs as JSON lines
    #[serde(default)]
    pub json_logs: bool,
    /// Address the signal listener binds to
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Trade against the in-memory paper broker
    #[serde(default)]
    pub dry_run: bool,
    /// Pause between strategies for the same signal, in milliseconds
    #[serde(default = "default_strategy_delay")]
    pub strategy_delay_ms: u64,
    /// Directory holding the per-strategy state files
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            listen_addr: default_listen_addr(),
            dry_run: false,
            strategy_delay_ms: default_strategy_delay(),
            state_dir: default_state_dir(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_listen_addr() -> String {
    "127.0.0.1:7878".to_string()
}

fn default_strategy_delay() -> u64 {
    1000
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".")
}
