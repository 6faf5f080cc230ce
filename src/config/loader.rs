//! Configuration loader

use config::{Config, Environment, File};
use std::path::Path;

use super::types::AppConfig;
use crate::common::errors::{BridgeError, Result};

/// Load configuration from file and environment variables
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with APP__, e.g. `APP__REVERSE__ACCOUNT_ID`)
/// 2. Configuration file (TOML format)
/// 3. Default values
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    let mut builder = Config::builder();

    if let Some(path) = config_path {
        if Path::new(path).exists() {
            builder = builder.add_source(File::with_name(path).required(false));
        }
    }

    builder = builder.add_source(
        Environment::with_prefix("APP")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    // The API token is commonly kept in .env under its own name
    if let Ok(token) = std::env::var("OANDA_API_KEY") {
        builder = builder
            .set_override("broker.api_key", token)
            .map_err(|e| BridgeError::Configuration(e.to_string()))?;
    }

    let config = builder
        .build()
        .map_err(|e| BridgeError::Configuration(e.to_string()))?;

    let app: AppConfig = config
        .try_deserialize()
        .map_err(|e| BridgeError::Configuration(e.to_string()))?;

    validate(&app)?;
    Ok(app)
}

/// Reject settings no engine could run with
pub fn validate(config: &AppConfig) -> Result<()> {
    if config.provider.reference_equity <= rust_decimal::Decimal::ZERO {
        return Err(BridgeError::Configuration(
            "provider.reference_equity must be positive".to_string(),
        ));
    }
    if !config.provider.reference_pair.contains(config.provider.account_currency) {
        return Err(BridgeError::Configuration(format!(
            "provider.reference_pair {} does not involve account currency {}",
            config.provider.reference_pair, config.provider.account_currency
        )));
    }
    if config.copy.multiplier == 0 || config.smart_copy.multiplier == 0 {
        return Err(BridgeError::Configuration(
            "strategy multipliers must be at least 1".to_string(),
        ));
    }
    if config.reverse.initial_stop_pips <= rust_decimal::Decimal::ZERO {
        return Err(BridgeError::Configuration(
            "reverse.initial_stop_pips must be positive".to_string(),
        ));
    }
    if config.reverse.promoter_interval_seconds == 0 {
        return Err(BridgeError::Configuration(
            "reverse.promoter_interval_seconds must be positive".to_string(),
        ));
    }
    Ok(())
}
