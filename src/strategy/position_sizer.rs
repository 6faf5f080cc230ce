//! Position sizing: provider units to local units, and pip valuation

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

use crate::common::errors::{BridgeError, Result};
use crate::common::traits::BrokerGateway;
use crate::common::types::{AccountSnapshot, Currency, CurrencyPair};
use crate::config::ProviderConfig;
use crate::strategy::pip_math::PipMath;

/// Scales provider sizes to the local account
///
/// The provider's sizes assume an account of `reference_equity` in the
/// reference currency; the local balance is converted into that currency
/// through the reference pair before taking the ratio.
#[derive(Debug, Clone)]
pub struct PositionSizer {
    config: ProviderConfig,
}

impl PositionSizer {
    pub fn new(config: ProviderConfig) -> Self {
        Self { config }
    }

    pub fn account_currency(&self) -> Currency {
        self.config.account_currency
    }

    /// Fresh account equity; a non-positive balance cannot be sized against
    pub async fn account(&self, gateway: &dyn BrokerGateway) -> Result<AccountSnapshot> {
        let balance = gateway.get_account_balance().await?;
        if balance <= Decimal::ZERO {
            return Err(BridgeError::InvalidInput(format!(
                "local balance must be positive, got {}",
                balance
            )));
        }
        debug!(%balance, currency = %self.config.account_currency, "Read account balance");
        Ok(AccountSnapshot { balance })
    }

    /// Local units for a provider size, fetching the reference rate
    ///
    /// # Arguments
    /// * `gateway` - Broker used for the reference pair's ask
    /// * `provider_units` - Size the provider traded
    /// * `local_balance` - Current balance in the account currency
    pub async fn size(
        &self,
        gateway: &dyn BrokerGateway,
        provider_units: u64,
        local_balance: Decimal,
    ) -> Result<u64> {
        let quote = gateway.get_price(self.config.reference_pair).await?;
        self.size_with_rate(provider_units, local_balance, quote.ask)
    }

    /// Local units for a provider size given the reference pair's ask
    ///
    /// `floor(provider_units / (reference_equity / (balance * rate)))`
    pub fn size_with_rate(
        &self,
        provider_units: u64,
        local_balance: Decimal,
        reference_rate: Decimal,
    ) -> Result<u64> {
        if provider_units == 0 {
            return Err(BridgeError::InvalidInput(
                "provider units must be positive".to_string(),
            ));
        }
        if local_balance <= Decimal::ZERO {
            return Err(BridgeError::InvalidInput(format!(
                "local balance must be positive, got {}",
                local_balance
            )));
        }
        if reference_rate <= Decimal::ZERO {
            return Err(BridgeError::InvalidInput(format!(
                "reference rate must be positive, got {}",
                reference_rate
            )));
        }

        let converted = if self.config.reference_pair.base() == self.config.account_currency {
            local_balance * reference_rate
        } else {
            local_balance / reference_rate
        };
        let ratio = self.config.reference_equity / converted;
        let units = (Decimal::from(provider_units) / ratio).floor();

        debug!(
            provider_units,
            %local_balance,
            %reference_rate,
            %ratio,
            %units,
            "Sized provider position"
        );

        units
            .to_u64()
            .ok_or_else(|| BridgeError::InvalidInput(format!("sized units out of range: {}", units)))
    }

    /// Value of one pip on one unit of `pair`, in the account currency
    pub async fn value_per_pip(
        &self,
        gateway: &dyn BrokerGateway,
        pair: CurrencyPair,
    ) -> Result<Decimal> {
        let pair_mid = gateway.get_price(pair).await?.mid();
        let account = self.config.account_currency;

        let conversion = if pair.base() == account {
            None
        } else {
            let conversion_pair = CurrencyPair::between(account, pair.base())?;
            let mid = gateway.get_price(conversion_pair).await?.mid();
            Some((conversion_pair, mid))
        };

        pip_value_in_account(pair, pair_mid, account, conversion)
    }
}

/// Pip value per unit of `pair` in `account` currency
///
/// One pip is first valued in the pair's base currency, then converted with
/// the account/base pair's mid price when the base is not the account currency.
pub fn pip_value_in_account(
    pair: CurrencyPair,
    pair_mid: Decimal,
    account: Currency,
    conversion: Option<(CurrencyPair, Decimal)>,
) -> Result<Decimal> {
    if pair_mid <= Decimal::ZERO {
        return Err(BridgeError::InvalidInput(format!(
            "mid price for {} must be positive",
            pair
        )));
    }
    let in_base = PipMath::pip_size(pair) / pair_mid;

    match conversion {
        None => Ok(in_base),
        Some((conversion_pair, mid)) => {
            if mid <= Decimal::ZERO {
                return Err(BridgeError::InvalidInput(format!(
                    "mid price for {} must be positive",
                    conversion_pair
                )));
            }
            if conversion_pair.base() == account {
                Ok(in_base / mid)
            } else {
                Ok(in_base * mid)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::traits::MockBrokerGateway;
    use crate::common::types::Quote;
    use rust_decimal_macros::dec;

    fn sizer() -> PositionSizer {
        PositionSizer::new(ProviderConfig::default())
    }

    #[test]
    fn test_size_proportional_to_equity() {
        // 10_000 AUD at 0.75 is 7_500 USD against a 1_200_000 provider account
        let units = sizer().size_with_rate(160_000, dec!(10000), dec!(0.75)).unwrap();
        assert_eq!(units, 1000);
    }

    #[test]
    fn test_size_floors() {
        let units = sizer().size_with_rate(100, dec!(10000), dec!(0.75)).unwrap();
        assert_eq!(units, 0);
    }

    #[test]
    fn test_size_rejects_non_positive_inputs() {
        let s = sizer();
        assert!(matches!(
            s.size_with_rate(0, dec!(10000), dec!(0.75)),
            Err(BridgeError::InvalidInput(_))
        ));
        assert!(matches!(
            s.size_with_rate(1000, dec!(0), dec!(0.75)),
            Err(BridgeError::InvalidInput(_))
        ));
        assert!(matches!(
            s.size_with_rate(1000, dec!(10000), dec!(-1)),
            Err(BridgeError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_size_monotonic() {
        let s = sizer();
        let mut previous = 0;
        for units in (1_000..200_000).step_by(7_919) {
            let sized = s.size_with_rate(units, dec!(25000), dec!(0.71)).unwrap();
            assert!(sized >= previous);
            previous = sized;
        }

        let mut previous = 0;
        for balance in (1_000..100_000).step_by(3_331) {
            let sized = s
                .size_with_rate(50_000, Decimal::from(balance), dec!(0.71))
                .unwrap();
            assert!(sized >= previous);
            previous = sized;
        }
    }

    #[test]
    fn test_pip_value_base_is_account() {
        let aud_usd: CurrencyPair = "AUD_USD".parse().unwrap();
        let value = pip_value_in_account(aud_usd, dec!(0.8), Currency::AUD, None).unwrap();
        assert_eq!(value, dec!(0.000125));
    }

    #[test]
    fn test_pip_value_converted() {
        let eur_usd: CurrencyPair = "EUR_USD".parse().unwrap();
        let eur_aud: CurrencyPair = "EUR_AUD".parse().unwrap();
        // 0.0001 / 1.25 EUR, then EUR -> AUD at 1.5
        let value =
            pip_value_in_account(eur_usd, dec!(1.25), Currency::AUD, Some((eur_aud, dec!(1.5))))
                .unwrap();
        assert_eq!(value, dec!(0.00012));

        let usd_jpy: CurrencyPair = "USD_JPY".parse().unwrap();
        let aud_usd: CurrencyPair = "AUD_USD".parse().unwrap();
        // 0.01 / 100 USD, then USD -> AUD dividing by AUD_USD 0.8
        let value =
            pip_value_in_account(usd_jpy, dec!(100), Currency::AUD, Some((aud_usd, dec!(0.8))))
                .unwrap();
        assert_eq!(value, dec!(0.000125));
    }

    #[tokio::test]
    async fn test_value_per_pip_queries_conversion_pair() {
        let mut gateway = MockBrokerGateway::new();
        gateway.expect_get_price().returning(|pair| {
            let quote = match pair.to_string().as_str() {
                "GBP_USD" => Quote::new(dec!(1.2501), dec!(1.2499)),
                "GBP_AUD" => Quote::new(dec!(2.0001), dec!(1.9999)),
                other => panic!("unexpected pair {}", other),
            };
            Ok(quote)
        });

        let value = sizer()
            .value_per_pip(&gateway, "GBP_USD".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(value, dec!(0.00016));
    }

    #[tokio::test]
    async fn test_size_propagates_broker_error() {
        let mut gateway = MockBrokerGateway::new();
        gateway
            .expect_get_price()
            .returning(|_| Err(BridgeError::InvalidResponse("boom".to_string())));

        let result = sizer().size(&gateway, 1000, dec!(10000)).await;
        assert!(matches!(result, Err(BridgeError::InvalidResponse(_))));
    }
}
