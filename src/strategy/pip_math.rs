//! Conversions between price deltas and pips

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use crate::common::types::{CurrencyPair, Side};

/// Pip arithmetic for the supported pairs
///
/// A pip is 0.01 on yen-quoted pairs and 0.0001 everywhere else.
pub struct PipMath;

impl PipMath {
    /// Pips per unit of price
    fn scale(pair: CurrencyPair) -> Decimal {
        if pair.is_jpy_quoted() {
            dec!(100)
        } else {
            dec!(10000)
        }
    }

    fn price_dp(pair: CurrencyPair) -> u32 {
        if pair.is_jpy_quoted() {
            2
        } else {
            4
        }
    }

    /// One pip as a price delta
    pub fn pip_size(pair: CurrencyPair) -> Decimal {
        Decimal::ONE / Self::scale(pair)
    }

    /// Price delta to pips
    pub fn to_pips(pair: CurrencyPair, price_delta: Decimal) -> Decimal {
        price_delta * Self::scale(pair)
    }

    /// Pips to price delta
    pub fn to_price(pair: CurrencyPair, pips: Decimal) -> Decimal {
        pips / Self::scale(pair)
    }

    /// Round a price to the instrument's quoting precision, half-up
    pub fn round_price(pair: CurrencyPair, price: Decimal) -> Decimal {
        price.round_dp_with_strategy(Self::price_dp(pair), RoundingStrategy::MidpointAwayFromZero)
    }

    /// Price delta to pips, rounded half-up to a tenth of a pip
    pub fn round_pips(pair: CurrencyPair, price_delta: Decimal) -> Decimal {
        Self::to_pips(pair, price_delta)
            .round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero)
    }

    /// Absolute gap between two prices in tenth-of-a-pip precision
    pub fn distance_pips(pair: CurrencyPair, a: Decimal, b: Decimal) -> Decimal {
        Self::round_pips(pair, (a - b).abs())
    }

    /// Whether entering `side` at `current` is close enough to the provider's price
    ///
    /// Accepted when the gap is within `max_pip_diff`, or when the live price
    /// is already better for `side` than the provider's.
    pub fn entry_acceptable(
        pair: CurrencyPair,
        side: Side,
        current: Decimal,
        provider_price: Decimal,
        max_pip_diff: Decimal,
    ) -> bool {
        let favourable = match side {
            Side::Buy => current < provider_price,
            Side::Sell => current > provider_price,
        };
        favourable || Self::distance_pips(pair, current, provider_price) <= max_pip_diff
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pair(s: &str) -> CurrencyPair {
        s.parse().unwrap()
    }

    #[test]
    fn test_to_pips() {
        assert_eq!(PipMath::to_pips(pair("EUR_USD"), dec!(0.0025)), dec!(25));
        assert_eq!(PipMath::to_pips(pair("USD_JPY"), dec!(0.25)), dec!(25));
        assert_eq!(PipMath::to_pips(pair("EUR_USD"), dec!(-0.0001)), dec!(-1));
    }

    #[test]
    fn test_to_price() {
        assert_eq!(PipMath::to_price(pair("EUR_USD"), dec!(25)), dec!(0.0025));
        assert_eq!(PipMath::to_price(pair("GBP_JPY"), dec!(25)), dec!(0.25));
        assert_eq!(PipMath::pip_size(pair("AUD_USD")), dec!(0.0001));
        assert_eq!(PipMath::pip_size(pair("CAD_JPY")), dec!(0.01));
    }

    #[test]
    fn test_round_trip() {
        let deltas = [dec!(0.00017), dec!(0.0123), dec!(1.5), dec!(-0.0042)];
        for p in [pair("EUR_USD"), pair("USD_JPY"), pair("NZD_CHF")] {
            for delta in deltas {
                let back = PipMath::to_price(p, PipMath::to_pips(p, delta));
                assert!((back - delta).abs() <= dec!(0.0000000001), "{} {}", p, delta);
            }
        }
    }

    #[test]
    fn test_round_price_half_up() {
        let eur = pair("EUR_USD");
        assert_eq!(PipMath::round_price(eur, dec!(1.10005)), dec!(1.1001));
        assert_eq!(PipMath::round_price(eur, dec!(1.10004)), dec!(1.1000));
        assert_eq!(PipMath::round_price(eur, dec!(1.100049)), dec!(1.1000));

        let jpy = pair("USD_JPY");
        assert_eq!(PipMath::round_price(jpy, dec!(110.125)), dec!(110.13));
        assert_eq!(PipMath::round_price(jpy, dec!(110.124)), dec!(110.12));
    }

    #[test]
    fn test_round_pips() {
        let eur = pair("EUR_USD");
        assert_eq!(PipMath::round_pips(eur, dec!(0.00001)), dec!(0.1));
        assert_eq!(PipMath::round_pips(eur, dec!(0.000015)), dec!(0.2));
        assert_eq!(PipMath::distance_pips(eur, dec!(1.1000), dec!(1.1001)), dec!(1.0));
    }

    #[test]
    fn test_entry_acceptable() {
        let eur = pair("EUR_USD");
        assert!(PipMath::entry_acceptable(eur, Side::Buy, dec!(1.1001), dec!(1.1000), dec!(5)));
        assert!(PipMath::entry_acceptable(eur, Side::Buy, dec!(1.1005), dec!(1.1000), dec!(5)));
        assert!(!PipMath::entry_acceptable(eur, Side::Buy, dec!(1.1006), dec!(1.1000), dec!(5)));
        // far away but cheaper than the provider paid
        assert!(PipMath::entry_acceptable(eur, Side::Buy, dec!(1.0900), dec!(1.1000), dec!(5)));
        assert!(PipMath::entry_acceptable(eur, Side::Sell, dec!(1.1100), dec!(1.1000), dec!(5)));
        assert!(!PipMath::entry_acceptable(eur, Side::Sell, dec!(1.0990), dec!(1.1000), dec!(5)));
    }
}
