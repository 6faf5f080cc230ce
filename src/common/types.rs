//! Unified types used across strategies, brokers and signal sources

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::errors::{BridgeError, Result};

/// Brokerage-assigned identifier of a trade or resting order
pub type TradeId = u64;

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The other side of the market
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// +1 for buys, -1 for sells; multiplies a favourable price move into a positive number
    pub fn direction(self) -> Decimal {
        match self {
            Side::Buy => Decimal::ONE,
            Side::Sell => Decimal::NEGATIVE_ONE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "buy" => Ok(Side::Buy),
            "sell" => Ok(Side::Sell),
            other => Err(BridgeError::Parse(format!("unknown side '{}'", other))),
        }
    }
}

/// What the provider did with its position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderAction {
    Open,
    Close,
}

// ============================================================================
// Currencies and pairs
// ============================================================================

/// Currencies appearing in the supported pair table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Currency {
    AUD,
    CAD,
    CHF,
    EUR,
    GBP,
    JPY,
    NZD,
    USD,
}

impl Currency {
    pub fn as_str(self) -> &'static str {
        match self {
            Currency::AUD => "AUD",
            Currency::CAD => "CAD",
            Currency::CHF => "CHF",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
            Currency::JPY => "JPY",
            Currency::NZD => "NZD",
            Currency::USD => "USD",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "AUD" => Ok(Currency::AUD),
            "CAD" => Ok(Currency::CAD),
            "CHF" => Ok(Currency::CHF),
            "EUR" => Ok(Currency::EUR),
            "GBP" => Ok(Currency::GBP),
            "JPY" => Ok(Currency::JPY),
            "NZD" => Ok(Currency::NZD),
            "USD" => Ok(Currency::USD),
            other => Err(BridgeError::InvalidPair(format!("unknown currency '{}'", other))),
        }
    }
}

use Currency::*;

/// Every pair the bridge will trade, in canonical BASE_QUOTE order
pub const SUPPORTED_PAIRS: [(Currency, Currency); 28] = [
    (AUD, CAD),
    (AUD, CHF),
    (AUD, JPY),
    (AUD, NZD),
    (AUD, USD),
    (CAD, CHF),
    (CAD, JPY),
    (CHF, JPY),
    (EUR, AUD),
    (EUR, CAD),
    (EUR, CHF),
    (EUR, GBP),
    (EUR, JPY),
    (EUR, NZD),
    (EUR, USD),
    (GBP, AUD),
    (GBP, CAD),
    (GBP, CHF),
    (GBP, JPY),
    (GBP, NZD),
    (GBP, USD),
    (NZD, CAD),
    (NZD, CHF),
    (NZD, JPY),
    (NZD, USD),
    (USD, CAD),
    (USD, CHF),
    (USD, JPY),
];

/// A supported currency pair such as `EUR_USD`
///
/// Construction only succeeds for members of [`SUPPORTED_PAIRS`], so base and
/// quote always differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyPair {
    base: Currency,
    quote: Currency,
}

impl CurrencyPair {
    pub const AUD_USD: CurrencyPair = CurrencyPair { base: AUD, quote: USD };
    pub const EUR_USD: CurrencyPair = CurrencyPair { base: EUR, quote: USD };

    /// Build a pair from its two legs, failing if it is not in the supported table
    pub fn new(base: Currency, quote: Currency) -> Result<Self> {
        if SUPPORTED_PAIRS.contains(&(base, quote)) {
            Ok(Self { base, quote })
        } else {
            Err(BridgeError::InvalidPair(format!("{}_{}", base, quote)))
        }
    }

    /// Find the supported pair made of two currencies, whichever order they are given in
    pub fn between(a: Currency, b: Currency) -> Result<Self> {
        Self::new(a, b).or_else(|_| Self::new(b, a))
    }

    /// All supported pairs
    pub fn all() -> impl Iterator<Item = CurrencyPair> {
        SUPPORTED_PAIRS
            .iter()
            .map(|&(base, quote)| CurrencyPair { base, quote })
    }

    pub fn base(&self) -> Currency {
        self.base
    }

    pub fn quote(&self) -> Currency {
        self.quote
    }

    /// Whether prices are quoted in yen, which moves the pip to the second decimal
    pub fn is_jpy_quoted(&self) -> bool {
        self.quote == Currency::JPY
    }

    pub fn contains(&self, currency: Currency) -> bool {
        self.base == currency || self.quote == currency
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.base, self.quote)
    }
}

impl FromStr for CurrencyPair {
    type Err = BridgeError;

    /// Accepts `EUR_USD`, `EUR/USD` or `EURUSD`
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if !s.is_ascii() {
            return Err(BridgeError::InvalidPair(s.to_string()));
        }
        let (base, quote) = match s.len() {
            7 if matches!(s.as_bytes()[3], b'_' | b'/') => (&s[..3], &s[4..]),
            6 => (&s[..3], &s[3..]),
            _ => return Err(BridgeError::InvalidPair(s.to_string())),
        };
        let base = base.parse().map_err(|_| BridgeError::InvalidPair(s.to_string()))?;
        let quote = quote.parse().map_err(|_| BridgeError::InvalidPair(s.to_string()))?;
        CurrencyPair::new(base, quote)
    }
}

impl TryFrom<String> for CurrencyPair {
    type Error = BridgeError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<CurrencyPair> for String {
    fn from(pair: CurrencyPair) -> Self {
        pair.to_string()
    }
}

// ============================================================================
// Signals
// ============================================================================

/// One provider trade notification, already tokenised
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSignal {
    pub action: ProviderAction,
    pub side: Side,
    /// Provider position size in provider units
    pub size: u64,
    pub pair: CurrencyPair,
    /// Price the provider reports having traded at
    pub provider_price: Decimal,
}

impl TradeSignal {
    pub fn new(
        action: ProviderAction,
        side: Side,
        size: u64,
        pair: CurrencyPair,
        provider_price: Decimal,
    ) -> Self {
        Self {
            action,
            side,
            size,
            pair,
            provider_price,
        }
    }

    /// Check the numeric fields a parser cannot enforce by type
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(BridgeError::Parse(format!(
                "signal for {} has zero size",
                self.pair
            )));
        }
        if self.provider_price <= Decimal::ZERO {
            return Err(BridgeError::Parse(format!(
                "signal for {} has non-positive price {}",
                self.pair, self.provider_price
            )));
        }
        Ok(())
    }
}

impl fmt::Display for TradeSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} {} {} {} @ {}",
            self.action, self.side, self.size, self.pair, self.provider_price
        )
    }
}

/// All signals carried by a single provider notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalBundle {
    pub signals: Vec<TradeSignal>,
    /// Legs in the notification, counting any dropped as invalid
    #[serde(default)]
    pub legs: usize,
}

impl SignalBundle {
    pub fn new(signals: Vec<TradeSignal>, legs: usize) -> Self {
        Self { signals, legs }
    }

    pub fn single(signal: TradeSignal) -> Self {
        Self::new(vec![signal], 1)
    }

    /// Whether the notification carried more than one leg
    pub fn is_multi(&self) -> bool {
        self.legs.max(self.signals.len()) > 1
    }
}

// ============================================================================
// Brokerage views
// ============================================================================

/// Live two-sided price for a pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub ask: Decimal,
    pub bid: Decimal,
}

impl Quote {
    pub fn new(ask: Decimal, bid: Decimal) -> Self {
        Self { ask, bid }
    }

    /// Price paid to enter on `side`
    pub fn entry_price(&self, side: Side) -> Decimal {
        match side {
            Side::Buy => self.ask,
            Side::Sell => self.bid,
        }
    }

    /// Price received when exiting a position opened on `side`
    pub fn exit_price(&self, side: Side) -> Decimal {
        match side {
            Side::Buy => self.bid,
            Side::Sell => self.ask,
        }
    }

    pub fn mid(&self) -> Decimal {
        (self.ask + self.bid) / Decimal::TWO
    }
}

/// Local account equity, read fresh before every sizing decision
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccountSnapshot {
    pub balance: Decimal,
}

/// An open trade as the brokerage reports it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteTrade {
    pub id: TradeId,
    pub pair: CurrencyPair,
    pub side: Side,
    pub units: u64,
    pub open_price: Decimal,
    pub stop_loss: Option<Decimal>,
    /// Trailing stop distance in pips
    pub trailing_stop: Option<Decimal>,
}

/// A resting limit order as the brokerage reports it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOrder {
    pub id: TradeId,
    pub pair: CurrencyPair,
    pub side: Side,
    pub units: u64,
    pub price: Decimal,
    pub stop_loss: Option<Decimal>,
}
