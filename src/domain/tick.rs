//! Price ticks and the exchanges that produce them.
//!
//! A `PriceTick` is the exchange-neutral form every WebSocket and REST
//! adapter reduces its wire frames to. The price is kept as the exact
//! textual decimal the exchange sent; it is validated but never
//! re-formatted, so the stored score matches the upstream feed byte for byte.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Crypto exchanges with a live ticker adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Exchange {
    Binance,
    Bybit,
    Okx,
}

impl Exchange {
    /// Human-readable name used in event rules text.
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Binance => "Binance",
            Self::Bybit => "Bybit",
            Self::Okx => "OKX",
        }
    }

    /// Lowercase label for metrics and log fields.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Binance => "binance",
            Self::Bybit => "bybit",
            Self::Okx => "okx",
        }
    }

    const fn code(self) -> &'static str {
        match self {
            Self::Binance => "BINANCE",
            Self::Bybit => "BYBIT",
            Self::Okx => "OKX",
        }
    }

    /// Natural key of the event tracking `symbol` on this exchange.
    ///
    /// `external_id("BTCUSDT")` on Binance is `BINANCE_BTCUSDT`.
    pub fn external_id(self, symbol: &str) -> String {
        format!("{}_{}", self.code(), symbol)
    }

    /// Daily period code, one period per exchange per UTC calendar day.
    pub fn period_code(self, at: DateTime<Utc>) -> String {
        format!("CRYPTO_{}__{}", self.code(), at.format("%Y-%m-%d"))
    }
}

impl std::fmt::Display for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Why a candidate tick was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TickError {
    #[error("tick has an empty symbol")]
    EmptySymbol,
    #[error("tick for {symbol} has an empty price")]
    EmptyPrice { symbol: String },
    #[error("tick for {symbol} has a non-decimal price {price:?}")]
    InvalidPrice { symbol: String, price: String },
}

/// Last traded price of one symbol, as reported by an exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceTick {
    /// Exchange-native symbol without separators (e.g. "BTCUSDT").
    pub symbol: String,
    /// Price exactly as received.
    pub price: String,
}

impl PriceTick {
    /// Build a tick, rejecting empty symbols and non-decimal prices.
    pub fn new(symbol: impl Into<String>, price: impl Into<String>) -> Result<Self, TickError> {
        let symbol = symbol.into();
        let price = price.into();

        if symbol.is_empty() {
            return Err(TickError::EmptySymbol);
        }
        if price.is_empty() {
            return Err(TickError::EmptyPrice { symbol });
        }
        if Decimal::from_str(&price).is_err() {
            return Err(TickError::InvalidPrice { symbol, price });
        }

        Ok(Self { symbol, price })
    }

    /// The price as a decimal.
    pub fn decimal(&self) -> Decimal {
        // Validated in `new`; a failure here means the struct was built by hand.
        Decimal::from_str(&self.price).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn test_tick_keeps_price_text_verbatim() {
        let tick = PriceTick::new("BTCUSDT", "50000.10").unwrap();
        assert_eq!(tick.price, "50000.10");
        assert_eq!(tick.decimal(), dec!(50000.10));
    }

    #[test]
    fn test_tick_rejects_bad_input() {
        assert_eq!(PriceTick::new("", "1"), Err(TickError::EmptySymbol));
        assert!(matches!(
            PriceTick::new("ETHUSDT", ""),
            Err(TickError::EmptyPrice { .. })
        ));
        assert!(matches!(
            PriceTick::new("ETHUSDT", "abc"),
            Err(TickError::InvalidPrice { .. })
        ));
    }

    #[test]
    fn test_external_ids_are_namespaced() {
        assert_eq!(Exchange::Binance.external_id("BTCUSDT"), "BINANCE_BTCUSDT");
        assert_eq!(Exchange::Bybit.external_id("BTCUSDT"), "BYBIT_BTCUSDT");
        assert_eq!(Exchange::Okx.external_id("BTCUSDT"), "OKX_BTCUSDT");
    }

    #[test]
    fn test_period_code_uses_utc_date() {
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 23, 59, 59).unwrap();
        assert_eq!(Exchange::Binance.period_code(at), "CRYPTO_BINANCE__2024-06-01");
        assert_eq!(Exchange::Okx.period_code(at), "CRYPTO_OKX__2024-06-01");
    }
}
