//! Currency type
//!
//! Closed set of currencies the platform holds virtual accounts in.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Currencies supported by the internal ledger.
///
/// The set is closed on purpose: every account, limit and rounding rule
/// is defined per currency, and an unknown currency must be rejected at
/// the boundary instead of flowing into balance arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// Euro
    Eur,
    /// Honduran lempira
    Hnl,
}

impl Currency {
    /// Number of minor-unit decimal places (cents / centavos).
    pub fn minor_units(&self) -> u32 {
        match self {
            Currency::Eur => 2,
            Currency::Hnl => 2,
        }
    }

    /// Maximum amount a single transfer may move in this currency.
    pub fn transfer_limit(&self) -> Decimal {
        match self {
            Currency::Eur => Decimal::new(10_000, 0),
            Currency::Hnl => Decimal::new(250_000, 0),
        }
    }

    /// ISO 4217 code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Eur => "EUR",
            Currency::Hnl => "HNL",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// `LedgerError::RateUnavailable` carries a field named `source`, which
// thiserror's derive wires into `Error::source()`; that requires
// `Currency: std::error::Error`.
impl std::error::Error for Currency {}

/// Unknown currency code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported currency: {0}")]
pub struct UnknownCurrency(pub String);

impl FromStr for Currency {
    type Err = UnknownCurrency;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EUR" => Ok(Currency::Eur),
            "HNL" => Ok(Currency::Hnl),
            other => Err(UnknownCurrency(other.to_string())),
        }
    }
}
