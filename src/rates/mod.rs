//! Exchange rate provider boundary
//!
//! The real provider is an external service; the ledger only consumes
//! spot rates through the [`RateProvider`] trait. A missing or unusable
//! rate is a hard failure, never something to guess around.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::{Currency, LedgerError};

/// A spot rate for one currency pair at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotRate {
    pub source: Currency,
    pub target: Currency,
    pub rate: Decimal,
    pub timestamp: DateTime<Utc>,
    /// Name of the upstream source the rate came from
    pub provider: String,
}

/// Read-only source of spot exchange rates.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Fetch the current spot rate for `source` -> `target`.
    ///
    /// # Errors
    /// `LedgerError::RateUnavailable` when the pair is unknown or the
    /// provider returned a non-positive rate.
    async fn get_rate(&self, source: Currency, target: Currency)
        -> Result<SpotRate, LedgerError>;
}

/// Fixed-table rate provider.
///
/// Stand-in for the external provider at the service boundary: rates
/// come from configuration and are stamped at construction time. Also
/// the provider used by the test suites.
#[derive(Debug, Clone)]
pub struct StaticRateProvider {
    rates: HashMap<(Currency, Currency), Decimal>,
    /// Pinned timestamp; served rates are stamped at fetch time when unset
    stamped_at: Option<DateTime<Utc>>,
}

impl StaticRateProvider {
    pub fn new() -> Self {
        Self {
            rates: HashMap::new(),
            stamped_at: None,
        }
    }

    /// Register a rate and its inverse.
    pub fn with_rate(mut self, source: Currency, target: Currency, rate: Decimal) -> Self {
        self.rates.insert((source, target), rate);
        if rate > Decimal::ZERO {
            self.rates.insert((target, source), Decimal::ONE / rate);
        }
        self
    }

    /// Pin the timestamp attached to served rates (staleness tests).
    pub fn stamped_at(mut self, at: DateTime<Utc>) -> Self {
        self.stamped_at = Some(at);
        self
    }
}

impl Default for StaticRateProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateProvider for StaticRateProvider {
    async fn get_rate(
        &self,
        source: Currency,
        target: Currency,
    ) -> Result<SpotRate, LedgerError> {
        let rate = self
            .rates
            .get(&(source, target))
            .copied()
            .ok_or(LedgerError::RateUnavailable { source, target })?;

        if rate <= Decimal::ZERO {
            tracing::error!(%source, %target, %rate, "Non-positive configured rate");
            return Err(LedgerError::RateUnavailable { source, target });
        }

        Ok(SpotRate {
            source,
            target,
            rate,
            timestamp: self.stamped_at.unwrap_or_else(Utc::now),
            provider: "static".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_known_pair() {
        let provider =
            StaticRateProvider::new().with_rate(Currency::Eur, Currency::Hnl, dec!(24.5));

        let spot = provider.get_rate(Currency::Eur, Currency::Hnl).await.unwrap();
        assert_eq!(spot.rate, dec!(24.5));
        assert_eq!(spot.provider, "static");
    }

    #[tokio::test]
    async fn test_inverse_pair_registered() {
        let provider =
            StaticRateProvider::new().with_rate(Currency::Eur, Currency::Hnl, dec!(25));

        let spot = provider.get_rate(Currency::Hnl, Currency::Eur).await.unwrap();
        assert_eq!(spot.rate, dec!(0.04));
    }

    #[tokio::test]
    async fn test_unknown_pair_fails() {
        let provider = StaticRateProvider::new();
        let err = provider
            .get_rate(Currency::Eur, Currency::Hnl)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "rate_unavailable");
    }

    #[tokio::test]
    async fn test_non_positive_rate_fails() {
        let mut provider = StaticRateProvider::new();
        provider.rates.insert((Currency::Eur, Currency::Hnl), dec!(0));

        let err = provider
            .get_rate(Currency::Eur, Currency::Hnl)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "rate_unavailable");
    }
}
