//! Fee & rate policy
//!
//! Pure computation of the customer rate, fee and converted amount for
//! a cross-currency transfer. No side effects; safe to call repeatedly.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::{Amount, Currency, LedgerError, QuoteMetadata, QUOTE_METADATA_VERSION};
use crate::rates::SpotRate;

/// Policy constants of the transfer core.
#[derive(Debug, Clone)]
pub struct TransferPolicy {
    /// Fraction of the spot rate retained as exchange margin
    pub margin: Decimal,
    /// Flat fee in source-currency units per cross-currency transfer
    pub platform_fee: Decimal,
    /// Attempts at the atomic unit before surfacing Contended
    pub max_commit_attempts: u32,
    /// Backoff between contended attempts
    pub retry_backoff: Duration,
    /// Deadline for one attempt at the atomic unit
    pub commit_timeout: Duration,
    /// Spot rates older than this are unusable
    pub quote_max_age: ChronoDuration,
}

impl Default for TransferPolicy {
    fn default() -> Self {
        Self {
            margin: Decimal::new(25, 3),       // 2.5%
            platform_fee: Decimal::new(99, 2), // 0.99
            max_commit_attempts: 3,
            retry_backoff: Duration::from_millis(25),
            commit_timeout: Duration::from_secs(5),
            quote_max_age: ChronoDuration::seconds(60),
        }
    }
}

/// A computed conversion for one cross-currency transfer.
///
/// Ephemeral: embedded in the resulting transaction records as metadata,
/// never persisted as a row of its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub source_amount: Decimal,
    pub source_currency: Currency,
    pub target_amount: Decimal,
    pub target_currency: Currency,
    pub spot_rate: Decimal,
    /// Spot rate after margin deduction, applied to the conversion
    pub customer_rate: Decimal,
    pub platform_fee: Decimal,
    /// Margin retained by the platform, in source currency
    pub exchange_margin: Decimal,
    /// Amount removed from the sender: source amount plus fee
    pub total_deducted: Decimal,
    pub rate_source: String,
    pub quoted_at: DateTime<Utc>,
}

impl Quote {
    /// Metadata blob embedded on both legs of the transfer.
    pub fn to_metadata(&self) -> serde_json::Value {
        let meta = QuoteMetadata {
            version: QUOTE_METADATA_VERSION,
            source_amount: self.source_amount,
            source_currency: self.source_currency,
            target_amount: self.target_amount,
            target_currency: self.target_currency,
            spot_rate: self.spot_rate,
            customer_rate: self.customer_rate,
            platform_fee: self.platform_fee,
            rate_source: self.rate_source.clone(),
            quoted_at: self.quoted_at,
        };
        serde_json::to_value(meta).expect("quote metadata serializes")
    }
}

impl TransferPolicy {
    /// Compute a conversion quote from a spot rate.
    ///
    /// Settled amounts are rounded to the target currency's minor units
    /// with round-half-even; the customer rate itself is kept at full
    /// precision so the rounding happens exactly once.
    ///
    /// # Errors
    /// - `RateUnavailable` on a non-positive or stale spot rate
    /// - `InvalidAmount` if the fee-inclusive total is unrepresentable
    pub fn quote(&self, spot: &SpotRate, amount: &Amount) -> Result<Quote, LedgerError> {
        self.quote_at(spot, amount, Utc::now())
    }

    /// `quote` with an explicit clock, used by the staleness tests.
    pub fn quote_at(
        &self,
        spot: &SpotRate,
        amount: &Amount,
        now: DateTime<Utc>,
    ) -> Result<Quote, LedgerError> {
        if spot.rate <= Decimal::ZERO {
            return Err(LedgerError::RateUnavailable {
                source: spot.source,
                target: spot.target,
            });
        }

        if now - spot.timestamp > self.quote_max_age {
            tracing::warn!(
                source = %spot.source,
                target = %spot.target,
                age_secs = (now - spot.timestamp).num_seconds(),
                "Rejecting stale spot rate"
            );
            return Err(LedgerError::RateUnavailable {
                source: spot.source,
                target: spot.target,
            });
        }

        let a = amount.value();
        let customer_rate = spot.rate * (Decimal::ONE - self.margin);
        let target_amount = (a * customer_rate).round_dp_with_strategy(
            spot.target.minor_units(),
            RoundingStrategy::MidpointNearestEven,
        );
        let exchange_margin = (a * (spot.rate - customer_rate)).round_dp_with_strategy(
            spot.source.minor_units(),
            RoundingStrategy::MidpointNearestEven,
        );
        let total_deducted = a + self.platform_fee;

        if target_amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(format!(
                "Converted amount rounds to zero ({} {} at {})",
                a, spot.source, customer_rate
            )));
        }

        Ok(Quote {
            source_amount: a,
            source_currency: spot.source,
            target_amount,
            target_currency: spot.target,
            spot_rate: spot.rate,
            customer_rate,
            platform_fee: self.platform_fee,
            exchange_margin,
            total_deducted,
            rate_source: spot.provider.clone(),
            quoted_at: spot.timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn spot(rate: Decimal) -> SpotRate {
        SpotRate {
            source: Currency::Eur,
            target: Currency::Hnl,
            rate,
            timestamp: Utc::now(),
            provider: "static".to_string(),
        }
    }

    #[test]
    fn test_reference_quote_eur_to_hnl() {
        // 100 EUR at spot 24.5 with 2.5% margin
        let policy = TransferPolicy::default();
        let amount = Amount::new(dec!(100)).unwrap();

        let quote = policy.quote(&spot(dec!(24.5)), &amount).unwrap();

        assert_eq!(quote.customer_rate, dec!(23.8875));
        assert_eq!(quote.target_amount, dec!(2388.75));
        assert_eq!(quote.platform_fee, dec!(0.99));
        assert_eq!(quote.total_deducted, dec!(100.99));
        assert_eq!(quote.exchange_margin, dec!(61.25));
    }

    #[test]
    fn test_rounding_is_half_even() {
        // 1 EUR at a customer rate ending exactly on a half-centavo:
        // 10.125 rounds to 10.12, not 10.13
        let policy = TransferPolicy {
            margin: Decimal::ZERO,
            ..TransferPolicy::default()
        };
        let amount = Amount::new(dec!(1)).unwrap();

        let quote = policy.quote(&spot(dec!(10.125)), &amount).unwrap();
        assert_eq!(quote.target_amount, dec!(10.12));

        // ...while 10.135 rounds up to 10.14
        let quote = policy.quote(&spot(dec!(10.135)), &amount).unwrap();
        assert_eq!(quote.target_amount, dec!(10.14));
    }

    #[test]
    fn test_non_positive_rate_rejected() {
        let policy = TransferPolicy::default();
        let amount = Amount::new(dec!(100)).unwrap();

        let err = policy.quote(&spot(dec!(0)), &amount).unwrap_err();
        assert_eq!(err.code(), "rate_unavailable");

        let err = policy.quote(&spot(dec!(-1)), &amount).unwrap_err();
        assert_eq!(err.code(), "rate_unavailable");
    }

    #[test]
    fn test_stale_rate_rejected() {
        let policy = TransferPolicy::default();
        let amount = Amount::new(dec!(100)).unwrap();

        let mut stale = spot(dec!(24.5));
        stale.timestamp = Utc::now() - ChronoDuration::seconds(120);

        let err = policy.quote(&stale, &amount).unwrap_err();
        assert_eq!(err.code(), "rate_unavailable");

        // Explicit clock: the same rate is fine within the window
        let fresh_now = stale.timestamp + ChronoDuration::seconds(30);
        assert!(policy.quote_at(&stale, &amount, fresh_now).is_ok());
    }

    #[test]
    fn test_quote_is_deterministic() {
        let policy = TransferPolicy::default();
        let amount = Amount::new(dec!(250.50)).unwrap();
        let s = spot(dec!(24.5));

        let now = Utc::now();
        let a = policy.quote_at(&s, &amount, now).unwrap();
        let b = policy.quote_at(&s, &amount, now).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_metadata_roundtrip() {
        let policy = TransferPolicy::default();
        let amount = Amount::new(dec!(100)).unwrap();
        let quote = policy.quote(&spot(dec!(24.5)), &amount).unwrap();

        let value = quote.to_metadata();
        let parsed = crate::domain::QuoteMetadata::from_value(Some(&value)).unwrap();
        assert_eq!(parsed.target_amount, dec!(2388.75));
        assert_eq!(parsed.source_currency, Currency::Eur);
    }
}
