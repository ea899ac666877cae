//! Ledger error taxonomy
//!
//! Closed set of failure kinds for the transfer core. Every failure the
//! ledger can surface is one of these; the HTTP layer maps each to a
//! stable error code.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use super::Currency;

/// Failure kinds of the transfer ledger and its collaborators.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LedgerError {
    /// Amount is zero, negative or not minor-unit representable
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Account does not exist
    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),

    /// Account exists but is closed
    #[error("Account is not active: {0}")]
    AccountInactive(Uuid),

    /// Sender balance does not cover the debit
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        required: Decimal,
        available: Decimal,
    },

    /// Amount exceeds the per-currency transfer ceiling
    #[error("Amount exceeds {currency} limit of {limit}")]
    AmountExceedsLimit { currency: Currency, limit: Decimal },

    /// No usable spot rate for the requested pair
    #[error("Exchange rate unavailable for {source}->{target}")]
    RateUnavailable { source: Currency, target: Currency },

    /// Reference replayed with materially different parameters
    #[error("Reference {0} already used by a different transfer")]
    DuplicateReference(String),

    /// Concurrent modification persisted after the retry budget
    #[error("Transfer contended, retries exhausted")]
    Contended,

    /// The atomic unit could not commit; nothing was applied
    #[error("Transfer failed: {0}")]
    TransferFailed(String),
}

impl LedgerError {
    /// Stable, customer-facing error code.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidAmount(_) => "invalid_amount",
            LedgerError::AccountNotFound(_) => "account_not_found",
            LedgerError::AccountInactive(_) => "account_inactive",
            LedgerError::InsufficientBalance { .. } => "insufficient_balance",
            LedgerError::AmountExceedsLimit { .. } => "amount_exceeds_limit",
            LedgerError::RateUnavailable { .. } => "rate_unavailable",
            LedgerError::DuplicateReference(_) => "duplicate_reference",
            LedgerError::Contended => "contended",
            LedgerError::TransferFailed(_) => "transfer_failed",
        }
    }

    /// Check if this is a validation error detected before any mutation.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidAmount(_)
                | Self::AccountNotFound(_)
                | Self::AccountInactive(_)
                | Self::InsufficientBalance { .. }
                | Self::AmountExceedsLimit { .. }
                | Self::RateUnavailable { .. }
                | Self::DuplicateReference(_)
        )
    }

    /// Check if the caller may safely retry with the same reference.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Contended | Self::TransferFailed(_))
    }
}
