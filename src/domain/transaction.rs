//! Transaction records
//!
//! One record per leg of a transfer. A completed internal transfer is
//! exactly one OUTBOUND record on the sender's account and one INBOUND
//! record on the recipient's account, sharing the reference number.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::Currency;

/// Which side of the transfer this record represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Outbound,
    Inbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Outbound => "outbound",
            Direction::Inbound => "inbound",
        }
    }

    /// Sign applied to the amount when shaping history entries.
    pub fn sign(&self) -> Decimal {
        match self {
            Direction::Outbound => Decimal::NEGATIVE_ONE,
            Direction::Inbound => Decimal::ONE,
        }
    }
}

impl From<String> for Direction {
    fn from(s: String) -> Self {
        match s.as_str() {
            "inbound" => Direction::Inbound,
            _ => Direction::Outbound,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Record lifecycle. Completed and Failed are terminal: corrections are
/// new compensating records, never edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Completed | TransactionStatus::Failed)
    }
}

impl From<String> for TransactionStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "pending" => TransactionStatus::Pending,
            "completed" => TransactionStatus::Completed,
            _ => TransactionStatus::Failed,
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Attempted transition out of a terminal status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Transaction is already {0}, cannot transition")]
pub struct TerminalStatus(pub TransactionStatus);

/// The other party of a leg: the recipient on an OUTBOUND record, the
/// sender on an INBOUND one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counterparty {
    pub name: String,
    /// Normalized routing identifier
    pub routing: String,
    /// True when the counterparty account lives in this system
    pub internal: bool,
}

/// Cross-currency quote details embedded on both legs of a transfer.
///
/// Stored as an opaque, versioned JSON blob on the transaction row.
/// Readers must tolerate blobs written by other versions (or corrupted
/// in place) and degrade to no-metadata rather than fail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteMetadata {
    pub version: u32,
    /// Requested source amount, before margin and fee
    pub source_amount: Decimal,
    pub source_currency: Currency,
    pub target_amount: Decimal,
    pub target_currency: Currency,
    pub spot_rate: Decimal,
    pub customer_rate: Decimal,
    pub platform_fee: Decimal,
    pub rate_source: String,
    pub quoted_at: DateTime<Utc>,
}

/// Current metadata blob version.
pub const QUOTE_METADATA_VERSION: u32 = 1;

impl QuoteMetadata {
    /// Parse a stored metadata blob, tolerating malformed content.
    ///
    /// Returns `None` for missing blobs, unknown versions and any shape
    /// mismatch; a single bad row must never fail a whole history page.
    pub fn from_value(value: Option<&serde_json::Value>) -> Option<Self> {
        let value = value?;
        let version = value.get("version").and_then(|v| v.as_u64())?;
        if version != u64::from(QUOTE_METADATA_VERSION) {
            tracing::warn!(version, "Unknown quote metadata version, skipping");
            return None;
        }
        match serde_json::from_value(value.clone()) {
            Ok(meta) => Some(meta),
            Err(e) => {
                tracing::warn!(error = %e, "Malformed quote metadata, skipping");
                None
            }
        }
    }
}

/// One leg of a transfer as recorded against an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: Uuid,
    /// Customer-facing tracking id, shared by both legs; doubles as the
    /// idempotency key
    pub reference: String,
    pub account_id: Uuid,
    pub direction: Direction,
    /// Unsigned amount in `currency`; direction carries the sign
    pub amount: Decimal,
    pub currency: Currency,
    pub counterparty: Counterparty,
    pub status: TransactionStatus,
    pub description: String,
    /// Opaque versioned metadata (quote details for cross-currency legs)
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TransactionRecord {
    /// Build a new pending leg.
    #[allow(clippy::too_many_arguments)]
    pub fn pending(
        reference: &str,
        account_id: Uuid,
        direction: Direction,
        amount: Decimal,
        currency: Currency,
        counterparty: Counterparty,
        description: &str,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            reference: reference.to_string(),
            account_id,
            direction,
            amount,
            currency,
            counterparty,
            status: TransactionStatus::Pending,
            description: description.to_string(),
            metadata,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Transition PENDING -> COMPLETED.
    pub fn complete(mut self, at: DateTime<Utc>) -> Result<Self, TerminalStatus> {
        if self.status.is_terminal() {
            return Err(TerminalStatus(self.status));
        }
        self.status = TransactionStatus::Completed;
        self.completed_at = Some(at);
        Ok(self)
    }

    /// Transition PENDING -> FAILED.
    pub fn fail(mut self, at: DateTime<Utc>) -> Result<Self, TerminalStatus> {
        if self.status.is_terminal() {
            return Err(TerminalStatus(self.status));
        }
        self.status = TransactionStatus::Failed;
        self.completed_at = Some(at);
        Ok(self)
    }
}
