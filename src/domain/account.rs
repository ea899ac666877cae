//! Account model
//!
//! A user's virtual account in a single currency. The balance is only
//! ever mutated inside the store's atomic transfer unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{Balance, Currency};

/// Account lifecycle status. Closed accounts keep their transaction
/// history (soft-close only) but no longer participate in transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Closed,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Closed => "closed",
        }
    }
}

impl From<String> for AccountStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "active" => AccountStatus::Active,
            _ => AccountStatus::Closed,
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Virtual routing identifier (IBAN or account number).
///
/// Stored and compared in normalized form: surrounding and embedded
/// whitespace stripped, letters uppercased. Lookups on the raw user
/// input would otherwise produce false "external" resolutions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Iban(String);

impl Iban {
    /// Normalize a raw routing identifier.
    pub fn new(raw: &str) -> Self {
        let normalized: String = raw
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| c.to_ascii_uppercase())
            .collect();
        Self(normalized)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Iban {
    fn from(raw: String) -> Self {
        Iban::new(&raw)
    }
}

impl From<Iban> for String {
    fn from(iban: Iban) -> Self {
        iban.0
    }
}

impl fmt::Display for Iban {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A per-currency virtual account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Customer-facing holder name, used as counterparty descriptor
    pub holder_name: String,
    pub currency: Currency,
    /// Routing identifier, unique per (user, currency)
    pub iban: Iban,
    pub balance: Balance,
    pub status: AccountStatus,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Whether this account may participate in transfers.
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}
