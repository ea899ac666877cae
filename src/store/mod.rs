//! Transfer store
//!
//! Persistence boundary of the ledger. Account balances are the only
//! shared mutable state in the core, and the only code path allowed to
//! mutate them is [`TransferStore::apply_transfer`], the single atomic
//! unit covering debit, credit and both record inserts.

mod memory;
mod postgres;

pub use memory::{Fault, MemoryTransferStore};
pub use postgres::PgTransferStore;

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::{Account, Balance, Currency, Iban, TransactionRecord};

/// Store-level failures, mapped onto the ledger taxonomy by the caller.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),

    #[error("Account is not active: {0}")]
    AccountInactive(Uuid),

    /// Balance re-check inside the atomic unit failed
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        required: Decimal,
        available: Decimal,
    },

    /// A record with this reference already exists (replay race)
    #[error("Reference already recorded: {0}")]
    DuplicateReference(String),

    /// Concurrent modification detected; the unit was rolled back and
    /// may be retried
    #[error("Concurrent modification, unit rolled back")]
    Conflict,

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// The full, precomputed plan for one internal transfer.
///
/// Built by the ledger after validation and quoting; the store applies
/// it as a unit or not at all.
#[derive(Debug, Clone)]
pub struct TransferPlan {
    pub reference: String,
    pub sender_account_id: Uuid,
    pub recipient_account_id: Uuid,
    /// Amount removed from the sender (source amount plus fee)
    pub debit_amount: Decimal,
    pub debit_currency: Currency,
    /// Amount added to the recipient
    pub credit_amount: Decimal,
    pub credit_currency: Currency,
    /// Pending OUTBOUND leg against the sender
    pub outbound: TransactionRecord,
    /// Pending INBOUND leg against the recipient
    pub inbound: TransactionRecord,
}

/// Result of a committed atomic unit.
#[derive(Debug, Clone)]
pub struct AppliedTransfer {
    pub outbound: TransactionRecord,
    pub inbound: TransactionRecord,
    pub sender_balance: Balance,
    pub recipient_balance: Balance,
}

/// Both legs of a previously recorded transfer.
#[derive(Debug, Clone)]
pub struct RecordedTransfer {
    pub outbound: TransactionRecord,
    pub inbound: TransactionRecord,
}

/// Relational operations the ledger core needs.
///
/// Implementations must guarantee that `apply_transfer` is atomic and
/// that concurrent units touching the same account serialize on its
/// balance (row locks in Postgres, one mutex in memory).
#[async_trait]
pub trait TransferStore: Send + Sync {
    /// Persist a newly provisioned account.
    async fn create_account(&self, account: &Account) -> Result<(), StoreError>;

    async fn find_account(&self, account_id: Uuid) -> Result<Option<Account>, StoreError>;

    /// Lookup by normalized routing identifier, ACTIVE accounts only.
    async fn find_account_by_routing(&self, iban: &Iban) -> Result<Option<Account>, StoreError>;

    async fn list_accounts_for_user(&self, user_id: Uuid) -> Result<Vec<Account>, StoreError>;

    /// Whether any record carries this reference.
    async fn reference_exists(&self, reference: &str) -> Result<bool, StoreError>;

    /// Both legs recorded under a reference, if the transfer exists.
    async fn find_transfer(&self, reference: &str)
        -> Result<Option<RecordedTransfer>, StoreError>;

    /// Records for all of a user's accounts, newest first.
    async fn list_transactions(
        &self,
        user_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<TransactionRecord>, StoreError>;

    /// The atomic unit: re-check the sender balance under lock, debit,
    /// credit, insert both legs as COMPLETED. On any error nothing is
    /// applied.
    async fn apply_transfer(&self, plan: &TransferPlan) -> Result<AppliedTransfer, StoreError>;
}
