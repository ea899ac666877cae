//! In-memory transfer store
//!
//! Mutex-guarded implementation of [`TransferStore`] used by the test
//! suites. One async mutex serializes every atomic unit, which makes
//! the concurrency contract trivially hold; fault injection hooks let
//! tests abort, contend or stall the unit at will.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{Account, Direction, Iban, TransactionRecord};

use super::{AppliedTransfer, RecordedTransfer, StoreError, TransferPlan, TransferStore};

/// Injected behavior for the next calls to `apply_transfer`.
#[derive(Debug, Clone)]
pub enum Fault {
    /// Abort the unit before anything is applied
    FailCommit,
    /// Report a rolled-back concurrent conflict for the next `n` units
    Conflict(u32),
    /// Stall before touching any state (deadline tests)
    Hang(Duration),
}

#[derive(Debug, Default)]
struct Inner {
    accounts: HashMap<Uuid, Account>,
    transactions: Vec<TransactionRecord>,
    fault: Option<Fault>,
}

/// In-memory [`TransferStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryTransferStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryTransferStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a fault for upcoming atomic units.
    pub async fn inject_fault(&self, fault: Fault) {
        self.inner.lock().await.fault = Some(fault);
    }

    /// Snapshot of one account's current state.
    pub async fn account_snapshot(&self, account_id: Uuid) -> Option<Account> {
        self.inner.lock().await.accounts.get(&account_id).cloned()
    }

    /// Number of recorded transaction legs.
    pub async fn transaction_count(&self) -> usize {
        self.inner.lock().await.transactions.len()
    }

    /// Test support: insert already-recorded legs directly, bypassing
    /// the atomic unit.
    pub async fn seed_transactions(&self, records: Vec<TransactionRecord>) {
        self.inner.lock().await.transactions.extend(records);
    }
}

#[async_trait::async_trait]
impl TransferStore for MemoryTransferStore {
    async fn create_account(&self, account: &Account) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.accounts.contains_key(&account.id) {
            return Err(StoreError::Backend(format!(
                "account {} already exists",
                account.id
            )));
        }
        // Mirrors the relational unique constraint on (user_id, currency)
        if inner
            .accounts
            .values()
            .any(|a| a.user_id == account.user_id && a.currency == account.currency)
        {
            return Err(StoreError::DuplicateReference(account.iban.to_string()));
        }
        inner.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn find_account(&self, account_id: Uuid) -> Result<Option<Account>, StoreError> {
        Ok(self.inner.lock().await.accounts.get(&account_id).cloned())
    }

    async fn find_account_by_routing(&self, iban: &Iban) -> Result<Option<Account>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .accounts
            .values()
            .find(|a| a.iban == *iban && a.is_active())
            .cloned())
    }

    async fn list_accounts_for_user(&self, user_id: Uuid) -> Result<Vec<Account>, StoreError> {
        let inner = self.inner.lock().await;
        let mut accounts: Vec<Account> = inner
            .accounts
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        accounts.sort_by_key(|a| a.currency.as_str());
        Ok(accounts)
    }

    async fn reference_exists(&self, reference: &str) -> Result<bool, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .transactions
            .iter()
            .any(|t| t.reference == reference))
    }

    async fn find_transfer(
        &self,
        reference: &str,
    ) -> Result<Option<RecordedTransfer>, StoreError> {
        let inner = self.inner.lock().await;
        let mut outbound = None;
        let mut inbound = None;
        for record in inner.transactions.iter().filter(|t| t.reference == reference) {
            match record.direction {
                Direction::Outbound => outbound = Some(record.clone()),
                Direction::Inbound => inbound = Some(record.clone()),
            }
        }
        match (outbound, inbound) {
            (None, None) => Ok(None),
            (Some(outbound), Some(inbound)) => Ok(Some(RecordedTransfer { outbound, inbound })),
            _ => Err(StoreError::Backend(format!(
                "transfer {} is missing a leg",
                reference
            ))),
        }
    }

    async fn list_transactions(
        &self,
        user_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let inner = self.inner.lock().await;
        let account_ids: Vec<Uuid> = inner
            .accounts
            .values()
            .filter(|a| a.user_id == user_id)
            .map(|a| a.id)
            .collect();

        let mut records: Vec<TransactionRecord> = inner
            .transactions
            .iter()
            .filter(|t| account_ids.contains(&t.account_id))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(records
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn apply_transfer(&self, plan: &TransferPlan) -> Result<AppliedTransfer, StoreError> {
        // Stall outside the lock so a timed-out caller leaves no trace
        let hang = {
            let inner = self.inner.lock().await;
            match inner.fault {
                Some(Fault::Hang(d)) => Some(d),
                _ => None,
            }
        };
        if let Some(d) = hang {
            tokio::time::sleep(d).await;
        }

        let mut inner = self.inner.lock().await;

        match inner.fault.take() {
            Some(Fault::FailCommit) => {
                return Err(StoreError::Backend("injected commit failure".to_string()));
            }
            Some(Fault::Conflict(n)) => {
                if n > 1 {
                    inner.fault = Some(Fault::Conflict(n - 1));
                }
                return Err(StoreError::Conflict);
            }
            Some(Fault::Hang(_)) | None => {}
        }

        if inner
            .transactions
            .iter()
            .any(|t| t.reference == plan.reference)
        {
            return Err(StoreError::DuplicateReference(plan.reference.clone()));
        }

        let sender = inner
            .accounts
            .get(&plan.sender_account_id)
            .ok_or(StoreError::AccountNotFound(plan.sender_account_id))?
            .clone();
        let recipient = inner
            .accounts
            .get(&plan.recipient_account_id)
            .ok_or(StoreError::AccountNotFound(plan.recipient_account_id))?
            .clone();

        if !sender.is_active() {
            return Err(StoreError::AccountInactive(sender.id));
        }
        if !recipient.is_active() {
            return Err(StoreError::AccountInactive(recipient.id));
        }

        if !sender.balance.is_sufficient_for(plan.debit_amount) {
            return Err(StoreError::InsufficientBalance {
                required: plan.debit_amount,
                available: sender.balance.value(),
            });
        }

        let sender_balance = sender
            .balance
            .debit(plan.debit_amount)
            .map_err(|e| StoreError::Backend(format!("debit underflow: {}", e)))?;
        let recipient_balance = recipient
            .balance
            .credit(plan.credit_amount)
            .map_err(|e| StoreError::Backend(format!("credit overflow: {}", e)))?;

        let now = Utc::now();
        let outbound = plan
            .outbound
            .clone()
            .complete(now)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let inbound = plan
            .inbound
            .clone()
            .complete(now)
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        // Point of no return: everything below happens under one lock
        if let Some(sender) = inner.accounts.get_mut(&plan.sender_account_id) {
            sender.balance = sender_balance;
            sender.updated_at = now;
        }
        if let Some(recipient) = inner.accounts.get_mut(&plan.recipient_account_id) {
            recipient.balance = recipient_balance;
            recipient.updated_at = now;
        }
        inner.transactions.push(outbound.clone());
        inner.transactions.push(inbound.clone());

        Ok(AppliedTransfer {
            outbound,
            inbound,
            sender_balance,
            recipient_balance,
        })
    }
}
