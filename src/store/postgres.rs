//! PostgreSQL transfer store
//!
//! Production implementation of [`TransferStore`]. The atomic unit is
//! one database transaction that locks both account rows with
//! `SELECT ... FOR UPDATE` in ascending id order, re-checks the sender
//! balance under the lock, applies both balance updates and inserts
//! both legs. Lock ordering is the deadlock-avoidance rule of the core:
//! every unit acquires account locks in the same total order.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::{
    Account, AccountStatus, Balance, Counterparty, Currency, Direction, Iban, TransactionRecord,
    TransactionStatus,
};

use super::{AppliedTransfer, RecordedTransfer, StoreError, TransferPlan, TransferStore};

/// Row tuple for `accounts`
type AccountRow = (
    Uuid,
    Uuid,
    String,
    String,
    String,
    Decimal,
    String,
    DateTime<Utc>,
);

/// Row tuple for `transactions`
type TransactionRow = (
    Uuid,
    String,
    Uuid,
    String,
    Decimal,
    String,
    String,
    String,
    bool,
    String,
    String,
    Option<serde_json::Value>,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
);

const SELECT_ACCOUNT: &str = r#"
    SELECT id, user_id, holder_name, currency, iban, balance, status, updated_at
    FROM accounts
"#;

const SELECT_TRANSACTION: &str = r#"
    SELECT id, reference, account_id, direction, amount, currency,
           counterparty_name, counterparty_routing, counterparty_internal,
           status, description, metadata, created_at, completed_at
    FROM transactions
"#;

#[derive(Debug, Clone)]
pub struct PgTransferStore {
    pool: PgPool,
}

impl PgTransferStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn account_from_row(row: AccountRow) -> Result<Account, StoreError> {
        let (id, user_id, holder_name, currency, iban, balance, status, updated_at) = row;
        let currency = Currency::from_str(&currency)
            .map_err(|e| StoreError::Backend(format!("account {}: {}", id, e)))?;
        let balance = Balance::new(balance)
            .map_err(|e| StoreError::Backend(format!("account {}: bad balance: {}", id, e)))?;
        Ok(Account {
            id,
            user_id,
            holder_name,
            currency,
            iban: Iban::new(&iban),
            balance,
            status: AccountStatus::from(status),
            updated_at,
        })
    }

    fn record_from_row(row: TransactionRow) -> Result<TransactionRecord, StoreError> {
        let (
            id,
            reference,
            account_id,
            direction,
            amount,
            currency,
            counterparty_name,
            counterparty_routing,
            counterparty_internal,
            status,
            description,
            metadata,
            created_at,
            completed_at,
        ) = row;
        let currency = Currency::from_str(&currency)
            .map_err(|e| StoreError::Backend(format!("transaction {}: {}", id, e)))?;
        Ok(TransactionRecord {
            id,
            reference,
            account_id,
            direction: Direction::from(direction),
            amount,
            currency,
            counterparty: Counterparty {
                name: counterparty_name,
                routing: counterparty_routing,
                internal: counterparty_internal,
            },
            status: TransactionStatus::from(status),
            description,
            metadata,
            created_at,
            completed_at,
        })
    }

    /// Lock one account row for the duration of the unit.
    async fn lock_account(
        tx: &mut Transaction<'_, Postgres>,
        account_id: Uuid,
    ) -> Result<Account, StoreError> {
        let row: Option<AccountRow> =
            sqlx::query_as(&format!("{} WHERE id = $1 FOR UPDATE", SELECT_ACCOUNT))
                .bind(account_id)
                .fetch_optional(&mut **tx)
                .await
                .map_err(map_db_error)?;

        let row = row.ok_or(StoreError::AccountNotFound(account_id))?;
        Self::account_from_row(row)
    }

    async fn insert_record(
        tx: &mut Transaction<'_, Postgres>,
        record: &TransactionRecord,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, reference, account_id, direction, amount, currency,
                counterparty_name, counterparty_routing, counterparty_internal,
                status, description, metadata, created_at, completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(record.id)
        .bind(&record.reference)
        .bind(record.account_id)
        .bind(record.direction.as_str())
        .bind(record.amount)
        .bind(record.currency.as_str())
        .bind(&record.counterparty.name)
        .bind(&record.counterparty.routing)
        .bind(record.counterparty.internal)
        .bind(record.status.as_str())
        .bind(&record.description)
        .bind(&record.metadata)
        .bind(record.created_at)
        .bind(record.completed_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_insert_error(e, &record.reference))?;

        Ok(())
    }

    async fn write_balance(
        tx: &mut Transaction<'_, Postgres>,
        account_id: Uuid,
        balance: Balance,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE accounts SET balance = $2, updated_at = NOW() WHERE id = $1")
            .bind(account_id)
            .bind(balance.value())
            .execute(&mut **tx)
            .await
            .map_err(map_db_error)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl TransferStore for PgTransferStore {
    async fn create_account(&self, account: &Account) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, user_id, holder_name, currency, iban, balance, status, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(account.id)
        .bind(account.user_id)
        .bind(&account.holder_name)
        .bind(account.currency.as_str())
        .bind(account.iban.as_str())
        .bind(account.balance.value())
        .bind(account.status.as_str())
        .bind(account.updated_at)
        .execute(&self.pool)
        .await
        // Unique violation here means a provisioning race on
        // (user_id, currency) or the routing identifier
        .map_err(|e| map_insert_error(e, account.iban.as_str()))?;

        Ok(())
    }

    async fn find_account(&self, account_id: Uuid) -> Result<Option<Account>, StoreError> {
        let row: Option<AccountRow> =
            sqlx::query_as(&format!("{} WHERE id = $1", SELECT_ACCOUNT))
                .bind(account_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_db_error)?;

        row.map(Self::account_from_row).transpose()
    }

    async fn find_account_by_routing(&self, iban: &Iban) -> Result<Option<Account>, StoreError> {
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            "{} WHERE iban = $1 AND status = 'active'",
            SELECT_ACCOUNT
        ))
        .bind(iban.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        row.map(Self::account_from_row).transpose()
    }

    async fn list_accounts_for_user(&self, user_id: Uuid) -> Result<Vec<Account>, StoreError> {
        let rows: Vec<AccountRow> = sqlx::query_as(&format!(
            "{} WHERE user_id = $1 ORDER BY currency",
            SELECT_ACCOUNT
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        rows.into_iter().map(Self::account_from_row).collect()
    }

    async fn reference_exists(&self, reference: &str) -> Result<bool, StoreError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM transactions WHERE reference = $1)")
                .bind(reference)
                .fetch_one(&self.pool)
                .await
                .map_err(map_db_error)?;
        Ok(exists)
    }

    async fn find_transfer(
        &self,
        reference: &str,
    ) -> Result<Option<RecordedTransfer>, StoreError> {
        let rows: Vec<TransactionRow> =
            sqlx::query_as(&format!("{} WHERE reference = $1", SELECT_TRANSACTION))
                .bind(reference)
                .fetch_all(&self.pool)
                .await
                .map_err(map_db_error)?;

        if rows.is_empty() {
            return Ok(None);
        }

        let mut outbound = None;
        let mut inbound = None;
        for row in rows {
            let record = Self::record_from_row(row)?;
            match record.direction {
                Direction::Outbound => outbound = Some(record),
                Direction::Inbound => inbound = Some(record),
            }
        }

        match (outbound, inbound) {
            (Some(outbound), Some(inbound)) => Ok(Some(RecordedTransfer { outbound, inbound })),
            // A lone leg cannot exist under the atomic unit contract
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
        let rows: Vec<TransactionRow> = sqlx::query_as(
            r#"
            SELECT t.id, t.reference, t.account_id, t.direction, t.amount, t.currency,
                   t.counterparty_name, t.counterparty_routing, t.counterparty_internal,
                   t.status, t.description, t.metadata, t.created_at, t.completed_at
            FROM transactions t
            JOIN accounts a ON a.id = t.account_id
            WHERE a.user_id = $1
            ORDER BY t.created_at DESC, t.id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        rows.into_iter().map(Self::record_from_row).collect()
    }

    async fn apply_transfer(&self, plan: &TransferPlan) -> Result<AppliedTransfer, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        // Fixed total order on account id, regardless of direction
        let (first, second) = if plan.sender_account_id < plan.recipient_account_id {
            (plan.sender_account_id, plan.recipient_account_id)
        } else {
            (plan.recipient_account_id, plan.sender_account_id)
        };
        let a = Self::lock_account(&mut tx, first).await?;
        let b = Self::lock_account(&mut tx, second).await?;

        let (sender, recipient) = if a.id == plan.sender_account_id {
            (a, b)
        } else {
            (b, a)
        };

        if !sender.is_active() {
            return Err(StoreError::AccountInactive(sender.id));
        }
        if !recipient.is_active() {
            return Err(StoreError::AccountInactive(recipient.id));
        }

        // Re-check under the lock: state may have moved since validation
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

        Self::write_balance(&mut tx, sender.id, sender_balance).await?;
        Self::write_balance(&mut tx, recipient.id, recipient_balance).await?;

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

        Self::insert_record(&mut tx, &outbound).await?;
        Self::insert_record(&mut tx, &inbound).await?;

        tx.commit().await.map_err(map_db_error)?;

        Ok(AppliedTransfer {
            outbound,
            inbound,
            sender_balance,
            recipient_balance,
        })
    }
}

/// Map driver errors onto store errors, surfacing retryable conflicts.
fn map_db_error(e: sqlx::Error) -> StoreError {
    if let Some(db) = e.as_database_error() {
        if let Some(code) = db.code() {
            // serialization_failure / deadlock_detected
            if code == "40001" || code == "40P01" {
                return StoreError::Conflict;
            }
        }
    }
    StoreError::Backend(e.to_string())
}

/// Insert-specific mapping: a unique violation on the reference index
/// means another unit recorded this reference first.
fn map_insert_error(e: sqlx::Error, reference: &str) -> StoreError {
    if let Some(db) = e.as_database_error() {
        if db.code().as_deref() == Some("23505") {
            return StoreError::DuplicateReference(reference.to_string());
        }
    }
    map_db_error(e)
}
