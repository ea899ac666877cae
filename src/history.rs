//! Transaction history reader
//!
//! Paginated, display-shaped read of a user's recorded transactions.
//! Pure read; a malformed metadata blob on one row degrades that row's
//! exchange details to absent instead of failing the page.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{Currency, Direction, QuoteMetadata, TransactionStatus};
use crate::store::{StoreError, TransferStore};

/// Upper bound on one history page.
const MAX_PAGE_SIZE: i64 = 100;

/// Exchange details shown for cross-currency entries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExchangeInfo {
    pub customer_rate: Decimal,
    pub target_amount: Decimal,
    pub target_currency: Currency,
    pub platform_fee: Decimal,
}

/// One display-shaped history entry.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub reference: String,
    pub direction: Direction,
    /// Signed: negative for outbound, positive for inbound
    pub amount: Decimal,
    pub currency: Currency,
    pub counterparty_name: String,
    pub counterparty_routing: String,
    /// True when the counterparty account lives in this system
    pub internal: bool,
    pub status: TransactionStatus,
    pub description: String,
    /// Absent for same-currency transfers and for unreadable metadata
    pub exchange: Option<ExchangeInfo>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

pub struct TransactionHistoryReader {
    store: Arc<dyn TransferStore>,
}

impl TransactionHistoryReader {
    pub fn new(store: Arc<dyn TransferStore>) -> Self {
        Self { store }
    }

    /// List a user's transactions, newest first.
    pub async fn list(
        &self,
        user_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<HistoryEntry>, StoreError> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let offset = offset.max(0);

        let records = self.store.list_transactions(user_id, offset, limit).await?;

        Ok(records
            .into_iter()
            .map(|record| {
                let exchange =
                    QuoteMetadata::from_value(record.metadata.as_ref()).map(|q| ExchangeInfo {
                        customer_rate: q.customer_rate,
                        target_amount: q.target_amount,
                        target_currency: q.target_currency,
                        platform_fee: q.platform_fee,
                    });

                HistoryEntry {
                    id: record.id,
                    reference: record.reference,
                    direction: record.direction,
                    amount: record.direction.sign() * record.amount,
                    currency: record.currency,
                    counterparty_name: record.counterparty.name,
                    counterparty_routing: record.counterparty.routing,
                    internal: record.counterparty.internal,
                    status: record.status,
                    description: record.description,
                    exchange,
                    created_at: record.created_at,
                    completed_at: record.completed_at,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Account, AccountStatus, Balance, Counterparty, Iban, TransactionRecord};
    use crate::store::{MemoryTransferStore, TransferStore};
    use rust_decimal_macros::dec;
    use serde_json::json;

    async fn seeded_reader() -> (TransactionHistoryReader, Uuid) {
        let store = Arc::new(MemoryTransferStore::new());
        let user_id = Uuid::new_v4();
        let account_id = Uuid::new_v4();
        store
            .create_account(&Account {
                id: account_id,
                user_id,
                holder_name: "Ana".to_string(),
                currency: Currency::Eur,
                iban: Iban::new("DE00REMESA001"),
                balance: Balance::new(dec!(1000)).unwrap(),
                status: AccountStatus::Active,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();

        (TransactionHistoryReader::new(store.clone()), user_id)
    }

    fn record(account_id: Uuid, metadata: Option<serde_json::Value>) -> TransactionRecord {
        TransactionRecord::pending(
            "RM-20260830-HISTTEST01",
            account_id,
            Direction::Outbound,
            dec!(100.99),
            Currency::Eur,
            Counterparty {
                name: "Maria".to_string(),
                routing: "HN54PISA00000001".to_string(),
                internal: true,
            },
            "Rent",
            metadata,
        )
    }

    #[tokio::test]
    async fn test_outbound_amount_is_negative() {
        let store = Arc::new(MemoryTransferStore::new());
        let user_id = Uuid::new_v4();
        let account_id = Uuid::new_v4();
        store
            .create_account(&Account {
                id: account_id,
                user_id,
                holder_name: "Ana".to_string(),
                currency: Currency::Eur,
                iban: Iban::new("DE00REMESA001"),
                balance: Balance::zero(),
                status: AccountStatus::Active,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();

        // Push a completed leg straight into the store
        let mut inner = record(account_id, None);
        inner = inner.complete(Utc::now()).unwrap();
        seed_record(&store, inner).await;

        let reader = TransactionHistoryReader::new(store);
        let page = reader.list(user_id, 0, 10).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].amount, dec!(-100.99));
        assert!(page[0].exchange.is_none());
    }

    #[tokio::test]
    async fn test_malformed_metadata_degrades_gracefully() {
        let store = Arc::new(MemoryTransferStore::new());
        let user_id = Uuid::new_v4();
        let account_id = Uuid::new_v4();
        store
            .create_account(&Account {
                id: account_id,
                user_id,
                holder_name: "Ana".to_string(),
                currency: Currency::Eur,
                iban: Iban::new("DE00REMESA001"),
                balance: Balance::zero(),
                status: AccountStatus::Active,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();

        let leg = record(account_id, Some(json!({"version": 1, "spot_rate": "garbage"})))
            .complete(Utc::now())
            .unwrap();
        seed_record(&store, leg).await;

        let reader = TransactionHistoryReader::new(store);
        let page = reader.list(user_id, 0, 10).await.unwrap();

        // The row still renders, just without exchange details
        assert_eq!(page.len(), 1);
        assert!(page[0].exchange.is_none());
        assert_eq!(page[0].reference, "RM-20260830-HISTTEST01");
    }

    #[tokio::test]
    async fn test_empty_page_for_unknown_user() {
        let (reader, _) = seeded_reader().await;
        let page = reader.list(Uuid::new_v4(), 0, 10).await.unwrap();
        assert!(page.is_empty());
    }

    /// Test helper: push a raw record through the store's internals.
    async fn seed_record(store: &Arc<MemoryTransferStore>, record: TransactionRecord) {
        // The memory store only writes records via apply_transfer; for
        // reader tests we inject a matching counterpart leg so the
        // recorded pair stays well formed.
        let other = TransactionRecord::pending(
            &record.reference,
            Uuid::new_v4(),
            Direction::Inbound,
            record.amount,
            record.currency,
            record.counterparty.clone(),
            &record.description,
            None,
        )
        .complete(Utc::now())
        .unwrap();
        store.seed_transactions(vec![record, other]).await;
    }
}
