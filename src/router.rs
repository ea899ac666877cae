//! Transfer router
//!
//! Decides whether a recipient routing identifier points at an account
//! inside this system or must be handed off to the external path. Pure
//! lookup, no mutation; the decision happens before any money moves.

use serde::Serialize;
use uuid::Uuid;

use crate::domain::{Currency, Iban};
use crate::store::{StoreError, TransferStore};
use std::sync::Arc;

/// Where a recipient identifier resolved to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "route", rename_all = "snake_case")]
pub enum Resolution {
    /// The recipient holds an ACTIVE account in this system
    Internal {
        account_id: Uuid,
        user_id: Uuid,
        currency: Currency,
        holder_name: String,
    },
    /// Unknown here; the caller must dispatch to the external path
    External { routing: String },
}

pub struct TransferRouter {
    store: Arc<dyn TransferStore>,
}

impl TransferRouter {
    pub fn new(store: Arc<dyn TransferStore>) -> Self {
        Self { store }
    }

    /// Resolve a raw routing identifier.
    ///
    /// The identifier is normalized before lookup (whitespace stripped,
    /// uppercased) so formatting differences never produce a false
    /// external resolution.
    pub async fn resolve(&self, raw_routing: &str) -> Result<Resolution, StoreError> {
        let iban = Iban::new(raw_routing);

        match self.store.find_account_by_routing(&iban).await? {
            Some(account) => Ok(Resolution::Internal {
                account_id: account.id,
                user_id: account.user_id,
                currency: account.currency,
                holder_name: account.holder_name,
            }),
            None => {
                tracing::debug!(routing = %iban, "Routing identifier resolved external");
                Ok(Resolution::External {
                    routing: iban.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Account, AccountStatus, Balance};
    use crate::store::MemoryTransferStore;
    use chrono::Utc;

    async fn store_with_account(status: AccountStatus) -> (Arc<MemoryTransferStore>, Uuid) {
        let store = Arc::new(MemoryTransferStore::new());
        let account_id = Uuid::new_v4();
        store
            .create_account(&Account {
                id: account_id,
                user_id: Uuid::new_v4(),
                holder_name: "Maria".to_string(),
                currency: Currency::Hnl,
                iban: Iban::new("HN54PISA00000001"),
                balance: Balance::zero(),
                status,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
        (store, account_id)
    }

    #[tokio::test]
    async fn test_resolves_internal_with_normalization() {
        let (store, account_id) = store_with_account(AccountStatus::Active).await;
        let router = TransferRouter::new(store);

        // Lowercase, grouped input must still find the account
        let resolution = router.resolve(" hn54 pisa 0000 0001 ").await.unwrap();
        match resolution {
            Resolution::Internal {
                account_id: found, ..
            } => assert_eq!(found, account_id),
            other => panic!("expected internal resolution, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_routing_is_external() {
        let (store, _) = store_with_account(AccountStatus::Active).await;
        let router = TransferRouter::new(store);

        let resolution = router.resolve("HN99UNKNOWN0000").await.unwrap();
        assert_eq!(
            resolution,
            Resolution::External {
                routing: "HN99UNKNOWN0000".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_closed_account_is_external() {
        let (store, _) = store_with_account(AccountStatus::Closed).await;
        let router = TransferRouter::new(store);

        let resolution = router.resolve("HN54PISA00000001").await.unwrap();
        assert!(matches!(resolution, Resolution::External { .. }));
    }
}
