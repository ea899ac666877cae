//! Common test utilities

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use remesa::api::middleware::digest_api_key;
use remesa::api::AppState;
use remesa::domain::{Account, AccountStatus, Balance, Currency, Iban};
use remesa::rates::StaticRateProvider;
use remesa::store::{MemoryTransferStore, TransferStore};
use remesa::TransferPolicy;

pub const TEST_API_KEY: &str = "test_key_123";

/// App state over a fresh in-memory store with the standard EUR -> HNL
/// rate of 24.5.
pub fn test_state() -> (AppState, Arc<MemoryTransferStore>) {
    let store = Arc::new(MemoryTransferStore::new());
    let state = AppState {
        store: store.clone(),
        rates: Arc::new(StaticRateProvider::new().with_rate(
            Currency::Eur,
            Currency::Hnl,
            Decimal::new(245, 1),
        )),
        policy: TransferPolicy::default(),
        api_key_digest: digest_api_key(TEST_API_KEY),
    };
    (state, store)
}

/// Seed an active account and return its ID.
pub async fn seed_account(
    store: &Arc<MemoryTransferStore>,
    user_id: Uuid,
    holder_name: &str,
    currency: Currency,
    balance: Decimal,
    iban: &str,
) -> Uuid {
    let account = Account {
        id: Uuid::new_v4(),
        user_id,
        holder_name: holder_name.to_string(),
        currency,
        iban: Iban::new(iban),
        balance: Balance::new(balance).expect("valid seed balance"),
        status: AccountStatus::Active,
        updated_at: Utc::now(),
    };
    store
        .create_account(&account)
        .await
        .expect("failed to seed account");
    account.id
}
