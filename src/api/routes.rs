//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{
    Account, AccountStatus, Amount, Balance, Currency, Iban, LedgerError, OperationContext,
    QuoteMetadata, TransactionStatus,
};
use crate::error::AppError;
use crate::history::{HistoryEntry, TransactionHistoryReader};
use crate::ledger::{InternalTransferRequest, TransferLedger};
use crate::router::{Resolution, TransferRouter};
use crate::store::StoreError;

use super::middleware::RequestUser;
use super::AppState;

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateAccountRequest {
    pub user_id: Uuid,
    pub holder_name: String,
    pub currency: Currency,
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub account_id: Uuid,
    pub user_id: Uuid,
    pub holder_name: String,
    pub currency: Currency,
    pub iban: String,
    pub balance: Decimal,
    pub status: AccountStatus,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct BalancesResponse {
    pub user_id: Uuid,
    pub accounts: Vec<AccountResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub amount: String,
    pub source_currency: Currency,
    pub target_currency: Currency,
}

#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    pub source_amount: Decimal,
    pub source_currency: Currency,
    pub target_amount: Decimal,
    pub target_currency: Currency,
    pub customer_rate: Decimal,
    pub platform_fee: Decimal,
    pub total_deducted: Decimal,
    pub quoted_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransferApiRequest {
    pub sender_account_id: Uuid,
    pub recipient_routing: String,
    pub amount: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TransferResponse {
    pub reference: String,
    pub status: TransactionStatus,
    pub debited_amount: Decimal,
    pub debited_currency: Currency,
    pub credited_amount: Decimal,
    pub credited_currency: Currency,
    pub fee: Decimal,
    pub rate: Decimal,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct TransferDetailResponse {
    pub reference: String,
    pub status: TransactionStatus,
    pub sender_account_id: Uuid,
    pub recipient_account_id: Uuid,
    pub debited_amount: Decimal,
    pub debited_currency: Currency,
    pub credited_amount: Decimal,
    pub credited_currency: Currency,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange: Option<QuoteMetadata>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub offset: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub user_id: Uuid,
    pub offset: i64,
    pub limit: i64,
    pub entries: Vec<HistoryEntry>,
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<AppState> {
    Router::new()
        // Accounts
        .route("/accounts", post(create_account))
        .route("/accounts/:account_id", get(get_account))
        .route("/users/:user_id/balances", get(get_user_balances))
        // Transfers
        .route("/transfers/quote", post(quote_transfer))
        .route("/transfers", post(transfer))
        .route("/transfers/:reference", get(get_transfer))
        // History
        .route("/users/:user_id/transactions", get(get_user_transactions))
}

fn account_response(account: Account) -> AccountResponse {
    AccountResponse {
        account_id: account.id,
        user_id: account.user_id,
        holder_name: account.holder_name,
        currency: account.currency,
        iban: account.iban.to_string(),
        balance: account.balance.value(),
        status: account.status,
        updated_at: account.updated_at,
    }
}

fn parse_amount(raw: &str) -> Result<Decimal, AppError> {
    raw.parse()
        .map_err(|_| AppError::InvalidRequest(format!("Invalid amount: {}", raw)))
}

// =========================================================================
// POST /accounts
// =========================================================================

/// Provision a wallet account for a user.
///
/// One account per user per currency; the routing identifier is
/// generated here and never chosen by the caller.
async fn create_account(
    State(state): State<AppState>,
    Json(request): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<AccountResponse>), AppError> {
    if request.holder_name.trim().is_empty() {
        return Err(AppError::InvalidRequest(
            "holder_name must not be empty".to_string(),
        ));
    }

    let existing = state.store.list_accounts_for_user(request.user_id).await?;
    if existing.iter().any(|a| a.currency == request.currency) {
        return Err(AppError::AccountExists(request.currency));
    }

    let account = Account {
        id: Uuid::new_v4(),
        user_id: request.user_id,
        holder_name: request.holder_name.trim().to_string(),
        currency: request.currency,
        iban: generate_iban(request.currency),
        balance: Balance::zero(),
        status: AccountStatus::Active,
        updated_at: Utc::now(),
    };

    match state.store.create_account(&account).await {
        Ok(()) => {}
        // Lost a provisioning race on the (user, currency) constraint
        Err(StoreError::DuplicateReference(_)) => {
            return Err(AppError::AccountExists(request.currency));
        }
        Err(e) => return Err(e.into()),
    }

    tracing::info!(
        account_id = %account.id,
        user_id = %account.user_id,
        currency = %account.currency,
        "Account provisioned"
    );

    Ok((StatusCode::CREATED, Json(account_response(account))))
}

/// Generate a routing identifier for a new account.
fn generate_iban(currency: Currency) -> Iban {
    let mut rng = rand::thread_rng();
    let digits: String = (0..18).map(|_| rng.gen_range(0..10).to_string()).collect();
    Iban::new(&format!("RM{}{}", currency.as_str(), digits))
}

// =========================================================================
// GET /accounts/:account_id
// =========================================================================

async fn get_account(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
) -> Result<Json<AccountResponse>, AppError> {
    let account = state
        .store
        .find_account(account_id)
        .await?
        .ok_or(LedgerError::AccountNotFound(account_id))?;

    Ok(Json(account_response(account)))
}

// =========================================================================
// GET /users/:user_id/balances
// =========================================================================

/// All of a user's wallet accounts with current balances.
async fn get_user_balances(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<BalancesResponse>, AppError> {
    let accounts = state.store.list_accounts_for_user(user_id).await?;

    Ok(Json(BalancesResponse {
        user_id,
        accounts: accounts.into_iter().map(account_response).collect(),
    }))
}

// =========================================================================
// POST /transfers/quote
// =========================================================================

/// Preview the conversion for an amount without moving money.
async fn quote_transfer(
    State(state): State<AppState>,
    Json(request): Json<QuoteRequest>,
) -> Result<Json<QuoteResponse>, AppError> {
    let amount = parse_amount(&request.amount)?;
    let amount = Amount::new(amount)
        .map_err(|e| AppError::Ledger(LedgerError::InvalidAmount(e.to_string())))?;

    if request.source_currency == request.target_currency {
        // Same-currency transfers pass through unchanged, fee free
        return Ok(Json(QuoteResponse {
            source_amount: amount.value(),
            source_currency: request.source_currency,
            target_amount: amount.value(),
            target_currency: request.target_currency,
            customer_rate: Decimal::ONE,
            platform_fee: Decimal::ZERO,
            total_deducted: amount.value(),
            quoted_at: Utc::now(),
        }));
    }

    let spot = state
        .rates
        .get_rate(request.source_currency, request.target_currency)
        .await
        .map_err(AppError::Ledger)?;
    let quote = state
        .policy
        .quote(&spot, &amount)
        .map_err(AppError::Ledger)?;

    Ok(Json(QuoteResponse {
        source_amount: quote.source_amount,
        source_currency: quote.source_currency,
        target_amount: quote.target_amount,
        target_currency: quote.target_currency,
        customer_rate: quote.customer_rate,
        platform_fee: quote.platform_fee,
        total_deducted: quote.total_deducted,
        quoted_at: quote.quoted_at,
    }))
}

// =========================================================================
// POST /transfers
// =========================================================================

/// Execute an internal transfer.
///
/// The request user must own the sender account. The recipient routing
/// identifier must resolve to an account in this system; external
/// recipients are rejected here and belong to the correspondent path.
async fn transfer(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    request_user: Option<Extension<RequestUser>>,
    headers: axum::http::HeaderMap,
    Json(request): Json<TransferApiRequest>,
) -> Result<Json<TransferResponse>, AppError> {
    // X-Request-User-Id is required for transfer
    let request_user =
        request_user.ok_or_else(|| AppError::MissingHeader("X-Request-User-Id".to_string()))?;
    let context = context.with_request_user(request_user.user_id);

    let amount = parse_amount(&request.amount)?;

    let sender = state
        .store
        .find_account(request.sender_account_id)
        .await?
        .ok_or(LedgerError::AccountNotFound(request.sender_account_id))?;

    if sender.user_id != request_user.user_id {
        tracing::warn!(
            sender_account = %sender.id,
            request_user = %request_user.user_id,
            correlation_id = ?context.correlation_id,
            "Transfer rejected: request user does not own the sender account"
        );
        return Err(AppError::UnauthorizedTransfer);
    }

    let router = TransferRouter::new(state.store.clone());
    let (recipient_account_id, target_currency) = match router
        .resolve(&request.recipient_routing)
        .await?
    {
        Resolution::Internal {
            account_id,
            currency,
            ..
        } => (account_id, currency),
        Resolution::External { routing } => return Err(AppError::ExternalRecipient(routing)),
    };

    let ledger = TransferLedger::new(
        state.store.clone(),
        state.rates.clone(),
        state.policy.clone(),
    );

    // Caller-supplied idempotency key, or a fresh reference
    let reference = match headers.get("Idempotency-Key").and_then(|h| h.to_str().ok()) {
        Some(key) if !key.trim().is_empty() => key.trim().to_string(),
        _ => ledger.generate_reference().await?,
    };

    let outcome = ledger
        .execute_internal_transfer(&InternalTransferRequest {
            sender_account_id: sender.id,
            recipient_account_id,
            amount,
            source_currency: sender.currency,
            target_currency,
            reference,
            description: request.description.unwrap_or_default(),
        })
        .await?;

    Ok(Json(TransferResponse {
        reference: outcome.reference,
        status: outcome.status,
        debited_amount: outcome.debited_amount,
        debited_currency: outcome.debited_currency,
        credited_amount: outcome.credited_amount,
        credited_currency: outcome.credited_currency,
        fee: outcome.fee,
        rate: outcome.rate,
        completed_at: outcome.completed_at,
    }))
}

// =========================================================================
// GET /transfers/:reference
// =========================================================================

/// Both legs of a recorded transfer, by reference.
async fn get_transfer(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<TransferDetailResponse>, AppError> {
    let recorded = state
        .store
        .find_transfer(&reference)
        .await?
        .ok_or_else(|| AppError::TransferNotFound(reference.clone()))?;

    let exchange = QuoteMetadata::from_value(recorded.outbound.metadata.as_ref());

    Ok(Json(TransferDetailResponse {
        reference: recorded.outbound.reference,
        status: recorded.outbound.status,
        sender_account_id: recorded.outbound.account_id,
        recipient_account_id: recorded.inbound.account_id,
        debited_amount: recorded.outbound.amount,
        debited_currency: recorded.outbound.currency,
        credited_amount: recorded.inbound.amount,
        credited_currency: recorded.inbound.currency,
        description: recorded.outbound.description,
        exchange,
        created_at: recorded.outbound.created_at,
        completed_at: recorded.outbound.completed_at,
    }))
}

// =========================================================================
// GET /users/:user_id/transactions
// =========================================================================

/// Paginated transaction history across all of a user's accounts.
async fn get_user_transactions(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, AppError> {
    let reader = TransactionHistoryReader::new(Arc::clone(&state.store));
    let entries = reader.list(user_id, query.offset, query.limit).await?;

    Ok(Json(HistoryResponse {
        user_id,
        offset: query.offset.max(0),
        limit: query.limit.clamp(1, 100),
        entries,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_account_request_deserialize() {
        let json = r#"{
            "user_id": "550e8400-e29b-41d4-a716-446655440000",
            "holder_name": "Ana Lopez",
            "currency": "EUR"
        }"#;

        let request: CreateAccountRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.holder_name, "Ana Lopez");
        assert_eq!(request.currency, Currency::Eur);
    }

    #[test]
    fn test_transfer_request_deserialize() {
        let json = r#"{
            "sender_account_id": "550e8400-e29b-41d4-a716-446655440001",
            "recipient_routing": "HN54PISA00000001",
            "amount": "100.50",
            "description": "Rent"
        }"#;

        let request: TransferApiRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.amount, "100.50");
        assert_eq!(request.description, Some("Rent".to_string()));
    }

    #[test]
    fn test_history_query_defaults() {
        let query: HistoryQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(query.limit, 50);
        assert_eq!(query.offset, 0);
    }

    #[test]
    fn test_generated_iban_shape() {
        let iban = generate_iban(Currency::Hnl);
        let s = iban.to_string();
        assert!(s.starts_with("RMHNL"));
        assert_eq!(s.len(), 23);
        assert!(s[5..].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_parse_amount_rejects_garbage() {
        assert!(parse_amount("100.50").is_ok());
        assert!(parse_amount("abc").is_err());
        assert!(parse_amount("").is_err());
    }
}
