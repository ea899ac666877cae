//! Transfer ledger
//!
//! The core of the system: orchestrates an outbound debit and an
//! inbound credit as one logical operation. Validation happens before
//! any mutation; the mutation itself is delegated to the store's atomic
//! unit; replays of a reference return the recorded result instead of
//! moving money twice.

mod reference;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use chrono::{DateTime, Utc};

use crate::domain::{
    Account, Amount, Counterparty, Currency, Direction, LedgerError, QuoteMetadata,
    TransactionRecord, TransactionStatus,
};
use crate::policy::TransferPolicy;
use crate::rates::RateProvider;
use crate::store::{AppliedTransfer, RecordedTransfer, StoreError, TransferPlan, TransferStore};

/// Parameters of one internal transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalTransferRequest {
    pub sender_account_id: Uuid,
    pub recipient_account_id: Uuid,
    /// Requested amount in the source currency, before fees
    pub amount: Decimal,
    pub source_currency: Currency,
    pub target_currency: Currency,
    /// Unique reference; doubles as the idempotency key
    pub reference: String,
    pub description: String,
}

/// Result of a completed (or idempotently replayed) transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferOutcome {
    pub reference: String,
    pub status: TransactionStatus,
    pub debited_amount: Decimal,
    pub debited_currency: Currency,
    pub credited_amount: Decimal,
    pub credited_currency: Currency,
    /// Platform fee in the source currency (zero for same-currency)
    pub fee: Decimal,
    /// Customer rate applied (one for same-currency)
    pub rate: Decimal,
    pub completed_at: Option<DateTime<Utc>>,
}

/// The transfer ledger core.
pub struct TransferLedger {
    store: Arc<dyn TransferStore>,
    rates: Arc<dyn RateProvider>,
    policy: TransferPolicy,
}

impl TransferLedger {
    pub fn new(
        store: Arc<dyn TransferStore>,
        rates: Arc<dyn RateProvider>,
        policy: TransferPolicy,
    ) -> Self {
        Self {
            store,
            rates,
            policy,
        }
    }

    /// Check that a debit of `amount` could currently be taken from the
    /// account. No persistent side effect; `execute_internal_transfer`
    /// re-validates under lock because state can change in between.
    pub async fn validate_and_reserve(
        &self,
        sender_account_id: Uuid,
        amount: Decimal,
        currency: Currency,
    ) -> Result<Account, LedgerError> {
        let amount = Amount::new(amount).map_err(|e| LedgerError::InvalidAmount(e.to_string()))?;

        let account = self
            .store
            .find_account(sender_account_id)
            .await
            .map_err(map_store_error)?
            .ok_or(LedgerError::AccountNotFound(sender_account_id))?;

        if !account.is_active() {
            return Err(LedgerError::AccountInactive(account.id));
        }

        if account.currency != currency {
            return Err(LedgerError::InvalidAmount(format!(
                "Account {} holds {}, not {}",
                account.id, account.currency, currency
            )));
        }

        let limit = currency.transfer_limit();
        if amount.value() > limit {
            return Err(LedgerError::AmountExceedsLimit { currency, limit });
        }

        if !account.balance.is_sufficient_for(amount.value()) {
            return Err(LedgerError::InsufficientBalance {
                required: amount.value(),
                available: account.balance.value(),
            });
        }

        Ok(account)
    }

    /// Allocate a reference number unique within the store.
    pub async fn generate_reference(&self) -> Result<String, LedgerError> {
        const MAX_ATTEMPTS: u32 = 5;

        for _ in 0..MAX_ATTEMPTS {
            let candidate = reference::candidate();
            let taken = self
                .store
                .reference_exists(&candidate)
                .await
                .map_err(map_store_error)?;
            if !taken {
                return Ok(candidate);
            }
            tracing::warn!(reference = %candidate, "Reference collision, regenerating");
        }

        Err(LedgerError::TransferFailed(
            "could not allocate a unique reference".to_string(),
        ))
    }

    /// Execute an internal transfer: validate, quote, then apply the
    /// atomic debit+credit unit.
    ///
    /// Invoking this twice with the same reference and identical
    /// parameters returns the recorded result without moving money
    /// again; a replay with different parameters fails with
    /// `DuplicateReference`.
    pub async fn execute_internal_transfer(
        &self,
        request: &InternalTransferRequest,
    ) -> Result<TransferOutcome, LedgerError> {
        // Idempotent replay check first, before any quoting: a replayed
        // request must see the recorded transfer, never a fresh rate.
        if let Some(existing) = self
            .store
            .find_transfer(&request.reference)
            .await
            .map_err(map_store_error)?
        {
            tracing::info!(reference = %request.reference, "Replaying recorded transfer");
            return replay_outcome(&existing, request);
        }

        if request.sender_account_id == request.recipient_account_id {
            return Err(LedgerError::InvalidAmount(
                "Cannot transfer to the same account".to_string(),
            ));
        }

        let sender = self
            .validate_and_reserve(
                request.sender_account_id,
                request.amount,
                request.source_currency,
            )
            .await?;

        let recipient = self
            .store
            .find_account(request.recipient_account_id)
            .await
            .map_err(map_store_error)?
            .ok_or(LedgerError::AccountNotFound(request.recipient_account_id))?;

        if !recipient.is_active() {
            return Err(LedgerError::AccountInactive(recipient.id));
        }
        if recipient.currency != request.target_currency {
            return Err(LedgerError::InvalidAmount(format!(
                "Recipient account {} holds {}, not {}",
                recipient.id, recipient.currency, request.target_currency
            )));
        }

        // Quote the conversion, or pass the amount through unchanged
        let (debit_amount, credit_amount, fee, rate, metadata) =
            if request.source_currency != request.target_currency {
                let amount = Amount::new(request.amount)
                    .map_err(|e| LedgerError::InvalidAmount(e.to_string()))?;
                let spot = self
                    .rates
                    .get_rate(request.source_currency, request.target_currency)
                    .await?;
                let quote = self.policy.quote(&spot, &amount)?;
                (
                    quote.total_deducted,
                    quote.target_amount,
                    quote.platform_fee,
                    quote.customer_rate,
                    Some(quote.to_metadata()),
                )
            } else {
                (request.amount, request.amount, Decimal::ZERO, Decimal::ONE, None)
            };

        // The fee-inclusive debit can exceed what validate checked
        if !sender.balance.is_sufficient_for(debit_amount) {
            return Err(LedgerError::InsufficientBalance {
                required: debit_amount,
                available: sender.balance.value(),
            });
        }

        let plan = build_plan(request, &sender, &recipient, debit_amount, credit_amount, metadata);

        self.commit_with_retry(request, &plan, fee, rate).await
    }

    /// Drive the atomic unit with a bounded deadline and a bounded,
    /// backed-off retry on rolled-back conflicts.
    async fn commit_with_retry(
        &self,
        request: &InternalTransferRequest,
        plan: &TransferPlan,
        fee: Decimal,
        rate: Decimal,
    ) -> Result<TransferOutcome, LedgerError> {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let result =
                tokio::time::timeout(self.policy.commit_timeout, self.store.apply_transfer(plan))
                    .await;

            match result {
                Err(_elapsed) => {
                    tracing::error!(
                        reference = %plan.reference,
                        timeout_ms = self.policy.commit_timeout.as_millis() as u64,
                        "Atomic unit exceeded its deadline, aborted"
                    );
                    return Err(LedgerError::TransferFailed(
                        "commit deadline exceeded".to_string(),
                    ));
                }
                Ok(Ok(applied)) => {
                    tracing::info!(
                        reference = %plan.reference,
                        sender = %plan.sender_account_id,
                        recipient = %plan.recipient_account_id,
                        debited = %plan.debit_amount,
                        credited = %plan.credit_amount,
                        "Internal transfer completed"
                    );
                    return Ok(outcome_from_applied(&applied, fee, rate));
                }
                Ok(Err(StoreError::Conflict)) => {
                    if attempt < self.policy.max_commit_attempts {
                        tracing::warn!(
                            reference = %plan.reference,
                            attempt,
                            max = self.policy.max_commit_attempts,
                            "Atomic unit contended, retrying"
                        );
                        tokio::time::sleep(self.policy.retry_backoff * attempt).await;
                        continue;
                    }
                    return Err(LedgerError::Contended);
                }
                Ok(Err(StoreError::DuplicateReference(_))) => {
                    // Lost a replay race; the recorded transfer decides
                    let existing = self
                        .store
                        .find_transfer(&plan.reference)
                        .await
                        .map_err(map_store_error)?;
                    return match existing {
                        Some(recorded) => replay_outcome(&recorded, request),
                        None => Err(LedgerError::TransferFailed(format!(
                            "reference {} reported duplicate but is not recorded",
                            plan.reference
                        ))),
                    };
                }
                Ok(Err(e)) => return Err(map_store_error(e)),
            }
        }
    }
}

/// Build the pending legs and the plan the store will apply.
fn build_plan(
    request: &InternalTransferRequest,
    sender: &Account,
    recipient: &Account,
    debit_amount: Decimal,
    credit_amount: Decimal,
    metadata: Option<serde_json::Value>,
) -> TransferPlan {
    let outbound = TransactionRecord::pending(
        &request.reference,
        sender.id,
        Direction::Outbound,
        debit_amount,
        request.source_currency,
        Counterparty {
            name: recipient.holder_name.clone(),
            routing: recipient.iban.to_string(),
            internal: true,
        },
        &request.description,
        metadata.clone(),
    );
    let inbound = TransactionRecord::pending(
        &request.reference,
        recipient.id,
        Direction::Inbound,
        credit_amount,
        request.target_currency,
        Counterparty {
            name: sender.holder_name.clone(),
            routing: sender.iban.to_string(),
            internal: true,
        },
        &request.description,
        metadata,
    );

    TransferPlan {
        reference: request.reference.clone(),
        sender_account_id: sender.id,
        recipient_account_id: recipient.id,
        debit_amount,
        debit_currency: request.source_currency,
        credit_amount,
        credit_currency: request.target_currency,
        outbound,
        inbound,
    }
}

fn outcome_from_applied(applied: &AppliedTransfer, fee: Decimal, rate: Decimal) -> TransferOutcome {
    TransferOutcome {
        reference: applied.outbound.reference.clone(),
        status: TransactionStatus::Completed,
        debited_amount: applied.outbound.amount,
        debited_currency: applied.outbound.currency,
        credited_amount: applied.inbound.amount,
        credited_currency: applied.inbound.currency,
        fee,
        rate,
        completed_at: applied.outbound.completed_at,
    }
}

/// Decide whether a recorded transfer matches a replayed request and,
/// if so, reconstruct its outcome.
fn replay_outcome(
    recorded: &RecordedTransfer,
    request: &InternalTransferRequest,
) -> Result<TransferOutcome, LedgerError> {
    let quote = QuoteMetadata::from_value(recorded.outbound.metadata.as_ref());

    // Requested source amount as stored: for cross-currency transfers it
    // lives in the quote metadata (the leg amount includes the fee)
    let recorded_amount = quote
        .as_ref()
        .map(|q| q.source_amount)
        .unwrap_or(recorded.outbound.amount);

    let matches = recorded.outbound.account_id == request.sender_account_id
        && recorded.inbound.account_id == request.recipient_account_id
        && recorded.outbound.currency == request.source_currency
        && recorded.inbound.currency == request.target_currency
        && recorded_amount == request.amount;

    if !matches {
        tracing::warn!(
            reference = %request.reference,
            "Reference replayed with different parameters"
        );
        return Err(LedgerError::DuplicateReference(request.reference.clone()));
    }

    let (fee, rate) = match &quote {
        Some(q) => (q.platform_fee, q.customer_rate),
        None => (Decimal::ZERO, Decimal::ONE),
    };

    Ok(TransferOutcome {
        reference: recorded.outbound.reference.clone(),
        status: recorded.outbound.status,
        debited_amount: recorded.outbound.amount,
        debited_currency: recorded.outbound.currency,
        credited_amount: recorded.inbound.amount,
        credited_currency: recorded.inbound.currency,
        fee,
        rate,
        completed_at: recorded.outbound.completed_at,
    })
}

fn map_store_error(e: StoreError) -> LedgerError {
    match e {
        StoreError::AccountNotFound(id) => LedgerError::AccountNotFound(id),
        StoreError::AccountInactive(id) => LedgerError::AccountInactive(id),
        StoreError::InsufficientBalance {
            required,
            available,
        } => LedgerError::InsufficientBalance {
            required,
            available,
        },
        StoreError::DuplicateReference(reference) => LedgerError::DuplicateReference(reference),
        StoreError::Conflict => LedgerError::Contended,
        StoreError::Backend(msg) => LedgerError::TransferFailed(msg),
    }
}
