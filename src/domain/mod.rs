//! Domain types
//!
//! Pure types and invariants of the transfer ledger. Nothing in this
//! module performs I/O.

mod account;
mod context;
mod currency;
mod error;
mod money;
mod transaction;

pub use account::{Account, AccountStatus, Iban};
pub use context::OperationContext;
pub use currency::{Currency, UnknownCurrency};
pub use error::LedgerError;
pub use money::{Amount, AmountError, Balance};
pub use transaction::{
    Counterparty, Direction, QuoteMetadata, TerminalStatus, TransactionRecord, TransactionStatus,
    QUOTE_METADATA_VERSION,
};
