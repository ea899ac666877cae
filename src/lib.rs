//! remesa Library
//!
//! Re-exports modules for integration testing and external use.

pub mod api;
pub mod domain;
pub mod history;
pub mod ledger;
pub mod policy;
pub mod rates;
pub mod router;
pub mod store;

pub mod config;
pub mod db;
mod error;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use domain::{Amount, AmountError, Balance, Currency, LedgerError, OperationContext};
pub use ledger::{InternalTransferRequest, TransferLedger, TransferOutcome};
pub use policy::TransferPolicy;
