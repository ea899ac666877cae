//! HTTP API module
//!
//! Thin route layer over the transfer core. Handlers build the ledger,
//! router and history reader per request from shared state.

pub mod middleware;
pub mod routes;

use std::sync::Arc;

use crate::policy::TransferPolicy;
use crate::rates::RateProvider;
use crate::store::TransferStore;

/// Shared application state behind the router.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TransferStore>,
    pub rates: Arc<dyn RateProvider>,
    pub policy: TransferPolicy,
    /// Hex SHA-256 digest of the accepted API key
    pub api_key_digest: String,
}

pub use routes::create_router;
