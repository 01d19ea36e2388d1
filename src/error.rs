//! Error types for the demo services.

use thiserror::Error;
use txgroup_client::RunError;
use txgroup_core::ContextError;

/// Errors raised by the business code of the demo services.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The SKU is not stocked.
    #[error("Product not found: {0}")]
    NotFound(String),

    /// The requested quantity exceeds the available stock.
    #[error("Insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: u32, available: u32 },

    /// The order total exceeds the customer's credit.
    #[error("Insufficient credit: total {total}, credit {credit}")]
    InsufficientCredit { total: u64, credit: u64 },

    /// The call did not run inside a transaction group.
    #[error("Transaction context error: {0}")]
    Context(#[from] ContextError),

    /// The downstream inventory call failed.
    #[error("Inventory call failed: {0}")]
    Inventory(#[source] Box<RunError<ServiceError>>),

    /// The downstream task could not be joined.
    #[error("Remote task failed: {0}")]
    Remote(String),
}

impl From<RunError<ServiceError>> for ServiceError {
    fn from(e: RunError<ServiceError>) -> Self {
        ServiceError::Inventory(Box::new(e))
    }
}
