//! Domain error types.

use common::UserId;
use thiserror::Error;

use crate::order::OrderError;
use crate::ports::{InvoiceError, RepositoryError};

/// Errors that can occur during order use cases.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A business rule rejected the request.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// The caller lacks the administrator capability.
    #[error("User {user_id} is not allowed to perform this action")]
    Forbidden { user_id: UserId },

    /// A store failed while serving the request.
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// The invoice collaborator failed.
    #[error("Invoice error: {0}")]
    Invoice(#[from] InvoiceError),
}
