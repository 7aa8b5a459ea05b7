//! Reporting error types.

use chrono::{DateTime, Utc};
use domain::RepositoryError;
use thiserror::Error;

/// Errors that can occur while computing reports.
#[derive(Debug, Error)]
pub enum ReportingError {
    /// A statistics query failed.
    #[error("Statistics query failed: {0}")]
    Query(#[from] RepositoryError),

    /// No calendar window could be derived from the given instant.
    #[error("Cannot derive a calendar month from {0}")]
    InvalidDate(DateTime<Utc>),
}

/// Result type for reporting operations.
pub type Result<T> = std::result::Result<T, ReportingError>;
