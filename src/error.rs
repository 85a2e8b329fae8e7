//! Error types for corekit database access.
//!
//! This module defines the error taxonomy using `thiserror`. Configuration
//! problems get their own variant; everything raised by the driver propagates
//! unchanged through the transparent `Execution` variant.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    /// No usable connection profiles, an entry without a name, or a lookup
    /// for a profile name that is not configured.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A single-row query matched more than one row.
    #[error("Query returned more than one row")]
    MoreThanOneRow,

    /// Any failure raised by the driver, passed through unchanged.
    #[error(transparent)]
    Execution(#[from] sqlx::Error),
}

impl DbError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Check if this error is a configuration error.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    /// Check if this error is the driver's zero-row signal for strict
    /// first/single reads.
    pub fn is_row_not_found(&self) -> bool {
        matches!(self, Self::Execution(sqlx::Error::RowNotFound))
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
