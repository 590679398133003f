//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! including validation failures, invalid status transitions and
//! fenced (stale) sync attempts.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid record identifier (empty or whitespace only)
    #[error("Invalid record id: {0}")]
    InvalidRecordId(String),

    /// Invalid remote locator (empty)
    #[error("Invalid remote locator: {0}")]
    InvalidLocator(String),

    /// Invalid status transition attempt
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        /// The current status
        from: String,
        /// The attempted target status
        to: String,
    },

    /// A terminal write from an attempt that no longer owns the record
    ///
    /// Happens when an administrative reset (or orphan recovery) released
    /// the record while the attempt was still in flight.
    #[error("Stale sync attempt {attempt} for record {record}")]
    StaleAttempt {
        /// Record the write was aimed at
        record: String,
        /// Attempt that tried to write
        attempt: String,
    },

    /// Unknown stored status string
    #[error("Unknown sync status: {0}")]
    UnknownStatus(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),
}
