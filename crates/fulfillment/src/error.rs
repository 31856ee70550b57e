//! Fulfillment error types.

use std::time::Duration;

use domain::{DomainError, OrderStatus};
use ledger_store::LedgerError;
use thiserror::Error;

/// Errors returned by the carrier API client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CarrierError {
    /// The carrier did not recognise the pickup location.
    ///
    /// `suggested` holds the first location the carrier listed as valid, if any.
    #[error("Wrong pickup location: {message}")]
    PickupLocation {
        message: String,
        suggested: Option<String>,
    },

    /// Non-success response from the carrier.
    #[error("Carrier rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Token could not be obtained or was refused.
    #[error("Carrier authentication failed: {0}")]
    Auth(String),

    /// Network failure.
    #[error("Carrier transport error: {0}")]
    Transport(String),

    /// Response body did not match the expected shape.
    #[error("Invalid carrier response: {0}")]
    Decode(String),
}

/// Why a single fulfillment step did not take effect.
#[derive(Debug, Error)]
pub enum StepError {
    /// A referenced discount, affiliate or user does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The referenced record exists but cannot be used (inactive, expired).
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// An external call did not finish in time.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Carrier error: {0}")]
    Carrier(#[from] CarrierError),
}

/// Errors surfaced to callers of the orchestrator.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    /// Missing or malformed input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown order or user.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Rejected by the strict transition table.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// Uniqueness violation on the order row (duplicate order number).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A passthrough call to an external service failed.
    #[error("External service error: {0}")]
    ExternalService(String),

    /// Writing the order row or its history failed.
    #[error("Persistence error: {0}")]
    Persistence(LedgerError),
}

impl FulfillmentError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        FulfillmentError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<DomainError> for FulfillmentError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::Validation(msg) => FulfillmentError::Validation(msg),
            DomainError::InvalidTransition { from, to } => {
                FulfillmentError::InvalidTransition { from, to }
            }
        }
    }
}

impl From<LedgerError> for FulfillmentError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::NotFound { entity, id } => FulfillmentError::NotFound { entity, id },
            LedgerError::Conflict(msg) => FulfillmentError::Conflict(msg),
            other => FulfillmentError::Persistence(other),
        }
    }
}

impl From<StepError> for FulfillmentError {
    fn from(e: StepError) -> Self {
        match e {
            StepError::Ledger(inner) => inner.into(),
            other => FulfillmentError::ExternalService(other.to_string()),
        }
    }
}

/// Convenience type alias for orchestrator results.
pub type Result<T> = std::result::Result<T, FulfillmentError>;
