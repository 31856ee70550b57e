//! Domain error types.

use thiserror::Error;

use crate::order::OrderStatus;

/// Errors raised by domain validation and the status machine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Missing or malformed input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The requested status change is not in the transition table.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        DomainError::Validation(message.into())
    }
}
