use common::UserId;
use thiserror::Error;

/// Errors that can occur when interacting with the ledger store.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The referenced row does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A uniqueness constraint rejected the write (e.g. duplicate order number).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A coin debit would take the balance below zero. Nothing was written.
    #[error("Insufficient coin balance for user {user_id}: balance {balance}, requested {requested}")]
    InsufficientBalance {
        user_id: UserId,
        balance: i64,
        requested: i64,
    },

    /// A stored value could not be mapped back to a domain type.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failure injected by a test double.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl LedgerError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        LedgerError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<domain::DomainError> for LedgerError {
    fn from(e: domain::DomainError) -> Self {
        LedgerError::Corrupt(e.to_string())
    }
}

/// Result type for ledger store operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
