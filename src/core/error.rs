use crate::core::types::{EntityId, EventId, ExpenseId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    // Configuration errors: wrong startup ordering or wiring. Never recovered.
    #[error("Partition '{0}' is not registered")]
    PartitionNotRegistered(String),

    #[error("Partition '{name}' is not of type {expected}")]
    PartitionTypeMismatch { name: String, expected: &'static str },

    #[error("Partition '{0}' is already registered")]
    DuplicatePartition(String),

    #[error("Registry is already initialized")]
    AlreadyInitialized,

    #[error("Registry is not initialized")]
    NotInitialized,

    #[error("Registry is already shut down")]
    AlreadyShutDown,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Storage errors: logged by the registry and retried on the next pass.
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("Autosave worker error: {0}")]
    Worker(String),

    // Domain errors: surfaced to the caller, state is left untouched.
    #[error("Expense #{0} not found")]
    ExpenseNotFound(ExpenseId),

    #[error("Event #{0} not found")]
    EventNotFound(EventId),

    #[error("Expense #{0} is already settled")]
    ExpenseSettled(ExpenseId),

    #[error("Invalid amount: {0}")]
    InvalidAmount(f64),

    #[error("Cannot remove the last beneficiary of expense #{0}")]
    LastBeneficiary(EntityId),

    #[error("Not permitted: {0}")]
    NotPermitted(String),
}

impl StoreError {
    /// True for errors caused by incorrect wiring or startup ordering.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            StoreError::PartitionNotRegistered(_)
                | StoreError::PartitionTypeMismatch { .. }
                | StoreError::DuplicatePartition(_)
                | StoreError::AlreadyInitialized
                | StoreError::NotInitialized
                | StoreError::AlreadyShutDown
                | StoreError::InvalidConfig(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}
