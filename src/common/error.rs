//! Common Error Types for the Wagering Engine
//!
//! Provides unified error handling across all modules.

use thiserror::Error;

/// Root error type for the wagering engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Ledger RPC errors
    #[error("ledger error: {0}")]
    Ledger(#[from] crate::ledger::LedgerError),

    /// Storage errors
    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),

    /// Keystore errors
    #[error("keystore error: {0}")]
    Keystore(#[from] crate::keystore::KeystoreError),

    /// Address allocation errors
    #[error("allocation error: {0}")]
    Allocation(#[from] crate::allocator::AllocationError),

    /// Settlement errors
    #[error("settlement error: {0}")]
    Settlement(#[from] crate::settlement::SettlementError),

    /// Outbound dispatch errors
    #[error("dispatch error: {0}")]
    Dispatch(#[from] crate::payout::DispatchError),

    /// Reconciler errors
    #[error("reconciler error: {0}")]
    Reconciler(#[from] crate::reconciler::ReconcilerError),

    /// Validation errors
    #[error("validation error: {0}")]
    Validation(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Ledger(_) | EngineError::Storage(_) | EngineError::Io(_)
        )
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            EngineError::Config(_) => "CONFIG_ERROR",
            EngineError::Ledger(_) => "LEDGER_ERROR",
            EngineError::Storage(_) => "STORAGE_ERROR",
            EngineError::Keystore(_) => "KEYSTORE_ERROR",
            EngineError::Allocation(_) => "ALLOCATION_ERROR",
            EngineError::Settlement(_) => "SETTLEMENT_ERROR",
            EngineError::Dispatch(_) => "DISPATCH_ERROR",
            EngineError::Reconciler(_) => "RECONCILER_ERROR",
            EngineError::Validation(_) => "VALIDATION_ERROR",
            EngineError::Io(_) => "IO_ERROR",
        }
    }
}

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;
