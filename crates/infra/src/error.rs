use thiserror::Error;

use garrison_catalog::CatalogError;
use garrison_core::DomainError;

use crate::store::StoreError;

/// Outcome taxonomy of engine and reporting calls.
///
/// Every variant except `TransactionFailed` is decided before any durable
/// write; `TransactionFailed` means the commit was retried and gave up with
/// no partial state left behind.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: i64, available: i64 },

    /// A counter invariant would have been broken. Indicates a defect.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// Safe to retry the whole request.
    #[error("transaction failed: {0}")]
    TransactionFailed(String),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn access_denied(msg: impl Into<String>) -> Self {
        Self::AccessDenied(msg.into())
    }

    /// Stable machine-readable code (used as the `error` field of HTTP bodies).
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation_error",
            EngineError::NotFound(_) => "not_found",
            EngineError::AccessDenied(_) => "access_denied",
            EngineError::InsufficientStock { .. } => "insufficient_stock",
            EngineError::InvariantViolation(_) => "invariant_violation",
            EngineError::TransactionFailed(_) => "transaction_failed",
        }
    }
}

impl From<DomainError> for EngineError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => EngineError::Validation(msg),
            DomainError::NotFound(msg) => EngineError::NotFound(msg),
            DomainError::InsufficientStock {
                requested,
                available,
            } => EngineError::InsufficientStock {
                requested,
                available,
            },
            DomainError::AccessDenied(msg) => EngineError::AccessDenied(msg),
            DomainError::InvariantViolation(msg) => EngineError::InvariantViolation(msg),
            DomainError::Conflict(msg) => EngineError::TransactionFailed(msg),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Validation(msg) => EngineError::Validation(msg),
            StoreError::InvariantViolation(msg) => EngineError::InvariantViolation(msg),
            StoreError::Conflict(msg)
            | StoreError::Unavailable(msg)
            | StoreError::Corrupt(msg) => EngineError::TransactionFailed(msg),
        }
    }
}

impl From<CatalogError> for EngineError {
    fn from(value: CatalogError) -> Self {
        match value {
            CatalogError::Unavailable(msg) => EngineError::TransactionFailed(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_conflicts_surface_as_transaction_failed() {
        let err: EngineError = StoreError::Conflict("stale".into()).into();
        assert_eq!(err.code(), "transaction_failed");
    }

    #[test]
    fn insufficient_stock_keeps_quantities() {
        let err: EngineError = DomainError::insufficient_stock(20, 10).into();
        assert_eq!(
            err,
            EngineError::InsufficientStock {
                requested: 20,
                available: 10
            }
        );
        assert_eq!(err.to_string(), "insufficient stock: requested 20, available 10");
    }
}
