//! Error taxonomy returned by every inbound operation.

use thiserror::Error;

use orderlink_core::DomainError;

use crate::store::StoreError;

/// Failure of a ledger, association or filter operation.
///
/// `Validation`, `NotFound` and `Conflict` are deterministic outcomes the
/// caller can act on. `Internal` wraps storage failures; its message stays
/// generic and the cause is only reachable through [`std::error::Error::source`].
#[derive(Debug, Error)]
pub enum CommerceError {
    /// Malformed input, detected before any mutation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Order, product or association absent (or tombstoned).
    #[error("{0} not found")]
    NotFound(String),

    /// Insufficient stock or duplicate association.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal storage error")]
    Internal(#[source] StoreError),
}

pub type CommerceResult<T> = Result<T, CommerceError>;

impl CommerceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<DomainError> for CommerceError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => CommerceError::Validation(msg),
            DomainError::InvalidId(msg) => CommerceError::Validation(msg),
            DomainError::NotFound(what) => CommerceError::NotFound(what),
            DomainError::Conflict(msg) => CommerceError::Conflict(msg),
        }
    }
}

impl From<StoreError> for CommerceError {
    fn from(value: StoreError) -> Self {
        CommerceError::Internal(value)
    }
}
