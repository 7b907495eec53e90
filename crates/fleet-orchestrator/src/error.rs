//! Lifecycle errors

use fleet_common::{TenantId, ValidationError};
use fleet_store::StoreError;
use thiserror::Error;

pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Errors surfaced synchronously to callers
///
/// Failures inside background workflows never show up here; they are
/// captured on the record as `Error` with a reason.
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// Rejected before any side effect
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("instance not found: {0}")]
    NotFound(TenantId),

    /// Tenant is busy or in a state that does not allow the operation
    #[error("{0}")]
    Conflict(String),

    #[error("record store failure: {0}")]
    Store(StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for LifecycleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::NotFound(id),
            other => Self::Store(other),
        }
    }
}
