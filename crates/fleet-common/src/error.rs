//! Validation errors

use thiserror::Error;

/// Input rejected before any side effect.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Request body missing or not valid JSON
    #[error("request body is empty or malformed: {0}")]
    MalformedBody(String),

    /// Quota does not match `^[0-9]+(Ki|Mi|Gi)$`
    #[error("invalid storage quota '{0}': expected an integer followed by Ki, Mi or Gi")]
    QuotaFormat(String),

    /// Quota matched the pattern but does not fit a quantity
    #[error("storage quota '{0}' is out of range")]
    QuotaRange(String),

    /// Resize would shrink the volume
    #[error("storage quota cannot shrink from {current} to {requested}")]
    QuotaShrink {
        /// Quota currently recorded
        current: String,
        /// Quota in the request
        requested: String,
    },

    /// Missing bucket name on create
    #[error("bucket name must not be empty")]
    EmptyBucket,
}
