//! Provisioning errors

use fleet_common::TenantId;
use std::time::Duration;
use thiserror::Error;

pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// Status codes worth another attempt
const TRANSIENT_STATUS: &[u16] = &[409, 429, 500, 502, 503, 504];

#[derive(Error, Debug)]
pub enum ProvisionError {
    /// Could not build a cluster client
    #[error("cluster client unavailable: {0}")]
    Client(String),

    /// API server answered with an error status
    #[error("{operation} failed with HTTP {code}: {message}")]
    Api {
        operation: String,
        code: u16,
        message: String,
    },

    /// Request never got an answer
    #[error("{operation} failed: {message}")]
    Transport { operation: String, message: String },

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("{kind} {name} not found")]
    Missing { kind: &'static str, name: String },

    #[error("volume of {id} cannot shrink from {current} to {requested}")]
    Shrink {
        id: TenantId,
        current: String,
        requested: String,
    },

    /// Injected by the in-memory provisioner
    #[error("rejected: {0}")]
    Rejected(String),

    /// Teardown finished with at least one failed object
    #[error("teardown incomplete: {}", summarize(.0))]
    Teardown(Vec<ProvisionError>),
}

fn summarize(errors: &[ProvisionError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

impl ProvisionError {
    pub(crate) fn from_kube(operation: &str, err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ae) => Self::Api {
                operation: operation.to_string(),
                code: ae.code,
                message: ae.message,
            },
            kube::Error::HyperError(e) => Self::Transport {
                operation: operation.to_string(),
                message: e.to_string(),
            },
            kube::Error::Service(e) => Self::Transport {
                operation: operation.to_string(),
                message: e.to_string(),
            },
            other => Self::Client(format!("{}: {}", operation, other)),
        }
    }

    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Api { code, .. } => TRANSIENT_STATUS.contains(code),
            Self::Transport { .. } | Self::Timeout { .. } => true,
            Self::Teardown(errors) => errors.iter().any(Self::is_transient),
            Self::Client(_) | Self::Missing { .. } | Self::Shrink { .. } | Self::Rejected(_) => false,
        }
    }
}
