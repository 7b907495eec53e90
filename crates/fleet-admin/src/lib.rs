//! MinIO tenant bootstrap
//!
//! Once the bundle is up, a tenant still has to be configured through its
//! own admin API before it is usable:
//!
//! ```text
//!   readiness ──► add user ──► attach policy ──► make bucket
//!   (HTTPS poll)   (scoped key)   (readwrite)       (region)
//! ```
//!
//! Each step is retried with bounded backoff. Root credentials only ever
//! travel in process environment, never on a command line or in a log line.

pub mod configurator;
pub mod mc;
pub mod memory;
pub mod readiness;

use async_trait::async_trait;
use fleet_common::{AccessKeyPair, RootCredentials};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub use configurator::InstanceConfigurator;
pub use mc::McAdmin;
pub use memory::InMemoryStorageAdmin;
pub use readiness::{HttpReadiness, ReadinessCheck};

/// Admin operation performed against a tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdminStep {
    AddUser,
    AttachPolicy,
    MakeBucket,
}

impl AdminStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AddUser => "add user",
            Self::AttachPolicy => "attach policy",
            Self::MakeBucket => "make bucket",
        }
    }
}

impl fmt::Display for AdminStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum ConfigureError {
    /// Endpoint did not answer healthy
    #[error("{endpoint} not reachable: {message}")]
    Unreachable { endpoint: String, message: String },

    /// Admin call reached the tenant and failed
    #[error("{step} failed: {message}")]
    Admin { step: AdminStep, message: String },

    #[error("{step} timed out after {after:?}")]
    Timeout { step: AdminStep, after: Duration },

    /// Admin tool could not be started
    #[error("failed to run admin client: {0}")]
    Spawn(String),

    /// Injected by the in-memory admin
    #[error("rejected: {0}")]
    Rejected(String),

    /// Caller gave up on the tenant between attempts
    #[error("configuration cancelled")]
    Cancelled,
}

impl ConfigureError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable { .. } | Self::Admin { .. } | Self::Timeout { .. })
    }
}

pub type ConfigureResult<T> = Result<T, ConfigureError>;

/// Tenant endpoint plus the root credentials to act on it
#[derive(Debug, Clone)]
pub struct AdminTarget {
    /// `https://{host}`
    pub endpoint: String,
    pub root: RootCredentials,
}

/// Admin API of one MinIO tenant
#[async_trait]
pub trait StorageAdmin: Send + Sync {
    async fn add_user(&self, target: &AdminTarget, keys: &AccessKeyPair) -> ConfigureResult<()>;

    async fn attach_policy(&self, target: &AdminTarget, policy: &str, user: &str) -> ConfigureResult<()>;

    /// Create `bucket`; an existing bucket is success
    async fn make_bucket(&self, target: &AdminTarget, bucket: &str, region: &str) -> ConfigureResult<()>;
}
