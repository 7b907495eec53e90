//! MinIO Fleet - shared building blocks
//!
//! Types every other fleet crate agrees on:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         FLEET COMMON                             │
//! │                                                                  │
//! │  ┌────────────┐  ┌────────────┐  ┌────────────┐  ┌────────────┐  │
//! │  │  Instance  │  │   Quota    │  │ Identifier │  │   Retry    │  │
//! │  │   Record   │  │   Parser   │  │ Generator  │  │   Policy   │  │
//! │  └────────────┘  └────────────┘  └────────────┘  └────────────┘  │
//! │                                                                  │
//! │  ┌────────────────────────────────────────────────────────────┐  │
//! │  │                FleetConfig (file + env)                    │  │
//! │  └────────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod ids;
pub mod model;
pub mod quota;
pub mod retry;

pub use config::{Backend, FleetConfig};
pub use error::ValidationError;
pub use ids::{IdGenerator, OsRngGenerator};
pub use model::{AccessKeyPair, InstanceRecord, InstanceStatus, RootCredentials, TenantId};
pub use quota::Quota;
pub use retry::RetryPolicy;

/// Public endpoint of a tenant.
///
/// The single place the URL is derived; nothing else builds it.
pub fn public_url(id: &TenantId, base_domain: &str) -> String {
    format!("https://{}", public_host(id, base_domain))
}

/// Public hostname of a tenant (`{id}.{base_domain}`).
pub fn public_host(id: &TenantId, base_domain: &str) -> String {
    format!("{}.{}", id, base_domain.trim_start_matches('.'))
}
