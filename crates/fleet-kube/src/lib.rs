//! Tenant resource bundle on Kubernetes
//!
//! Every tenant owns one fixed-shape bundle in the fleet namespace:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                     namespace (miniomatic)                    │
//! │                                                               │
//! │  {id}-minio-ingress ──► s-{id}-minio-service :9000            │
//! │        │                        │                             │
//! │   TLS {host}-tls                ▼                             │
//! │   (cert-manager)        {id}-minio-deployment                 │
//! │                          │              │                     │
//! │                          ▼              ▼                     │
//! │               {id}-minio-secrets   {id}-minio-pvc             │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Creation is idempotent (existing objects count as created) and teardown
//! tolerates objects that are already gone.

pub mod error;
pub mod cluster;
pub mod manifests;
pub mod memory;

use async_trait::async_trait;
use fleet_common::{Quota, RootCredentials, TenantId};

pub use error::{ProvisionError, ProvisionResult};
pub use cluster::KubeProvisioner;
pub use manifests::{BundleTemplate, ResourceKind};
pub use memory::InMemoryProvisioner;

/// Everything needed to lay down a new tenant bundle
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub id: TenantId,
    pub root: RootCredentials,
    pub quota: Quota,
}

/// Creates, grows and removes tenant bundles
#[async_trait]
pub trait ResourceProvisioner: Send + Sync {
    /// Create every object of the bundle; objects that already exist are kept.
    async fn create(&self, request: &ProvisionRequest) -> ProvisionResult<()>;

    /// Grow the tenant volume to `quota`.
    async fn resize(&self, id: &TenantId, quota: &Quota) -> ProvisionResult<()>;

    /// Remove the bundle. Attempts every object and reports all failures.
    async fn delete(&self, id: &TenantId) -> ProvisionResult<()>;
}
