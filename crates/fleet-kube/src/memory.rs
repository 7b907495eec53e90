//! In-memory provisioner (for testing and development)

use crate::error::{ProvisionError, ProvisionResult};
use crate::manifests::ResourceKind;
use crate::{ProvisionRequest, ResourceProvisioner};
use async_trait::async_trait;
use fleet_common::{Quota, TenantId};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
struct Bundle {
    objects: BTreeSet<ResourceKind>,
    quota: Quota,
}

/// Converging resource set held in process
///
/// Failures can be injected per operation and every call can be slowed down
/// so callers' interleavings are observable.
#[derive(Default)]
pub struct InMemoryProvisioner {
    bundles: RwLock<HashMap<TenantId, Bundle>>,
    fail_create: Mutex<Option<String>>,
    fail_resize: Mutex<Option<String>>,
    latency: Mutex<Duration>,
    create_calls: AtomicUsize,
    resize_calls: AtomicUsize,
}

impl InMemoryProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call wait `latency` before acting
    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.lock() = latency;
        self
    }

    /// Fail the next create with `reason`
    pub fn fail_next_create(&self, reason: impl Into<String>) {
        *self.fail_create.lock() = Some(reason.into());
    }

    /// Fail the next resize with `reason`
    pub fn fail_next_resize(&self, reason: impl Into<String>) {
        *self.fail_resize.lock() = Some(reason.into());
    }

    pub fn contains(&self, id: &TenantId) -> bool {
        self.bundles.read().contains_key(id)
    }

    /// Objects currently present for `id`
    pub fn objects(&self, id: &TenantId) -> Vec<ResourceKind> {
        self.bundles
            .read()
            .get(id)
            .map(|b| b.objects.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn quota_of(&self, id: &TenantId) -> Option<Quota> {
        self.bundles.read().get(id).map(|b| b.quota.clone())
    }

    pub fn bundle_count(&self) -> usize {
        self.bundles.read().len()
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn resize_calls(&self) -> usize {
        self.resize_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl ResourceProvisioner for InMemoryProvisioner {
    async fn create(&self, request: &ProvisionRequest) -> ProvisionResult<()> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;

        if let Some(reason) = self.fail_create.lock().take() {
            return Err(ProvisionError::Rejected(reason));
        }

        let mut bundles = self.bundles.write();
        let bundle = bundles.entry(request.id.clone()).or_insert_with(|| Bundle {
            objects: BTreeSet::new(),
            quota: request.quota.clone(),
        });
        // Existing objects are kept as they are, including the volume size
        bundle.objects.extend(ResourceKind::CREATE_ORDER);
        debug!(tenant = %request.id, "bundle created in memory");
        Ok(())
    }

    async fn resize(&self, id: &TenantId, quota: &Quota) -> ProvisionResult<()> {
        self.resize_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;

        if let Some(reason) = self.fail_resize.lock().take() {
            return Err(ProvisionError::Rejected(reason));
        }

        let mut bundles = self.bundles.write();
        let bundle = bundles.get_mut(id).ok_or_else(|| ProvisionError::Missing {
            kind: "pvc",
            name: crate::manifests::volume_name(id),
        })?;
        if *quota < bundle.quota {
            return Err(ProvisionError::Shrink {
                id: id.clone(),
                current: bundle.quota.to_string(),
                requested: quota.to_string(),
            });
        }
        bundle.quota = quota.clone();
        Ok(())
    }

    async fn delete(&self, id: &TenantId) -> ProvisionResult<()> {
        self.pause().await;
        self.bundles.write().remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_common::RootCredentials;

    fn request(id: &str, quota: &str) -> ProvisionRequest {
        ProvisionRequest {
            id: TenantId::from(id),
            root: RootCredentials {
                user: "root".into(),
                password: "password".into(),
            },
            quota: Quota::parse(quota).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_create_twice_converges() {
        let provisioner = InMemoryProvisioner::new();
        let req = request("ab12cd", "1Gi");

        provisioner.create(&req).await.unwrap();
        let first = provisioner.objects(&req.id);
        provisioner.create(&req).await.unwrap();

        assert_eq!(provisioner.objects(&req.id), first);
        assert_eq!(first.len(), ResourceKind::CREATE_ORDER.len());
        assert_eq!(provisioner.bundle_count(), 1);
        assert_eq!(provisioner.create_calls(), 2);
    }

    #[tokio::test]
    async fn test_resize_grows_and_rejects_shrink() {
        let provisioner = InMemoryProvisioner::new();
        let req = request("ab12cd", "2Gi");
        provisioner.create(&req).await.unwrap();

        provisioner.resize(&req.id, &Quota::parse("4Gi").unwrap()).await.unwrap();
        assert_eq!(provisioner.quota_of(&req.id).unwrap().to_string(), "4Gi");

        let err = provisioner.resize(&req.id, &Quota::parse("1Gi").unwrap()).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Shrink { .. }));
        assert_eq!(provisioner.quota_of(&req.id).unwrap().to_string(), "4Gi");
    }

    #[tokio::test]
    async fn test_resize_missing_volume() {
        let provisioner = InMemoryProvisioner::new();
        let err = provisioner
            .resize(&TenantId::from("nope00"), &Quota::parse("1Gi").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Missing { .. }));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let provisioner = InMemoryProvisioner::new();
        let req = request("ab12cd", "1Gi");
        provisioner.create(&req).await.unwrap();

        provisioner.delete(&req.id).await.unwrap();
        provisioner.delete(&req.id).await.unwrap();
        assert!(!provisioner.contains(&req.id));
    }

    #[tokio::test]
    async fn test_injected_failure_is_one_shot() {
        let provisioner = InMemoryProvisioner::new();
        provisioner.fail_next_create("quota exceeded");
        let req = request("ab12cd", "1Gi");

        let err = provisioner.create(&req).await.unwrap_err();
        assert_eq!(err.to_string(), "rejected: quota exceeded");
        assert!(!provisioner.contains(&req.id));

        provisioner.create(&req).await.unwrap();
        assert!(provisioner.contains(&req.id));
    }
}
