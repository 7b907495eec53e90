//! Tenant configuration workflow

use crate::{AdminStep, AdminTarget, ConfigureError, ConfigureResult, ReadinessCheck, StorageAdmin};
use fleet_common::config::AdminSettings;
use fleet_common::{public_url, AccessKeyPair, RootCredentials, TenantId};
use std::sync::Arc;
use tracing::{debug, info};

/// Brings a freshly provisioned tenant to a usable state
pub struct InstanceConfigurator {
    admin: Arc<dyn StorageAdmin>,
    readiness: Arc<dyn ReadinessCheck>,
    settings: AdminSettings,
    base_domain: String,
}

impl InstanceConfigurator {
    pub fn new(
        admin: Arc<dyn StorageAdmin>,
        readiness: Arc<dyn ReadinessCheck>,
        settings: AdminSettings,
        base_domain: impl Into<String>,
    ) -> Self {
        Self {
            admin,
            readiness,
            settings,
            base_domain: base_domain.into(),
        }
    }

    /// Wait for the endpoint, then create the scoped user, grant it the
    /// fleet policy and create the initial bucket.
    ///
    /// `cancelled` is consulted before every attempt; once it returns true
    /// the workflow stops with [`ConfigureError::Cancelled`].
    pub async fn configure(
        &self,
        id: &TenantId,
        root: &RootCredentials,
        bucket: &str,
        keys: &AccessKeyPair,
        cancelled: &(dyn Fn() -> bool + Send + Sync),
    ) -> ConfigureResult<()> {
        let target = AdminTarget {
            endpoint: public_url(id, &self.base_domain),
            root: root.clone(),
        };

        self.wait_ready(&target.endpoint, cancelled).await?;
        debug!(tenant = %id, "endpoint ready");

        let admin = self.admin.as_ref();
        let target = &target;
        let policy = self.settings.policy.as_str();
        let region = self.settings.bucket_region.as_str();

        self.step(AdminStep::AddUser, cancelled, || admin.add_user(target, keys))
            .await?;
        self.step(AdminStep::AttachPolicy, cancelled, || {
            admin.attach_policy(target, policy, &keys.access_key)
        })
        .await?;
        self.step(AdminStep::MakeBucket, cancelled, || admin.make_bucket(target, bucket, region))
            .await?;

        info!(tenant = %id, bucket, "tenant configured");
        Ok(())
    }

    async fn wait_ready(&self, endpoint: &str, cancelled: &(dyn Fn() -> bool + Send + Sync)) -> ConfigureResult<()> {
        let readiness = self.readiness.as_ref();
        self.settings
            .readiness
            .run("readiness", ConfigureError::is_transient, || async move {
                if cancelled() {
                    return Err(ConfigureError::Cancelled);
                }
                readiness.check(endpoint).await
            })
            .await
    }

    async fn step<F, Fut>(
        &self,
        step: AdminStep,
        cancelled: &(dyn Fn() -> bool + Send + Sync),
        mut f: F,
    ) -> ConfigureResult<()>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = ConfigureResult<()>>,
    {
        self.settings
            .retry
            .run(step.as_str(), ConfigureError::is_transient, || {
                let attempt = (!cancelled()).then(|| f());
                async move {
                    match attempt {
                        Some(attempt) => attempt.await,
                        None => Err(ConfigureError::Cancelled),
                    }
                }
            })
            .await
    }
}
