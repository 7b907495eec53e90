//! In-memory storage admin (for testing and development)

use crate::{AdminStep, AdminTarget, ConfigureError, ConfigureResult, ReadinessCheck, StorageAdmin};
use async_trait::async_trait;
use fleet_common::AccessKeyPair;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};

/// Admin-visible state of one tenant
#[derive(Debug, Default, Clone)]
pub struct TenantState {
    /// access key -> secret key
    pub users: HashMap<String, String>,
    /// user -> policy
    pub policies: HashMap<String, String>,
    /// bucket -> region
    pub buckets: HashMap<String, String>,
}

/// Fake MinIO fleet, keyed by endpoint
///
/// Also acts as the readiness check so a development setup needs a single
/// object. Transient failures can be scripted per step.
#[derive(Default)]
pub struct InMemoryStorageAdmin {
    tenants: RwLock<HashMap<String, TenantState>>,
    flaky: RwLock<HashMap<AdminStep, u32>>,
    broken: RwLock<HashSet<AdminStep>>,
    unready_checks: AtomicU32,
}

impl InMemoryStorageAdmin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail `step` transiently for the next `times` calls
    pub fn flaky(&self, step: AdminStep, times: u32) {
        self.flaky.write().insert(step, times);
    }

    /// Fail `step` permanently
    pub fn break_step(&self, step: AdminStep) {
        self.broken.write().insert(step);
    }

    /// Report "not ready" for the next `checks` readiness checks
    pub fn unready_for(&self, checks: u32) {
        self.unready_checks.store(checks, Ordering::SeqCst);
    }

    pub fn tenant(&self, endpoint: &str) -> Option<TenantState> {
        self.tenants.read().get(endpoint).cloned()
    }

    fn gate(&self, step: AdminStep) -> ConfigureResult<()> {
        if self.broken.read().contains(&step) {
            return Err(ConfigureError::Rejected(format!("{} disabled", step)));
        }
        let mut flaky = self.flaky.write();
        if let Some(left) = flaky.get_mut(&step) {
            if *left > 0 {
                *left -= 1;
                return Err(ConfigureError::Admin {
                    step,
                    message: "server busy".to_string(),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdmin for InMemoryStorageAdmin {
    async fn add_user(&self, target: &AdminTarget, keys: &AccessKeyPair) -> ConfigureResult<()> {
        self.gate(AdminStep::AddUser)?;
        self.tenants
            .write()
            .entry(target.endpoint.clone())
            .or_default()
            .users
            .insert(keys.access_key.clone(), keys.secret_key.clone());
        Ok(())
    }

    async fn attach_policy(&self, target: &AdminTarget, policy: &str, user: &str) -> ConfigureResult<()> {
        self.gate(AdminStep::AttachPolicy)?;
        let mut tenants = self.tenants.write();
        let tenant = tenants.entry(target.endpoint.clone()).or_default();
        if !tenant.users.contains_key(user) {
            return Err(ConfigureError::Rejected(format!("no such user {}", user)));
        }
        tenant.policies.insert(user.to_string(), policy.to_string());
        Ok(())
    }

    async fn make_bucket(&self, target: &AdminTarget, bucket: &str, region: &str) -> ConfigureResult<()> {
        self.gate(AdminStep::MakeBucket)?;
        self.tenants
            .write()
            .entry(target.endpoint.clone())
            .or_default()
            .buckets
            .entry(bucket.to_string())
            .or_insert_with(|| region.to_string());
        Ok(())
    }
}

#[async_trait]
impl ReadinessCheck for InMemoryStorageAdmin {
    async fn check(&self, endpoint: &str) -> ConfigureResult<()> {
        let pending = self
            .unready_checks
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match pending {
            Ok(_) => Err(ConfigureError::Unreachable {
                endpoint: endpoint.to_string(),
                message: "connection refused".to_string(),
            }),
            Err(_) => Ok(()),
        }
    }
}
