//! Per-tenant serialization

use dashmap::DashMap;
use fleet_common::TenantId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = DashMap<TenantId, Arc<Mutex<()>>>;

/// One async mutex per tenant, created on demand and pruned when idle
#[derive(Clone, Default)]
pub struct TenantLocks {
    locks: Arc<LockMap>,
}

impl TenantLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, id: &TenantId) -> Arc<Mutex<()>> {
        self.locks.entry(id.clone()).or_default().clone()
    }

    /// Wait as long as it takes
    pub async fn acquire(&self, id: &TenantId) -> TenantGuard {
        let guard = self.slot(id).lock_owned().await;
        TenantGuard {
            id: id.clone(),
            guard: Some(guard),
            locks: self.locks.clone(),
        }
    }

    /// Wait at most `wait`; `None` if the tenant stayed busy
    pub async fn acquire_within(&self, id: &TenantId, wait: Duration) -> Option<TenantGuard> {
        let slot = self.slot(id);
        match tokio::time::timeout(wait, slot.lock_owned()).await {
            Ok(guard) => Some(TenantGuard {
                id: id.clone(),
                guard: Some(guard),
                locks: self.locks.clone(),
            }),
            Err(_) => {
                prune(&self.locks, id);
                None
            }
        }
    }

    /// Tenants with a live lock entry
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

fn prune(locks: &LockMap, id: &TenantId) {
    // Only the map holds a reference: nobody owns or waits for it
    locks.remove_if(id, |_, slot| Arc::strong_count(slot) == 1);
}

/// Exclusive hold on one tenant; released on drop
pub struct TenantGuard {
    id: TenantId,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<LockMap>,
}

impl TenantGuard {
    pub fn id(&self) -> &TenantId {
        &self.id
    }
}

impl Drop for TenantGuard {
    fn drop(&mut self) {
        // Release first so the guard's own reference does not block pruning
        drop(self.guard.take());
        prune(&self.locks, &self.id);
    }
}
