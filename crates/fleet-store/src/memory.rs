//! In-memory record store (for testing and development)

use crate::{RecordStore, StoreError, StoreResult};
use async_trait::async_trait;
use fleet_common::{InstanceRecord, InstanceStatus, Quota, TenantId};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

#[derive(Default)]
struct Inner {
    /// id -> (insertion sequence, record)
    records: HashMap<TenantId, (u64, InstanceRecord)>,
    retired: HashSet<TenantId>,
    next_seq: u64,
}

impl Inner {
    fn record_mut(&mut self, id: &TenantId) -> StoreResult<&mut InstanceRecord> {
        self.records
            .get_mut(id)
            .map(|(_, r)| r)
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }
}

/// Record store held behind a single lock
pub struct InMemoryRecordStore {
    inner: RwLock<Inner>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn insert(&self, record: &InstanceRecord) -> StoreResult<()> {
        let mut inner = self.inner.write();
        if inner.records.contains_key(&record.id) || inner.retired.contains(&record.id) {
            return Err(StoreError::AlreadyExists(record.id.clone()));
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.records.insert(record.id.clone(), (seq, record.clone()));
        Ok(())
    }

    async fn get(&self, id: &TenantId) -> StoreResult<InstanceRecord> {
        self.inner
            .read()
            .records
            .get(id)
            .map(|(_, r)| r.clone())
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn list(&self) -> StoreResult<Vec<InstanceRecord>> {
        let inner = self.inner.read();
        let mut rows: Vec<_> = inner.records.values().collect();
        rows.sort_by_key(|(seq, _)| *seq);
        Ok(rows.into_iter().map(|(_, r)| r.clone()).collect())
    }

    async fn update_status(&self, id: &TenantId, status: InstanceStatus) -> StoreResult<()> {
        let mut inner = self.inner.write();
        let record = inner.record_mut(id)?;
        record.status = status;
        record.reason = None;
        Ok(())
    }

    async fn mark_failed(&self, id: &TenantId, reason: &str) -> StoreResult<()> {
        let mut inner = self.inner.write();
        let record = inner.record_mut(id)?;
        record.status = InstanceStatus::Error;
        record.reason = Some(reason.to_string());
        Ok(())
    }

    async fn update_quota_and_bucket(&self, id: &TenantId, bucket: &str, quota: &Quota) -> StoreResult<()> {
        let mut inner = self.inner.write();
        let record = inner.record_mut(id)?;
        record.bucket = bucket.to_string();
        record.quota = quota.clone();
        Ok(())
    }

    async fn delete(&self, id: &TenantId) -> StoreResult<()> {
        let mut inner = self.inner.write();
        if inner.records.remove(id).is_none() {
            return Err(StoreError::NotFound(id.clone()));
        }
        inner.retired.insert(id.clone());
        Ok(())
    }

    async fn id_taken(&self, id: &TenantId) -> StoreResult<bool> {
        let inner = self.inner.read();
        Ok(inner.records.contains_key(id) || inner.retired.contains(id))
    }
}
