//! Tenant record store
//!
//! The store is the source of truth for "does this tenant exist". Every
//! operation is atomic on its own; nothing here talks to the cluster.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use fleet_common::{InstanceRecord, InstanceStatus, Quota, TenantId};

pub use memory::InMemoryRecordStore;
pub use sqlite::SqliteRecordStore;

/// Store result type
pub type StoreResult<T> = Result<T, StoreError>;

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("instance not found: {0}")]
    NotFound(TenantId),

    /// Live or previously retired id
    #[error("instance id already in use: {0}")]
    AlreadyExists(TenantId),

    #[error("corrupt record {id}: {detail}")]
    Corrupt { id: String, detail: String },

    #[error("storage error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Record store
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a new record; fails if the id is live or retired
    async fn insert(&self, record: &InstanceRecord) -> StoreResult<()>;

    async fn get(&self, id: &TenantId) -> StoreResult<InstanceRecord>;

    /// All live records in insertion order
    async fn list(&self) -> StoreResult<Vec<InstanceRecord>>;

    /// Set status and clear any failure reason
    async fn update_status(&self, id: &TenantId, status: InstanceStatus) -> StoreResult<()>;

    /// Set status to `Error` with a reason
    async fn mark_failed(&self, id: &TenantId, reason: &str) -> StoreResult<()>;

    async fn update_quota_and_bucket(&self, id: &TenantId, bucket: &str, quota: &Quota) -> StoreResult<()>;

    /// Remove the record and retire its id
    async fn delete(&self, id: &TenantId) -> StoreResult<()>;

    /// Whether the id is live or retired
    async fn id_taken(&self, id: &TenantId) -> StoreResult<bool>;
}

#[cfg(test)]
pub(crate) mod conformance {
    //! Behaviour every backend must share.

    use super::*;
    use fleet_common::Quota;

    pub fn record(id: &str, bucket: &str, quota: &str) -> InstanceRecord {
        InstanceRecord::provisioning(TenantId::from(id), bucket, Quota::parse(quota).unwrap(), "example.com")
    }

    pub async fn insert_get_list(store: &dyn RecordStore) {
        store.insert(&record("aaa111", "first", "1Gi")).await.unwrap();
        store.insert(&record("bbb222", "second", "2Gi")).await.unwrap();
        store.insert(&record("ccc333", "third", "3Gi")).await.unwrap();

        let got = store.get(&TenantId::from("bbb222")).await.unwrap();
        assert_eq!(got.bucket, "second");
        assert_eq!(got.quota.to_string(), "2Gi");
        assert_eq!(got.status, InstanceStatus::Provisioning);
        assert_eq!(got.url, "https://bbb222.example.com");

        let ids: Vec<_> = store.list().await.unwrap().into_iter().map(|r| r.id.to_string()).collect();
        assert_eq!(ids, vec!["aaa111", "bbb222", "ccc333"]);
    }

    pub async fn duplicate_insert(store: &dyn RecordStore) {
        store.insert(&record("dup001", "one", "1Gi")).await.unwrap();
        let err = store.insert(&record("dup001", "two", "2Gi")).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
        assert_eq!(store.get(&TenantId::from("dup001")).await.unwrap().bucket, "one");
    }

    pub async fn missing_ids(store: &dyn RecordStore) {
        let id = TenantId::from("nope00");
        assert!(matches!(store.get(&id).await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.update_status(&id, InstanceStatus::Ready).await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.mark_failed(&id, "boom").await, Err(StoreError::NotFound(_))));
        assert!(matches!(
            store.update_quota_and_bucket(&id, "b", &Quota::parse("1Gi").unwrap()).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(store.delete(&id).await, Err(StoreError::NotFound(_))));
        assert!(!store.id_taken(&id).await.unwrap());
    }

    pub async fn status_and_reason(store: &dyn RecordStore) {
        let id = TenantId::from("st0001");
        store.insert(&record("st0001", "b", "1Gi")).await.unwrap();

        store.mark_failed(&id, "ingress rejected").await.unwrap();
        let failed = store.get(&id).await.unwrap();
        assert_eq!(failed.status, InstanceStatus::Error);
        assert_eq!(failed.reason.as_deref(), Some("ingress rejected"));

        store.update_status(&id, InstanceStatus::Ready).await.unwrap();
        let ready = store.get(&id).await.unwrap();
        assert_eq!(ready.status, InstanceStatus::Ready);
        assert!(ready.reason.is_none());
    }

    pub async fn quota_and_bucket(store: &dyn RecordStore) {
        let id = TenantId::from("qb0001");
        let original = record("qb0001", "before", "1Gi");
        store.insert(&original).await.unwrap();

        store.update_quota_and_bucket(&id, "after", &Quota::parse("4Gi").unwrap()).await.unwrap();
        let updated = store.get(&id).await.unwrap();
        assert_eq!(updated.bucket, "after");
        assert_eq!(updated.quota.to_string(), "4Gi");
        assert_eq!(updated.url, original.url);
        assert_eq!(updated.created_at.timestamp(), original.created_at.timestamp());
    }

    pub async fn delete_retires_id(store: &dyn RecordStore) {
        let id = TenantId::from("del001");
        store.insert(&record("del001", "b", "1Gi")).await.unwrap();
        assert!(store.id_taken(&id).await.unwrap());

        store.delete(&id).await.unwrap();
        assert!(matches!(store.get(&id).await, Err(StoreError::NotFound(_))));
        assert!(store.list().await.unwrap().is_empty());

        // Never reused
        assert!(store.id_taken(&id).await.unwrap());
        let err = store.insert(&record("del001", "b", "1Gi")).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
        assert!(matches!(store.delete(&id).await, Err(StoreError::NotFound(_))));
    }
}
