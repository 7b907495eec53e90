//! Create / Resize / Delete

use crate::error::{LifecycleError, LifecycleResult};
use crate::locks::{TenantGuard, TenantLocks};
use crate::supervisor::WorkflowSupervisor;
use dashmap::DashMap;
use fleet_admin::{ConfigureError, InstanceConfigurator};
use fleet_common::config::LifecycleSettings;
use fleet_common::{
    AccessKeyPair, IdGenerator, InstanceRecord, InstanceStatus, Quota, RootCredentials, TenantId, ValidationError,
};
use fleet_kube::{ProvisionRequest, ResourceProvisioner};
use fleet_store::{RecordStore, StoreError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Create payload
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub bucket: String,
    pub storage: String,
}

/// Resize payload; an absent or empty bucket keeps the current one
#[derive(Debug, Clone)]
pub struct ResizeRequest {
    pub storage: String,
    pub bucket: Option<String>,
}

/// Accepted Create: the new record plus the scoped key, shown once
#[derive(Debug, Clone)]
pub struct CreatedInstance {
    pub record: InstanceRecord,
    pub keys: AccessKeyPair,
}

/// Collaborators the orchestrator drives
pub struct LifecycleDeps {
    pub store: Arc<dyn RecordStore>,
    pub provisioner: Arc<dyn ResourceProvisioner>,
    pub configurator: Arc<InstanceConfigurator>,
    pub ids: Arc<dyn IdGenerator>,
}

/// Stage of the create workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CreateStage {
    Provision,
    Configure,
}

impl CreateStage {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Provision => "provision",
            Self::Configure => "configure",
        }
    }
}

struct Inner {
    store: Arc<dyn RecordStore>,
    provisioner: Arc<dyn ResourceProvisioner>,
    configurator: Arc<InstanceConfigurator>,
    ids: Arc<dyn IdGenerator>,
    locks: TenantLocks,
    /// Cancellation flags of creates still running
    creates: DashMap<TenantId, Arc<AtomicBool>>,
    supervisor: WorkflowSupervisor,
    settings: LifecycleSettings,
    base_domain: String,
}

/// Tenant lifecycle state machine
#[derive(Clone)]
pub struct LifecycleOrchestrator {
    inner: Arc<Inner>,
}

impl LifecycleOrchestrator {
    pub fn new(deps: LifecycleDeps, settings: LifecycleSettings, base_domain: impl Into<String>) -> Self {
        let supervisor = WorkflowSupervisor::new(deps.store.clone());
        Self {
            inner: Arc::new(Inner {
                store: deps.store,
                provisioner: deps.provisioner,
                configurator: deps.configurator,
                ids: deps.ids,
                locks: TenantLocks::new(),
                creates: DashMap::new(),
                supervisor,
                settings,
                base_domain: base_domain.into(),
            }),
        }
    }

    pub fn supervisor(&self) -> &WorkflowSupervisor {
        &self.inner.supervisor
    }

    /// Wait up to `grace` for background workflows.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        let drained = self.inner.supervisor.drain(grace).await;
        if !drained {
            warn!(in_flight = self.inner.supervisor.in_flight(), "workflows still running at shutdown");
        }
        drained
    }

    pub async fn get(&self, id: &TenantId) -> LifecycleResult<InstanceRecord> {
        Ok(self.inner.store.get(id).await?)
    }

    pub async fn list(&self) -> LifecycleResult<Vec<InstanceRecord>> {
        Ok(self.inner.store.list().await?)
    }

    /// Validate, insert a `Provisioning` record and start provisioning in
    /// the background.
    pub async fn create(&self, request: CreateRequest) -> LifecycleResult<CreatedInstance> {
        if request.bucket.trim().is_empty() {
            return Err(ValidationError::EmptyBucket.into());
        }
        let quota = Quota::parse(&request.storage)?;

        let (record, guard) = self.insert_fresh(&request.bucket, &quota).await?;
        let root = self.inner.ids.root_credentials();
        let keys = self.inner.ids.access_key_pair();

        info!(tenant = %record.id, quota = %quota, bucket = %record.bucket, "instance accepted");

        let cancelled = Arc::new(AtomicBool::new(false));
        self.inner.creates.insert(record.id.clone(), cancelled.clone());

        let this = self.clone();
        let workflow = CreateWorkflow {
            id: record.id.clone(),
            bucket: record.bucket.clone(),
            quota,
            root,
            keys: keys.clone(),
            cancelled,
        };
        self.inner.supervisor.spawn(record.id.clone(), "create", async move {
            let id = workflow.id.clone();
            this.run_create(workflow, guard).await;
            this.inner.creates.remove(&id);
        });

        Ok(CreatedInstance { record, keys })
    }

    /// Pick an unused id, lock it and insert its record.
    async fn insert_fresh(&self, bucket: &str, quota: &Quota) -> LifecycleResult<(InstanceRecord, TenantGuard)> {
        let attempts = self.inner.settings.id_attempts.max(1);
        for attempt in 1..=attempts {
            let id = self.inner.ids.new_tenant_id();
            if self.inner.store.id_taken(&id).await? {
                debug!(tenant = %id, attempt, "id collision, regenerating");
                continue;
            }

            let guard = self.inner.locks.acquire(&id).await;
            let record = InstanceRecord::provisioning(id, bucket, quota.clone(), &self.inner.base_domain);
            match self.inner.store.insert(&record).await {
                Ok(()) => return Ok((record, guard)),
                Err(StoreError::AlreadyExists(id)) => {
                    debug!(tenant = %id, attempt, "id taken concurrently, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(LifecycleError::Internal(format!(
            "could not allocate a unique instance id after {} attempts",
            attempts
        )))
    }

    async fn run_create(&self, workflow: CreateWorkflow, _guard: TenantGuard) {
        let id = &workflow.id;

        let cancelled = || workflow.cancelled.load(Ordering::SeqCst);

        for stage in [CreateStage::Provision, CreateStage::Configure] {
            if cancelled() || !self.still_exists(id).await {
                info!(tenant = %id, stage = stage.as_str(), "instance deleted, stopping create");
                return;
            }

            let outcome = match stage {
                CreateStage::Provision => self
                    .inner
                    .provisioner
                    .create(&workflow.provision_request())
                    .await
                    .map_err(|e| e.to_string()),
                CreateStage::Configure => match self
                    .inner
                    .configurator
                    .configure(id, &workflow.root, &workflow.bucket, &workflow.keys, &cancelled)
                    .await
                {
                    Err(ConfigureError::Cancelled) => {
                        info!(tenant = %id, stage = stage.as_str(), "instance deleted, stopping create");
                        return;
                    }
                    outcome => outcome.map_err(|e| e.to_string()),
                },
            };

            if let Err(reason) = outcome {
                warn!(tenant = %id, stage = stage.as_str(), error = %reason, "create failed");
                self.fail(id, &format!("{}: {}", stage.as_str(), reason)).await;
                return;
            }
            debug!(tenant = %id, stage = stage.as_str(), "stage complete");
        }

        self.set_status(id, InstanceStatus::Ready).await;
        info!(tenant = %id, "instance ready");
    }

    /// Grow the volume of a `Ready` tenant. Runs within the request.
    pub async fn resize(&self, id: &TenantId, request: ResizeRequest) -> LifecycleResult<InstanceRecord> {
        let quota = Quota::parse(&request.storage)?;

        // Unknown ids fail fast rather than waiting on a lock nobody holds
        let _ = self.inner.store.get(id).await?;

        let _guard = self
            .inner
            .locks
            .acquire_within(id, self.inner.settings.lock_wait())
            .await
            .ok_or_else(|| LifecycleError::Conflict(format!("instance {} is busy", id)))?;

        let record = self.inner.store.get(id).await?;
        if record.status != InstanceStatus::Ready {
            return Err(LifecycleError::Conflict(format!(
                "instance {} is {}, resize needs ready",
                id, record.status
            )));
        }
        if quota < record.quota {
            return Err(ValidationError::QuotaShrink {
                current: record.quota.to_string(),
                requested: quota.to_string(),
            }
            .into());
        }

        let bucket = request
            .bucket
            .filter(|b| !b.trim().is_empty())
            .unwrap_or_else(|| record.bucket.clone());

        self.inner.store.update_status(id, InstanceStatus::Resizing).await?;
        if let Err(e) = self.inner.store.update_quota_and_bucket(id, &bucket, &quota).await {
            self.set_status(id, InstanceStatus::Ready).await;
            return Err(e.into());
        }
        info!(tenant = %id, from = %record.quota, to = %quota, "resizing");

        match self.inner.provisioner.resize(id, &quota).await {
            Ok(()) => {
                self.set_status(id, InstanceStatus::Ready).await;
                info!(tenant = %id, quota = %quota, "resize complete");
            }
            Err(e) => {
                warn!(tenant = %id, error = %e, "resize failed");
                self.fail(id, &format!("resize: {}", e)).await;
            }
        }

        Ok(self.inner.store.get(id).await?)
    }

    /// Remove the record now; tear the bundle down in the background.
    ///
    /// A create in flight holds the tenant lock for its whole run, so delete
    /// overtakes it and cancels it. Any other holder is a resize, which
    /// delete waits for up to `lock_wait_secs`.
    pub async fn delete(&self, id: &TenantId) -> LifecycleResult<()> {
        let record = self.inner.store.get(id).await?;
        let guard = if record.status == InstanceStatus::Provisioning {
            None
        } else {
            let guard = self
                .inner
                .locks
                .acquire_within(id, self.inner.settings.lock_wait())
                .await
                .ok_or_else(|| LifecycleError::Conflict(format!("instance {} is busy", id)))?;
            Some(guard)
        };

        self.inner.store.delete(id).await?;
        if let Some((_, cancelled)) = self.inner.creates.remove(id) {
            cancelled.store(true, Ordering::SeqCst);
        }
        drop(guard);
        info!(tenant = %id, "instance deleted, teardown scheduled");

        let this = self.clone();
        let owned = id.clone();
        self.inner
            .supervisor
            .spawn(id.clone(), "teardown", async move { this.run_teardown(owned).await });
        Ok(())
    }

    async fn run_teardown(&self, id: TenantId) {
        // Waits for a create still in flight on this tenant
        let _guard = self.inner.locks.acquire(&id).await;
        match self.inner.provisioner.delete(&id).await {
            Ok(()) => info!(tenant = %id, "teardown complete"),
            Err(e) => warn!(tenant = %id, error = %e, "teardown incomplete"),
        }
    }

    async fn still_exists(&self, id: &TenantId) -> bool {
        match self.inner.store.get(id).await {
            Ok(_) => true,
            Err(StoreError::NotFound(_)) => false,
            Err(e) => {
                warn!(tenant = %id, error = %e, "record lookup failed, continuing");
                true
            }
        }
    }

    async fn set_status(&self, id: &TenantId, status: InstanceStatus) {
        match self.inner.store.update_status(id, status).await {
            Ok(()) => {}
            Err(StoreError::NotFound(_)) => debug!(tenant = %id, %status, "record gone, status dropped"),
            Err(e) => warn!(tenant = %id, %status, error = %e, "status update failed"),
        }
    }

    async fn fail(&self, id: &TenantId, reason: &str) {
        match self.inner.store.mark_failed(id, reason).await {
            Ok(()) => {}
            Err(StoreError::NotFound(_)) => debug!(tenant = %id, "record gone, failure dropped"),
            Err(e) => warn!(tenant = %id, error = %e, "could not record failure"),
        }
    }
}

struct CreateWorkflow {
    id: TenantId,
    bucket: String,
    quota: Quota,
    root: RootCredentials,
    keys: AccessKeyPair,
    cancelled: Arc<AtomicBool>,
}

impl CreateWorkflow {
    fn provision_request(&self) -> ProvisionRequest {
        ProvisionRequest {
            id: self.id.clone(),
            root: self.root.clone(),
            quota: self.quota.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fleet_admin::{AdminStep, InMemoryStorageAdmin};
    use fleet_common::config::AdminSettings;
    use fleet_common::{OsRngGenerator, RetryPolicy};
    use fleet_kube::InMemoryProvisioner;
    use fleet_store::{InMemoryRecordStore, StoreResult};
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Hands out scripted tenant ids, then random ones
    struct ScriptedIds(Mutex<VecDeque<&'static str>>);

    impl ScriptedIds {
        fn new(ids: &[&'static str]) -> Self {
            Self(Mutex::new(ids.iter().copied().collect()))
        }
    }

    impl IdGenerator for ScriptedIds {
        fn new_tenant_id(&self) -> TenantId {
            match self.0.lock().pop_front() {
                Some(id) => TenantId::from(id),
                None => OsRngGenerator.new_tenant_id(),
            }
        }

        fn new_secret(&self, len: usize) -> String {
            OsRngGenerator.new_secret(len)
        }
    }

    /// Logs every applied write; can refuse quota updates
    #[derive(Default)]
    struct JournalStore {
        records: InMemoryRecordStore,
        writes: Mutex<Vec<String>>,
        refuse_quota: AtomicBool,
    }

    impl JournalStore {
        fn log(&self, entry: String) {
            self.writes.lock().push(entry);
        }

        fn take_writes(&self) -> Vec<String> {
            std::mem::take(&mut *self.writes.lock())
        }
    }

    #[async_trait]
    impl RecordStore for JournalStore {
        async fn insert(&self, record: &InstanceRecord) -> StoreResult<()> {
            self.records.insert(record).await?;
            self.log(format!("insert {}", record.id));
            Ok(())
        }

        async fn get(&self, id: &TenantId) -> StoreResult<InstanceRecord> {
            self.records.get(id).await
        }

        async fn list(&self) -> StoreResult<Vec<InstanceRecord>> {
            self.records.list().await
        }

        async fn update_status(&self, id: &TenantId, status: InstanceStatus) -> StoreResult<()> {
            self.records.update_status(id, status).await?;
            self.log(format!("status {}", status.as_str()));
            Ok(())
        }

        async fn mark_failed(&self, id: &TenantId, reason: &str) -> StoreResult<()> {
            self.records.mark_failed(id, reason).await?;
            self.log("failed".to_string());
            Ok(())
        }

        async fn update_quota_and_bucket(&self, id: &TenantId, bucket: &str, quota: &Quota) -> StoreResult<()> {
            if self.refuse_quota.load(Ordering::SeqCst) {
                return Err(StoreError::Corrupt {
                    id: id.to_string(),
                    detail: "disk full".to_string(),
                });
            }
            self.records.update_quota_and_bucket(id, bucket, quota).await?;
            self.log(format!("quota {}", quota));
            Ok(())
        }

        async fn delete(&self, id: &TenantId) -> StoreResult<()> {
            self.records.delete(id).await?;
            self.log("delete".to_string());
            Ok(())
        }

        async fn id_taken(&self, id: &TenantId) -> StoreResult<bool> {
            self.records.id_taken(id).await
        }
    }

    fn fast_readiness() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(10))
    }

    fn assemble(
        store: Arc<dyn RecordStore>,
        provisioner: Arc<InMemoryProvisioner>,
        admin: Arc<InMemoryStorageAdmin>,
        ids: Arc<dyn IdGenerator>,
        readiness: RetryPolicy,
    ) -> LifecycleOrchestrator {
        let admin_settings = AdminSettings {
            readiness,
            retry: RetryPolicy::new(2, Duration::from_millis(10), Duration::from_millis(10)),
            ..Default::default()
        };
        let configurator = Arc::new(InstanceConfigurator::new(
            admin.clone(),
            admin,
            admin_settings,
            "s3.example.com",
        ));
        let settings = LifecycleSettings {
            lock_wait_secs: 1,
            id_attempts: 3,
            shutdown_grace_secs: 5,
        };
        LifecycleOrchestrator::new(
            LifecycleDeps {
                store,
                provisioner,
                configurator,
                ids,
            },
            settings,
            "s3.example.com",
        )
    }

    struct Harness {
        orchestrator: LifecycleOrchestrator,
        store: Arc<InMemoryRecordStore>,
        provisioner: Arc<InMemoryProvisioner>,
        admin: Arc<InMemoryStorageAdmin>,
    }

    fn harness_with(provisioner: InMemoryProvisioner, ids: Arc<dyn IdGenerator>) -> Harness {
        harness_polling(provisioner, ids, fast_readiness())
    }

    fn harness_polling(provisioner: InMemoryProvisioner, ids: Arc<dyn IdGenerator>, readiness: RetryPolicy) -> Harness {
        let store = Arc::new(InMemoryRecordStore::new());
        let provisioner = Arc::new(provisioner);
        let admin = Arc::new(InMemoryStorageAdmin::new());
        let orchestrator = assemble(store.clone(), provisioner.clone(), admin.clone(), ids, readiness);
        Harness {
            orchestrator,
            store,
            provisioner,
            admin,
        }
    }

    fn harness() -> Harness {
        harness_with(InMemoryProvisioner::new(), Arc::new(OsRngGenerator))
    }

    fn create_req(storage: &str, bucket: &str) -> CreateRequest {
        CreateRequest {
            storage: storage.into(),
            bucket: bucket.into(),
        }
    }

    fn resize_req(storage: &str) -> ResizeRequest {
        ResizeRequest {
            storage: storage.into(),
            bucket: None,
        }
    }

    async fn settle(h: &Harness) {
        assert!(h.orchestrator.shutdown(Duration::from_secs(60)).await);
    }

    async fn ready_instance(h: &Harness, storage: &str) -> TenantId {
        let created = h.orchestrator.create(create_req(storage, "data")).await.unwrap();
        settle(h).await;
        let id = created.record.id;
        assert_eq!(h.orchestrator.get(&id).await.unwrap().status, InstanceStatus::Ready);
        id
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_reaches_ready() {
        let h = harness();
        let created = h.orchestrator.create(create_req("10Gi", "mybucket")).await.unwrap();

        assert_eq!(created.record.status, InstanceStatus::Provisioning);
        assert_eq!(created.record.url, format!("https://{}.s3.example.com", created.record.id));
        assert_eq!(created.keys.access_key.len(), 20);
        assert_eq!(created.keys.secret_key.len(), 40);

        let fetched = h.orchestrator.get(&created.record.id).await.unwrap();
        assert_eq!(fetched.bucket, "mybucket");
        assert_eq!(fetched.quota.to_string(), "10Gi");

        settle(&h).await;
        let ready = h.orchestrator.get(&created.record.id).await.unwrap();
        assert_eq!(ready.status, InstanceStatus::Ready);
        assert!(h.provisioner.contains(&created.record.id));

        let tenant = h.admin.tenant(&created.record.url).unwrap();
        assert_eq!(tenant.users[&created.keys.access_key], created.keys.secret_key);
        assert!(tenant.buckets.contains_key("mybucket"));
    }

    #[tokio::test]
    async fn test_create_validates_before_side_effects() {
        let h = harness();
        for bad in ["10GB", "10gi", "", "Gi", "-1Gi", "1.5Gi", "1Ti"] {
            let err = h.orchestrator.create(create_req(bad, "b")).await.unwrap_err();
            assert!(matches!(err, LifecycleError::Validation(_)), "{bad} should be rejected");
        }
        let err = h.orchestrator.create(create_req("1Gi", "  ")).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Validation(ValidationError::EmptyBucket)));

        assert!(h.store.is_empty());
        assert_eq!(h.provisioner.create_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_id_collision_regenerates() {
        let h = harness_with(InMemoryProvisioner::new(), Arc::new(ScriptedIds::new(&["aaaaaa", "aaaaaa", "bbbbbb"])));
        let first = h.orchestrator.create(create_req("1Gi", "one")).await.unwrap();
        let second = h.orchestrator.create(create_req("1Gi", "two")).await.unwrap();

        assert_eq!(first.record.id.as_str(), "aaaaaa");
        assert_eq!(second.record.id.as_str(), "bbbbbb");
        assert_eq!(h.orchestrator.get(&TenantId::from("aaaaaa")).await.unwrap().bucket, "one");
        settle(&h).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_deleted_ids_are_never_reissued() {
        let h = harness_with(InMemoryProvisioner::new(), Arc::new(ScriptedIds::new(&["aaaaaa", "aaaaaa", "cccccc"])));
        let first = h.orchestrator.create(create_req("1Gi", "one")).await.unwrap();
        settle(&h).await;
        h.orchestrator.delete(&first.record.id).await.unwrap();

        let second = h.orchestrator.create(create_req("1Gi", "two")).await.unwrap();
        assert_eq!(second.record.id.as_str(), "cccccc");
        settle(&h).await;
    }

    #[tokio::test]
    async fn test_id_space_exhaustion_is_internal_error() {
        let h = harness_with(
            InMemoryProvisioner::new(),
            Arc::new(ScriptedIds::new(&["aaaaaa", "aaaaaa", "aaaaaa", "aaaaaa"])),
        );
        h.orchestrator.create(create_req("1Gi", "one")).await.unwrap();
        let err = h.orchestrator.create(create_req("1Gi", "two")).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Internal(_)));
        assert_eq!(h.store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provision_failure_records_reason() {
        let h = harness();
        h.provisioner.fail_next_create("ingress admission denied");
        let created = h.orchestrator.create(create_req("1Gi", "b")).await.unwrap();
        settle(&h).await;

        let record = h.orchestrator.get(&created.record.id).await.unwrap();
        assert_eq!(record.status, InstanceStatus::Error);
        let reason = record.reason.unwrap();
        assert!(reason.starts_with("provision:"));
        assert!(reason.contains("ingress admission denied"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_configure_failure_records_reason() {
        let h = harness();
        h.admin.break_step(AdminStep::MakeBucket);
        let created = h.orchestrator.create(create_req("1Gi", "b")).await.unwrap();
        settle(&h).await;

        let record = h.orchestrator.get(&created.record.id).await.unwrap();
        assert_eq!(record.status, InstanceStatus::Error);
        assert!(record.reason.unwrap().starts_with("configure:"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_during_create_wins() {
        let h = harness_with(
            InMemoryProvisioner::new().with_latency(Duration::from_secs(2)),
            Arc::new(OsRngGenerator),
        );
        let created = h.orchestrator.create(create_req("1Gi", "b")).await.unwrap();
        let id = created.record.id;

        // Let the workflow get into the provisioner
        tokio::time::sleep(Duration::from_millis(500)).await;
        h.orchestrator.delete(&id).await.unwrap();
        assert!(matches!(h.orchestrator.get(&id).await, Err(LifecycleError::NotFound(_))));

        settle(&h).await;
        assert!(matches!(h.orchestrator.get(&id).await, Err(LifecycleError::NotFound(_))));
        assert!(!h.provisioner.contains(&id));
        assert!(h.store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_cancels_readiness_wait() {
        let h = harness_polling(
            InMemoryProvisioner::new(),
            Arc::new(OsRngGenerator),
            RetryPolicy::new(1000, Duration::from_secs(1), Duration::from_secs(1)),
        );
        h.admin.unready_for(10_000);
        let created = h.orchestrator.create(create_req("1Gi", "b")).await.unwrap();
        let id = created.record.id;

        // Bundle is up, configure is polling an endpoint that never answers
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(h.provisioner.contains(&id));
        h.orchestrator.delete(&id).await.unwrap();

        settle(&h).await;
        assert!(!h.provisioner.contains(&id));
        assert!(h.admin.tenant(&created.record.url).is_none());
        assert!(h.store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_waits_for_resize_in_flight() {
        let h = harness_with(
            InMemoryProvisioner::new().with_latency(Duration::from_millis(500)),
            Arc::new(OsRngGenerator),
        );
        let id = ready_instance(&h, "1Gi").await;

        let orchestrator = h.orchestrator.clone();
        let target = id.clone();
        let resize = tokio::spawn(async move { orchestrator.resize(&target, resize_req("2Gi")).await });
        tokio::time::sleep(Duration::from_millis(100)).await;

        h.orchestrator.delete(&id).await.unwrap();
        let resized = resize.await.unwrap().unwrap();
        assert_eq!(resized.status, InstanceStatus::Ready);
        assert_eq!(resized.quota.to_string(), "2Gi");
        assert!(matches!(h.orchestrator.get(&id).await, Err(LifecycleError::NotFound(_))));

        settle(&h).await;
        assert!(!h.provisioner.contains(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_busy_past_lock_wait_is_conflict() {
        let h = harness_with(
            InMemoryProvisioner::new().with_latency(Duration::from_secs(5)),
            Arc::new(OsRngGenerator),
        );
        let id = ready_instance(&h, "1Gi").await;

        let orchestrator = h.orchestrator.clone();
        let target = id.clone();
        let resize = tokio::spawn(async move { orchestrator.resize(&target, resize_req("2Gi")).await });
        tokio::time::sleep(Duration::from_millis(100)).await;

        let err = h.orchestrator.delete(&id).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Conflict(_)));
        assert_eq!(h.orchestrator.get(&id).await.unwrap().status, InstanceStatus::Resizing);

        let resized = resize.await.unwrap().unwrap();
        assert_eq!(resized.status, InstanceStatus::Ready);
        assert!(h.provisioner.contains(&id));
        assert_eq!(h.store.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_unknown_leaves_store_unchanged() {
        let h = harness();
        let created = h.orchestrator.create(create_req("1Gi", "b")).await.unwrap();

        let err = h.orchestrator.delete(&TenantId::from("zzzzzz")).await.unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound(_)));
        assert_eq!(h.store.len(), 1);
        assert!(h.orchestrator.get(&created.record.id).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_then_get_is_not_found() {
        let h = harness();
        let id = ready_instance(&h, "1Gi").await;

        h.orchestrator.delete(&id).await.unwrap();
        assert!(matches!(h.orchestrator.get(&id).await, Err(LifecycleError::NotFound(_))));
        assert!(matches!(h.orchestrator.delete(&id).await, Err(LifecycleError::NotFound(_))));

        settle(&h).await;
        assert!(!h.provisioner.contains(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resize_grows_volume() {
        let h = harness();
        let id = ready_instance(&h, "2Gi").await;

        let record = h
            .orchestrator
            .resize(
                &id,
                ResizeRequest {
                    storage: "5Gi".into(),
                    bucket: Some("renamed".into()),
                },
            )
            .await
            .unwrap();

        assert_eq!(record.status, InstanceStatus::Ready);
        assert_eq!(record.quota.to_string(), "5Gi");
        assert_eq!(record.bucket, "renamed");
        assert_eq!(h.provisioner.quota_of(&id).unwrap().to_string(), "5Gi");
    }

    #[tokio::test(start_paused = true)]
    async fn test_resize_shrink_is_rejected_without_mutation() {
        let h = harness();
        let id = ready_instance(&h, "4Gi").await;
        let before = h.orchestrator.get(&id).await.unwrap();

        let err = h.orchestrator.resize(&id, resize_req("1Gi")).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Validation(ValidationError::QuotaShrink { .. })));
        assert_eq!(h.orchestrator.get(&id).await.unwrap(), before);
        assert_eq!(h.provisioner.resize_calls(), 0);

        // Same capacity, different spelling
        let same = h.orchestrator.resize(&id, resize_req("4096Mi")).await.unwrap();
        assert_eq!(same.status, InstanceStatus::Ready);
    }

    #[tokio::test]
    async fn test_resize_unknown_and_malformed() {
        let h = harness();
        let err = h.orchestrator.resize(&TenantId::from("zzzzzz"), resize_req("1Gi")).await.unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound(_)));

        let err = h.orchestrator.resize(&TenantId::from("zzzzzz"), resize_req("lots")).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Validation(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resize_requires_ready() {
        let h = harness_with(
            InMemoryProvisioner::new().with_latency(Duration::from_secs(5)),
            Arc::new(OsRngGenerator),
        );
        let created = h.orchestrator.create(create_req("1Gi", "b")).await.unwrap();

        let err = h.orchestrator.resize(&created.record.id, resize_req("2Gi")).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Conflict(_)));
        assert_eq!(
            h.orchestrator.get(&created.record.id).await.unwrap().quota.to_string(),
            "1Gi"
        );
        settle(&h).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_resize_marks_resizing_before_quota() {
        let store = Arc::new(JournalStore::default());
        let provisioner = Arc::new(InMemoryProvisioner::new());
        let orchestrator = assemble(
            store.clone(),
            provisioner.clone(),
            Arc::new(InMemoryStorageAdmin::new()),
            Arc::new(OsRngGenerator),
            fast_readiness(),
        );
        let id = orchestrator.create(create_req("1Gi", "b")).await.unwrap().record.id;
        assert!(orchestrator.shutdown(Duration::from_secs(60)).await);
        store.take_writes();

        orchestrator.resize(&id, resize_req("2Gi")).await.unwrap();
        assert_eq!(store.take_writes(), vec!["status resizing", "quota 2Gi", "status ready"]);

        // A failed quota write leaves the old quota and a Ready record
        store.refuse_quota.store(true, Ordering::SeqCst);
        let err = orchestrator.resize(&id, resize_req("3Gi")).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Store(StoreError::Corrupt { .. })));
        assert_eq!(store.take_writes(), vec!["status resizing", "status ready"]);

        let record = orchestrator.get(&id).await.unwrap();
        assert_eq!(record.status, InstanceStatus::Ready);
        assert_eq!(record.quota.to_string(), "2Gi");
        assert_eq!(provisioner.resize_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resize_failure_marks_error() {
        let h = harness();
        let id = ready_instance(&h, "1Gi").await;
        h.provisioner.fail_next_resize("volume expansion not supported");

        let record = h.orchestrator.resize(&id, resize_req("2Gi")).await.unwrap();
        assert_eq!(record.status, InstanceStatus::Error);
        assert!(record.reason.unwrap().contains("volume expansion not supported"));

        // Error only leaves through Delete
        let err = h.orchestrator.resize(&id, resize_req("3Gi")).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Conflict(_)));
        h.orchestrator.delete(&id).await.unwrap();
        settle(&h).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_resizes_serialize() {
        let h = harness_with(
            InMemoryProvisioner::new().with_latency(Duration::from_millis(200)),
            Arc::new(OsRngGenerator),
        );
        let id = ready_instance(&h, "1Gi").await;

        let (a, b) = tokio::join!(
            h.orchestrator.resize(&id, resize_req("2Gi")),
            h.orchestrator.resize(&id, resize_req("3Gi")),
        );

        // Whichever ran second saw the first one's result
        let outcomes = [a.is_ok(), b.is_ok()];
        assert!(outcomes.iter().any(|ok| *ok));
        for result in [&a, &b] {
            if let Err(e) = result {
                assert!(matches!(e, LifecycleError::Validation(ValidationError::QuotaShrink { .. })));
            }
        }

        let record = h.orchestrator.get(&id).await.unwrap();
        assert_eq!(record.status, InstanceStatus::Ready);
        assert_eq!(record.quota.to_string(), "3Gi");
        assert_eq!(h.provisioner.quota_of(&id).unwrap().to_string(), "3Gi");
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_in_creation_order() {
        let h = harness_with(
            InMemoryProvisioner::new(),
            Arc::new(ScriptedIds::new(&["aaaaaa", "bbbbbb", "cccccc"])),
        );
        for bucket in ["one", "two", "three"] {
            h.orchestrator.create(create_req("1Gi", bucket)).await.unwrap();
        }
        let buckets: Vec<_> = h.orchestrator.list().await.unwrap().into_iter().map(|r| r.bucket).collect();
        assert_eq!(buckets, vec!["one", "two", "three"]);
        settle(&h).await;
    }
}
