//! Background workflow supervision

use fleet_common::TenantId;
use fleet_store::{RecordStore, StoreError};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// Runs tenant workflows detached from the request that started them.
///
/// A workflow that panics leaves its tenant in `Error` instead of stuck in
/// a transitional status. In-flight workflows are counted so shutdown can
/// wait for them.
#[derive(Clone)]
pub struct WorkflowSupervisor {
    store: Arc<dyn RecordStore>,
    in_flight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl WorkflowSupervisor {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            in_flight: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(Notify::new()),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Spawn `workflow` for tenant `id`.
    pub fn spawn<F>(&self, id: TenantId, workflow: &'static str, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let this = self.clone();

        tokio::spawn(async move {
            match tokio::spawn(fut).await {
                Ok(()) => debug!(tenant = %id, workflow, "workflow finished"),
                Err(e) if e.is_panic() => {
                    error!(tenant = %id, workflow, "workflow panicked");
                    let reason = format!("internal error: {} workflow aborted", workflow);
                    match this.store.mark_failed(&id, &reason).await {
                        Ok(()) | Err(StoreError::NotFound(_)) => {}
                        Err(e) => warn!(tenant = %id, error = %e, "could not record workflow failure"),
                    }
                }
                Err(e) => warn!(tenant = %id, workflow, error = %e, "workflow cancelled"),
            }

            if this.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
                this.idle.notify_waiters();
            }
        });
    }

    /// Wait up to `grace` for every workflow to finish.
    ///
    /// Returns `false` if some were still running when time ran out.
    pub async fn drain(&self, grace: Duration) -> bool {
        let deadline = Instant::now() + grace;
        loop {
            let idle = self.idle.notified();
            if self.in_flight() == 0 {
                return true;
            }
            if tokio::time::timeout_at(deadline, idle).await.is_err() {
                return self.in_flight() == 0;
            }
        }
    }
}
