//! Collaborator wiring for each backend

use anyhow::Context;
use fleet_admin::{HttpReadiness, InMemoryStorageAdmin, InstanceConfigurator, McAdmin};
use fleet_common::{Backend, FleetConfig, OsRngGenerator};
use fleet_kube::{InMemoryProvisioner, KubeProvisioner};
use fleet_orchestrator::{LifecycleDeps, LifecycleOrchestrator};
use fleet_store::{InMemoryRecordStore, SqliteRecordStore};
use std::sync::Arc;
use tracing::info;

/// Build the orchestrator for the configured backend.
pub async fn build_orchestrator(config: &FleetConfig) -> anyhow::Result<LifecycleOrchestrator> {
    match config.backend {
        Backend::Kube => cluster(config).await,
        Backend::Memory => Ok(in_memory(config)),
    }
}

async fn cluster(config: &FleetConfig) -> anyhow::Result<LifecycleOrchestrator> {
    let store = SqliteRecordStore::connect(&config.database_url)
        .await
        .with_context(|| format!("opening record store {}", config.database_url))?;
    let provisioner = KubeProvisioner::connect(&config.kube, &config.base_domain)
        .await
        .context("connecting to kubernetes")?;
    let readiness = HttpReadiness::new(config.admin.call_timeout()).context("building readiness client")?;
    let configurator = InstanceConfigurator::new(
        Arc::new(McAdmin::new(&config.admin)),
        Arc::new(readiness),
        config.admin.clone(),
        config.base_domain.clone(),
    );

    info!(
        namespace = %config.kube.namespace,
        domain = %config.base_domain,
        "kubernetes backend ready"
    );

    Ok(LifecycleOrchestrator::new(
        LifecycleDeps {
            store: Arc::new(store),
            provisioner: Arc::new(provisioner),
            configurator: Arc::new(configurator),
            ids: Arc::new(OsRngGenerator),
        },
        config.lifecycle.clone(),
        config.base_domain.clone(),
    ))
}

/// Everything in process; nothing survives a restart.
pub fn in_memory(config: &FleetConfig) -> LifecycleOrchestrator {
    let admin = Arc::new(InMemoryStorageAdmin::new());
    let configurator = InstanceConfigurator::new(
        admin.clone(),
        admin,
        config.admin.clone(),
        config.base_domain.clone(),
    );

    info!("in-memory backend ready");

    LifecycleOrchestrator::new(
        LifecycleDeps {
            store: Arc::new(InMemoryRecordStore::new()),
            provisioner: Arc::new(InMemoryProvisioner::new()),
            configurator: Arc::new(configurator),
            ids: Arc::new(OsRngGenerator),
        },
        config.lifecycle.clone(),
        config.base_domain.clone(),
    )
}
