//! Fleet configuration
//!
//! Loaded from an optional JSON file, then overridden by environment
//! variables. Every field has a default so a bare environment still boots.

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Which collaborators back the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Kubernetes + MinIO admin CLI + sqlite
    Kube,
    /// Everything in process (local development)
    Memory,
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// HTTP listen address
    pub listen_addr: String,
    /// Shared secret expected in `X-API-KEY`
    pub api_key: Option<String>,
    /// CORS origin; unset means no cross-origin access
    pub allowed_origin: Option<String>,
    /// Tenants are served at `{id}.{base_domain}`
    pub base_domain: String,
    pub backend: Backend,
    /// sqlx connection string for the record store
    pub database_url: String,
    pub kube: KubeSettings,
    pub admin: AdminSettings,
    pub lifecycle: LifecycleSettings,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            api_key: None,
            allowed_origin: None,
            base_domain: "example.com".into(),
            backend: Backend::Kube,
            database_url: "sqlite://assets/db.sqlite?mode=rwc".into(),
            kube: KubeSettings::default(),
            admin: AdminSettings::default(),
            lifecycle: LifecycleSettings::default(),
        }
    }
}

/// Cluster-side settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KubeSettings {
    pub namespace: String,
    pub cluster_issuer: String,
    pub storage_class: String,
    pub minio_image: String,
    pub ingress_class: String,
    /// Explicit kubeconfig; otherwise in-cluster / `~/.kube/config`
    pub kubeconfig: Option<PathBuf>,
    pub call_timeout_secs: u64,
    pub retry: RetryPolicy,
}

impl Default for KubeSettings {
    fn default() -> Self {
        Self {
            namespace: "miniomatic".into(),
            cluster_issuer: "letsencrypt-prod".into(),
            storage_class: "standard".into(),
            minio_image: "minio/minio:latest".into(),
            ingress_class: "nginx".into(),
            kubeconfig: None,
            call_timeout_secs: 15,
            retry: RetryPolicy::default(),
        }
    }
}

impl KubeSettings {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

/// MinIO admin settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminSettings {
    /// MinIO client binary
    pub mc_path: String,
    pub bucket_region: String,
    /// Policy attached to every scoped user
    pub policy: String,
    pub call_timeout_secs: u64,
    /// Waiting for the endpoint to come up behind TLS
    pub readiness: RetryPolicy,
    pub retry: RetryPolicy,
}

impl Default for AdminSettings {
    fn default() -> Self {
        Self {
            mc_path: "mc".into(),
            bucket_region: "eu-north-1".into(),
            policy: "readwrite".into(),
            call_timeout_secs: 30,
            readiness: RetryPolicy::new(40, Duration::from_secs(2), Duration::from_secs(30)),
            retry: RetryPolicy::new(4, Duration::from_secs(1), Duration::from_secs(8)),
        }
    }
}

impl AdminSettings {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

/// Orchestrator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleSettings {
    /// How long a resize waits for another operation on the same tenant
    pub lock_wait_secs: u64,
    /// Id regenerations before Create gives up
    pub id_attempts: u32,
    /// Grace period for background workflows on shutdown
    pub shutdown_grace_secs: u64,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            lock_wait_secs: 30,
            id_attempts: 8,
            shutdown_grace_secs: 30,
        }
    }
}

impl LifecycleSettings {
    pub fn lock_wait(&self) -> Duration {
        Duration::from_secs(self.lock_wait_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl FleetConfig {
    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// File at `CONFIG_PATH` (if any) plus process environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("CONFIG_PATH") {
            Ok(path) => Self::load(&path).unwrap_or_else(|e| {
                warn!(error = %e, "config file unusable, using defaults");
                Self::default()
            }),
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("LISTEN_ADDR") {
            self.listen_addr = v;
        }
        if let Some(v) = get("API_KEY") {
            self.api_key = Some(v);
        }
        if let Some(v) = get("ALLOWED_ORIGIN") {
            self.allowed_origin = Some(v);
        }
        if let Some(v) = get("WILDCARD_DOMAIN") {
            self.base_domain = v;
        }
        if let Some(v) = get("DATABASE_URL") {
            self.database_url = v;
        }
        if let Some(v) = get("CLUSTER_ISSUER") {
            self.kube.cluster_issuer = v;
        }
        if let Some(v) = get("STORAGE_CLASS") {
            self.kube.storage_class = v;
        }
        if let Some(v) = get("KUBE_NAMESPACE") {
            self.kube.namespace = v;
        }
        if let Some(v) = get("KUBECONFIG_FILE") {
            self.kube.kubeconfig = Some(PathBuf::from(v));
        }
        if let Some(v) = get("MC_PATH") {
            self.admin.mc_path = v;
        }
        match get("FLEET_BACKEND").as_deref() {
            Some("memory") => self.backend = Backend::Memory,
            Some("kube") => self.backend = Backend::Kube,
            Some(other) => warn!(backend = other, "unknown FLEET_BACKEND, keeping configured backend"),
            None => {}
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_domain.trim_matches('.').is_empty() {
            return Err(ConfigError::Invalid("base domain must not be empty".into()));
        }
        if self.kube.namespace.is_empty() {
            return Err(ConfigError::Invalid("namespace must not be empty".into()));
        }
        if self.lifecycle.id_attempts == 0 {
            return Err(ConfigError::Invalid("id_attempts must be at least 1".into()));
        }
        Ok(())
    }
}
