//! Tenant endpoint readiness

use crate::{ConfigureError, ConfigureResult};
use async_trait::async_trait;
use std::time::Duration;

/// Liveness path served by every MinIO server
pub const HEALTH_PATH: &str = "/minio/health/live";

/// One readiness check of a tenant endpoint
#[async_trait]
pub trait ReadinessCheck: Send + Sync {
    async fn check(&self, endpoint: &str) -> ConfigureResult<()>;
}

/// HTTPS GET against the MinIO liveness path
///
/// Connection refusals, TLS failures (certificate not issued yet) and non-2xx
/// answers all count as "not ready yet".
#[derive(Debug, Clone)]
pub struct HttpReadiness {
    client: reqwest::Client,
}

impl HttpReadiness {
    pub fn new(timeout: Duration) -> ConfigureResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ConfigureError::Spawn(format!("http client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ReadinessCheck for HttpReadiness {
    async fn check(&self, endpoint: &str) -> ConfigureResult<()> {
        let url = format!("{}{}", endpoint.trim_end_matches('/'), HEALTH_PATH);
        let unreachable = |message: String| ConfigureError::Unreachable {
            endpoint: endpoint.to_string(),
            message,
        };

        let response = self.client.get(&url).send().await.map_err(|e| unreachable(e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(unreachable(format!("HTTP {}", response.status())))
        }
    }
}
