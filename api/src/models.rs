//! API Models

use chrono::{DateTime, Utc};
use fleet_common::InstanceRecord;
use fleet_orchestrator::CreatedInstance;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Error body
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

/// Create request
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateInstance {
    /// Volume size, e.g. `10Gi`
    #[schema(example = "10Gi")]
    pub storage: String,
    /// Initial bucket
    #[schema(example = "mybucket")]
    pub bucket: String,
}

/// Resize request
#[derive(Debug, Deserialize, ToSchema)]
pub struct ResizeInstance {
    #[schema(example = "20Gi")]
    pub storage: String,
    /// Replaces the recorded bucket name when present and non-empty
    #[serde(default)]
    pub bucket: Option<String>,
}

/// Stored instance as returned by the API
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InstanceView {
    pub status: String,
    pub date: DateTime<Utc>,
    pub id: String,
    pub initbucket: String,
    pub url: String,
    pub storage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<InstanceRecord> for InstanceView {
    fn from(record: InstanceRecord) -> Self {
        Self {
            status: record.status.to_string(),
            date: record.created_at,
            id: record.id.to_string(),
            initbucket: record.bucket,
            url: record.url,
            storage: record.quota.to_string(),
            reason: record.reason,
        }
    }
}

/// Accepted create; the only time the secret key is shown
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreatedView {
    pub status: String,
    pub id: String,
    pub storage: String,
    pub bucket: String,
    pub url: String,
    pub accesskey: String,
    pub secretkey: String,
}

impl From<CreatedInstance> for CreatedView {
    fn from(created: CreatedInstance) -> Self {
        let record = created.record;
        Self {
            status: record.status.to_string(),
            id: record.id.to_string(),
            storage: record.quota.to_string(),
            bucket: record.bucket,
            url: record.url,
            accesskey: created.keys.access_key,
            secretkey: created.keys.secret_key,
        }
    }
}

/// Accepted delete
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeletedView {
    #[schema(example = "deletion in progress")]
    pub status: String,
}

impl DeletedView {
    pub fn in_progress() -> Self {
        Self {
            status: "deletion in progress".into(),
        }
    }
}
