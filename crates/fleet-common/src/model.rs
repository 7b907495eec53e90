//! Instance record model

use crate::quota::Quota;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tenant identifier
///
/// Short lowercase alphanumeric label; doubles as the DNS label of the
/// tenant's public endpoint and as the prefix of every cluster object name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id is usable as a DNS label prefix.
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty()
            && self.0.len() <= 32
            && self.0.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
    }
}

impl From<String> for TenantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Provisioning,
    Resizing,
    Ready,
    Error,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provisioning => "provisioning",
            Self::Resizing => "resizing",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "provisioning" => Ok(Self::Provisioning),
            "resizing" => Ok(Self::Resizing),
            "ready" => Ok(Self::Ready),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown instance status '{}'", other)),
        }
    }
}

/// Persistent tenant record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub id: TenantId,
    pub status: InstanceStatus,
    pub created_at: DateTime<Utc>,
    pub bucket: String,
    pub url: String,
    pub quota: Quota,
    /// Failure reason while `status == Error`
    pub reason: Option<String>,
}

impl InstanceRecord {
    /// New record in `Provisioning`, URL derived from the base domain.
    pub fn provisioning(id: TenantId, bucket: impl Into<String>, quota: Quota, base_domain: &str) -> Self {
        let url = crate::public_url(&id, base_domain);
        Self {
            id,
            status: InstanceStatus::Provisioning,
            created_at: Utc::now(),
            bucket: bucket.into(),
            url,
            quota,
            reason: None,
        }
    }
}

/// Root administrator credentials of one tenant.
///
/// Never persisted and never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct RootCredentials {
    pub user: String,
    pub password: String,
}

impl fmt::Debug for RootCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootCredentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Scoped access key handed to the caller exactly once.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessKeyPair {
    pub access_key: String,
    pub secret_key: String,
}

impl fmt::Debug for AccessKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessKeyPair")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [
            InstanceStatus::Provisioning,
            InstanceStatus::Resizing,
            InstanceStatus::Ready,
            InstanceStatus::Error,
        ] {
            assert_eq!(status.as_str().parse::<InstanceStatus>(), Ok(status));
        }
        assert!("deleted".parse::<InstanceStatus>().is_err());
        assert_eq!(serde_json::to_string(&InstanceStatus::Ready).unwrap(), "\"ready\"");
    }

    #[test]
    fn test_provisioning_record() {
        let quota = Quota::parse("5Gi").unwrap();
        let record = InstanceRecord::provisioning(TenantId::from("x1y2z3"), "team-a", quota, "example.com");
        assert_eq!(record.status, InstanceStatus::Provisioning);
        assert_eq!(record.url, "https://x1y2z3.example.com");
        assert!(record.reason.is_none());
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let creds = RootCredentials { user: "root".into(), password: "hunter2hunter2".into() };
        let keys = AccessKeyPair { access_key: "AK".into(), secret_key: "topsecret".into() };
        assert!(!format!("{:?}", creds).contains("hunter2"));
        assert!(!format!("{:?}", keys).contains("topsecret"));
    }

    #[test]
    fn test_tenant_id_shape() {
        assert!(TenantId::from("abc123").is_well_formed());
        assert!(!TenantId::from("ABC123").is_well_formed());
        assert!(!TenantId::from("").is_well_formed());
        assert!(!TenantId::from("a.b").is_well_formed());
    }
}
