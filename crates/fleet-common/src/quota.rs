//! Storage quota
//!
//! A quota is an integer with a binary suffix (`Ki`, `Mi`, `Gi`). Only that
//! shape is accepted at the API boundary; the same string is handed to the
//! volume claim verbatim.

use crate::error::ValidationError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::OnceLock;

fn quota_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^([0-9]+)(Ki|Mi|Gi)$").expect("static quota pattern"))
}

/// Binary unit suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuotaUnit {
    Ki,
    Mi,
    Gi,
}

impl QuotaUnit {
    fn multiplier(&self) -> u64 {
        match self {
            Self::Ki => 1 << 10,
            Self::Mi => 1 << 20,
            Self::Gi => 1 << 30,
        }
    }

    fn suffix(&self) -> &'static str {
        match self {
            Self::Ki => "Ki",
            Self::Mi => "Mi",
            Self::Gi => "Gi",
        }
    }
}

/// Requested volume capacity
///
/// Keeps the caller's spelling so `007Gi` is echoed back as given; equality
/// and ordering compare capacity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Quota {
    amount: u64,
    unit: QuotaUnit,
    raw: String,
}

impl Quota {
    /// Parse and validate a quota string.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let caps = quota_pattern()
            .captures(raw)
            .ok_or_else(|| ValidationError::QuotaFormat(raw.to_string()))?;

        let unit = match &caps[2] {
            "Ki" => QuotaUnit::Ki,
            "Mi" => QuotaUnit::Mi,
            _ => QuotaUnit::Gi,
        };
        let amount: u64 = caps[1]
            .parse()
            .map_err(|_| ValidationError::QuotaRange(raw.to_string()))?;

        // Kubernetes quantities are signed 64-bit internally
        amount
            .checked_mul(unit.multiplier())
            .filter(|bytes| *bytes <= i64::MAX as u64)
            .ok_or_else(|| ValidationError::QuotaRange(raw.to_string()))?;

        Ok(Self { amount, unit, raw: raw.to_string() })
    }

    /// Capacity in bytes
    pub fn bytes(&self) -> u64 {
        self.amount * self.unit.multiplier()
    }

    pub fn unit(&self) -> QuotaUnit {
        self.unit
    }

    /// Same capacity spelled without leading zeros
    pub fn normalized(&self) -> String {
        format!("{}{}", self.amount, self.unit.suffix())
    }
}

impl PartialEq for Quota {
    fn eq(&self, other: &Self) -> bool {
        self.bytes() == other.bytes()
    }
}

impl Eq for Quota {}

impl Hash for Quota {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes().hash(state);
    }
}

impl PartialOrd for Quota {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Quota {
    fn cmp(&self, other: &Self) -> Ordering {
        self.bytes().cmp(&other.bytes())
    }
}

impl fmt::Display for Quota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for Quota {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Quota {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Quota> for String {
    fn from(q: Quota) -> Self {
        q.to_string()
    }
}
