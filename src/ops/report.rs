use crate::ops::probe::CheckResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregated readiness report served to the ops dashboard
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpsStatusReport {
    /// Primary dependency healthy and every required service healthy
    pub ok: bool,
    /// At least one configured service is failing
    pub degraded: bool,
    #[serde(rename = "self")]
    pub self_status: SelfStatus,
    pub dependency: DependencyStatus,
    /// One entry per configured check, in configuration order
    pub services: Vec<CheckResult>,
}

/// Facts about the answering process itself
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfStatus {
    pub ok: bool,
    pub uptime_seconds: u64,
    pub process_id: u32,
    pub host_label: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_identifier: Option<String>,
}

/// Result of the primary datastore check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyStatus {
    pub name: String,
    pub ok: bool,
    pub latency_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<CheckResult> for DependencyStatus {
    fn from(result: CheckResult) -> Self {
        Self {
            name: result.name,
            ok: result.ok,
            latency_ms: result.latency_ms,
            error: result.error,
        }
    }
}
