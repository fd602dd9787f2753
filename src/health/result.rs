// src/health/result.rs
use super::status::HealthStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One observation of a check.
///
/// Produced fresh by every probe invocation. A cached result is handed
/// out verbatim until the next refresh replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub status: HealthStatus,
    /// Taken immediately before the probe was invoked.
    #[serde(rename = "observation_ts")]
    pub observed_at: DateTime<Utc>,
    /// Diagnostic text reported by the probe, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    pub duration_ms: u64,
}

impl CheckResult {
    pub fn is_pass(&self) -> bool {
        self.status == HealthStatus::Pass
    }
}
