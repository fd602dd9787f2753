// src/health/status.rs
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a single probe, and of the aggregate verdict.
///
/// Variants are declared in escalation order so the derived `Ord`
/// gives `Fail > Warn > Pass`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Pass,
    Warn,
    Fail,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Pass => "pass",
            HealthStatus::Warn => "warn",
            HealthStatus::Fail => "fail",
        }
    }

    /// Gauge encoding used by the metrics collector.
    pub fn as_gauge(&self) -> i64 {
        match self {
            HealthStatus::Pass => 0,
            HealthStatus::Warn => 1,
            HealthStatus::Fail => 2,
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Escalation tier of a registered check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    /// A failure takes the whole service down.
    Required,
    /// May fail without affecting availability.
    Optional,
    /// Reported for operators only.
    Info,
}

impl fmt::Display for Importance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Importance::Required => "required",
            Importance::Optional => "optional",
            Importance::Info => "info",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_order() {
        assert!(HealthStatus::Fail > HealthStatus::Warn);
        assert!(HealthStatus::Warn > HealthStatus::Pass);
        assert_eq!(
            [HealthStatus::Warn, HealthStatus::Fail, HealthStatus::Pass]
                .into_iter()
                .max(),
            Some(HealthStatus::Fail)
        );
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(serde_json::to_string(&HealthStatus::Warn).unwrap(), "\"warn\"");
        assert_eq!(serde_json::to_string(&Importance::Required).unwrap(), "\"required\"");

        let importance: Importance = serde_yaml::from_str("optional").unwrap();
        assert_eq!(importance, Importance::Optional);
        assert_eq!(HealthStatus::Fail.to_string(), "fail");
    }
}
