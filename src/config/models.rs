// src/config/models.rs
use crate::cache::MAX_REFRESH_PERIOD;
use crate::health::Importance;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub checks: Vec<CheckConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    #[serde(default = "default_health_path")]
    pub health_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            health_path: default_health_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
            path: default_metrics_path(),
        }
    }
}

/// One upstream HTTP probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckConfig {
    pub name: String,
    pub importance: Importance,
    pub url: Url,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Successful responses at or above this latency report `warn`.
    #[serde(default)]
    pub warn_latency_ms: Option<u64>,
    /// Probe in the background on this period instead of on every poll.
    #[serde(default)]
    pub refresh_secs: Option<u64>,
}

impl CheckConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn warn_latency(&self) -> Option<Duration> {
        self.warn_latency_ms.map(Duration::from_millis)
    }

    pub fn refresh_period(&self) -> Option<Duration> {
        self.refresh_secs.map(Duration::from_secs)
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if !self.server.health_path.starts_with('/') {
            bail!("server.health_path must start with '/': {}", self.server.health_path);
        }

        if self.metrics.enabled {
            if !self.metrics.path.starts_with('/') {
                bail!("metrics.path must start with '/': {}", self.metrics.path);
            }
            if self.metrics.port == self.server.listen_addr.port() {
                bail!(
                    "metrics.port {} collides with the health listener",
                    self.metrics.port
                );
            }
        }

        let mut names = HashSet::new();
        for check in &self.checks {
            if check.name.trim().is_empty() {
                bail!("check names must not be empty");
            }
            if !names.insert(check.name.as_str()) {
                bail!("duplicate check name: {}", check.name);
            }
            if check.timeout_ms == 0 {
                bail!("check {}: timeout_ms must be greater than zero", check.name);
            }
            if check.refresh_secs == Some(0) {
                bail!("check {}: refresh_secs must be greater than zero", check.name);
            }
            if let Some(secs) = check.refresh_secs {
                if secs > MAX_REFRESH_PERIOD.as_secs() {
                    bail!(
                        "check {}: refresh_secs ({}) exceeds the maximum of {}",
                        check.name,
                        secs,
                        MAX_REFRESH_PERIOD.as_secs()
                    );
                }
            }
            if let Some(warn_ms) = check.warn_latency_ms {
                if warn_ms >= check.timeout_ms {
                    bail!(
                        "check {}: warn_latency_ms ({}) must be below timeout_ms ({})",
                        check.name,
                        warn_ms,
                        check.timeout_ms
                    );
                }
            }
        }

        Ok(())
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9000))
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_timeout_ms() -> u64 {
    2000
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
server:
  listen_addr: "127.0.0.1:9100"
metrics:
  enabled: true
checks:
  - name: upstream
    importance: required
    url: "http://127.0.0.1:8001/health"
    refresh_secs: 5
  - name: search
    importance: optional
    url: "http://127.0.0.1:8002/ping"
    timeout_ms: 500
    warn_latency_ms: 200
"#;

    #[test]
    fn test_parse_with_defaults() {
        let config: Config = serde_yaml::from_str(SAMPLE).unwrap();
        config.validate().unwrap();

        assert_eq!(config.server.listen_addr.port(), 9100);
        assert_eq!(config.server.health_path, "/health");
        assert_eq!(config.metrics.port, 9090);
        assert_eq!(config.metrics.path, "/metrics");

        let upstream = &config.checks[0];
        assert_eq!(upstream.importance, Importance::Required);
        assert_eq!(upstream.timeout(), Duration::from_secs(2));
        assert_eq!(upstream.refresh_period(), Some(Duration::from_secs(5)));
        assert_eq!(upstream.warn_latency(), None);

        let search = &config.checks[1];
        assert_eq!(search.warn_latency(), Some(Duration::from_millis(200)));
        assert_eq!(search.refresh_period(), None);
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        config.validate().unwrap();
        assert!(config.checks.is_empty());
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let mut config: Config = serde_yaml::from_str(SAMPLE).unwrap();
        config.checks[1].name = "upstream".to_string();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate check name"));
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config: Config = serde_yaml::from_str(SAMPLE).unwrap();
        config.checks[0].refresh_secs = Some(0);
        assert!(config.validate().is_err());

        let mut config: Config = serde_yaml::from_str(SAMPLE).unwrap();
        config.checks[0].refresh_secs = Some(u64::MAX);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("exceeds the maximum"));

        let mut config: Config = serde_yaml::from_str(SAMPLE).unwrap();
        config.checks[0].refresh_secs = Some(MAX_REFRESH_PERIOD.as_secs());
        assert!(config.validate().is_ok());

        let mut config: Config = serde_yaml::from_str(SAMPLE).unwrap();
        config.checks[1].warn_latency_ms = Some(500);
        assert!(config.validate().is_err());

        let mut config: Config = serde_yaml::from_str(SAMPLE).unwrap();
        config.server.health_path = "health".to_string();
        assert!(config.validate().is_err());

        let mut config: Config = serde_yaml::from_str(SAMPLE).unwrap();
        config.metrics.port = 9100;
        assert!(config.validate().is_err());
    }
}
