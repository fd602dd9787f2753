// src/probes/mod.rs
mod http;

pub use http::HttpProbe;

use crate::config::CheckConfig;
use crate::health::{Check, HealthChecker};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::debug;

/// Register one HTTP probe per configured check, attaching refresh
/// caches where a refresh period is set.
pub async fn register_http_checks(
    checker: &HealthChecker,
    configs: &[CheckConfig],
) -> Result<Vec<Arc<Check>>> {
    let mut checks = Vec::with_capacity(configs.len());

    for config in configs {
        let mut probe = HttpProbe::new(config.url.clone(), config.timeout())
            .with_context(|| format!("Failed to build HTTP client for check {}", config.name))?;
        if let Some(threshold) = config.warn_latency() {
            probe = probe.with_warn_latency(threshold);
        }
        debug!(check = %config.name, url = %probe.url(), "Configured HTTP probe");

        let check = checker
            .register_check(config.name.clone(), config.importance, probe)
            .await;

        if let Some(period) = config.refresh_period() {
            check
                .with_cache(period)
                .with_context(|| format!("Failed to attach cache to check {}", config.name))?;
        }

        checks.push(check);
    }

    Ok(checks)
}
