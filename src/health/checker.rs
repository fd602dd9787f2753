// src/health/checker.rs
use super::check::{Check, TimedProbe};
use super::probe::Probe;
use super::result::CheckResult;
use super::status::{HealthStatus, Importance};
use crate::cache::LoopTracker;
use crate::metrics::MetricsCollector;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Overall status plus the response code a transport should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub status: HealthStatus,
    pub code: u16,
}

impl Verdict {
    pub const PASS: Verdict = Verdict {
        status: HealthStatus::Pass,
        code: 200,
    };
    pub const WARN: Verdict = Verdict {
        status: HealthStatus::Warn,
        code: 429,
    };
    pub const FAIL: Verdict = Verdict {
        status: HealthStatus::Fail,
        code: 500,
    };

    /// Fold one check outcome into the running verdict.
    ///
    /// A `Fail` from a `Required` check is terminal. A `Warn` from any
    /// check escalates unless the verdict already failed. Failures of
    /// optional and info checks leave the verdict unchanged.
    pub fn fold(self, importance: Importance, status: HealthStatus) -> Verdict {
        match (status, importance) {
            (HealthStatus::Fail, Importance::Required) => Verdict::FAIL,
            (HealthStatus::Warn, _) if self.status != HealthStatus::Fail => Verdict::WARN,
            _ => self,
        }
    }
}

impl Default for Verdict {
    fn default() -> Self {
        Verdict::PASS
    }
}

/// Fold a sequence of outcomes, left to right, starting from `Pass`/200.
pub fn aggregate<I>(outcomes: I) -> Verdict
where
    I: IntoIterator<Item = (Importance, HealthStatus)>,
{
    outcomes
        .into_iter()
        .fold(Verdict::PASS, |verdict, (importance, status)| {
            verdict.fold(importance, status)
        })
}

/// Aggregate verdict of one poll with every component result, in
/// registration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    pub status: HealthStatus,
    pub status_code: u16,
    pub components: Vec<CheckResult>,
}

impl HealthCheckResponse {
    pub fn verdict(&self) -> Verdict {
        Verdict {
            status: self.status,
            code: self.status_code,
        }
    }
}

/// Registry of checks. Construct once at startup and share it.
pub struct HealthChecker {
    checks: RwLock<Vec<Arc<Check>>>,
    loops: LoopTracker,
    metrics: Option<Arc<MetricsCollector>>,
}

impl HealthChecker {
    pub fn new() -> Self {
        Self {
            checks: RwLock::new(Vec::new()),
            loops: LoopTracker::new(),
            metrics: None,
        }
    }

    pub fn with_metrics(metrics: Arc<MetricsCollector>) -> Self {
        Self {
            checks: RwLock::new(Vec::new()),
            loops: LoopTracker::with_gauge(metrics.refresh_loops_active.clone()),
            metrics: Some(metrics),
        }
    }

    /// Register a probe under `name` and return its handle, so callers
    /// can attach a refresh cache to it.
    pub async fn register_check(
        &self,
        name: impl Into<String>,
        importance: Importance,
        probe: impl Probe + 'static,
    ) -> Arc<Check> {
        let probe = TimedProbe::new(name, Arc::new(probe)).with_metrics(self.metrics.clone());
        let check = Arc::new(Check::from_parts(probe, importance, self.loops.clone()));

        let mut checks = self.checks.write().await;
        if checks.iter().any(|existing| existing.name() == check.name()) {
            warn!("Health check {} registered more than once", check.name());
        }
        checks.push(check.clone());

        if let Some(metrics) = &self.metrics {
            metrics.update_registered_checks(checks.len());
        }

        info!(
            "Registered {} health check: {}",
            importance,
            check.name()
        );

        check
    }

    /// Run every check in registration order and fold the outcomes.
    ///
    /// Uncached checks are probed inline, so their latency adds up here.
    pub async fn perform_checks(&self) -> HealthCheckResponse {
        let checks = self.checks().await;

        let mut verdict = Verdict::PASS;
        let mut components = Vec::with_capacity(checks.len());

        for check in &checks {
            let result = check.get_status().await;
            verdict = verdict.fold(check.importance(), result.status);
            components.push(result);
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_poll(&verdict);
        }

        let failing = components.iter().filter(|result| !result.is_pass()).count();
        match verdict.status {
            HealthStatus::Pass => debug!(
                "Health check complete: pass ({} checks, {} not passing)",
                components.len(),
                failing
            ),
            HealthStatus::Warn => info!(
                "Health check complete: warn ({} of {} checks not passing)",
                failing,
                components.len()
            ),
            HealthStatus::Fail => warn!(
                "Health check complete: fail ({} of {} checks not passing)",
                failing,
                components.len()
            ),
        }

        HealthCheckResponse {
            status: verdict.status,
            status_code: verdict.code,
            components,
        }
    }

    /// Snapshot of the registered checks, in registration order.
    pub async fn checks(&self) -> Vec<Arc<Check>> {
        self.checks.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.checks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.checks.read().await.is_empty()
    }

    /// Background refresh loops currently alive across all checks.
    pub fn active_refresh_loops(&self) -> usize {
        self.loops.active()
    }

    /// Stop every attached refresh cache and wait for the loops to exit.
    pub async fn stop_all_caches(&self) {
        for check in self.checks().await {
            check.shutdown_cache().await;
        }
        info!("Stopped all refresh caches");
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}
