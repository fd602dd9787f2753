// src/health/check.rs
use super::probe::{Probe, ProbeOutcome};
use super::result::CheckResult;
use super::status::{HealthStatus, Importance};
use crate::cache::{CacheError, LoopTracker, RefreshCache};
use crate::metrics::MetricsCollector;
use arc_swap::ArcSwapOption;
use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// A probe bound to a check name, producing timestamped results.
///
/// The observation timestamp is taken immediately before the probe is
/// invoked, so it reads "observed as of this instant" no matter how long
/// the probe then takes.
pub struct TimedProbe {
    name: String,
    probe: Arc<dyn Probe>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl TimedProbe {
    pub fn new(name: impl Into<String>, probe: Arc<dyn Probe>) -> Self {
        Self {
            name: name.into(),
            probe,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Option<Arc<MetricsCollector>>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn metrics(&self) -> Option<&Arc<MetricsCollector>> {
        self.metrics.as_ref()
    }

    /// Invoke the probe once and wrap its outcome.
    ///
    /// A panic inside the probe is reported as a `Fail` result.
    pub async fn perform(&self) -> CheckResult {
        let observed_at = Utc::now();
        let start = Instant::now();

        let outcome = match AssertUnwindSafe(self.probe.probe()).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(check = %self.name, "Probe panicked: {}", message);
                ProbeOutcome::fail(format!("probe panicked: {}", message))
            }
        };

        let duration = start.elapsed();

        if let Some(metrics) = &self.metrics {
            metrics.record_check(&self.name, outcome.status, duration);
        }

        if outcome.status != HealthStatus::Pass {
            debug!(
                check = %self.name,
                status = %outcome.status,
                "Probe reported {:?}",
                outcome.error
            );
        }

        CheckResult {
            name: self.name.clone(),
            status: outcome.status,
            observed_at,
            output: outcome.error,
            duration_ms: duration.as_millis() as u64,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// A registered check: identity, importance tier and an optional
/// background refresh cache.
pub struct Check {
    importance: Importance,
    probe: Arc<TimedProbe>,
    cache: ArcSwapOption<RefreshCache>,
    loops: LoopTracker,
}

impl std::fmt::Debug for Check {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Check")
            .field("name", &self.name())
            .field("importance", &self.importance)
            .finish_non_exhaustive()
    }
}

impl Check {
    pub fn new(name: impl Into<String>, importance: Importance, probe: impl Probe + 'static) -> Self {
        let probe = TimedProbe::new(name, Arc::new(probe));
        Self::from_parts(probe, importance, LoopTracker::new())
    }

    pub(crate) fn from_parts(probe: TimedProbe, importance: Importance, loops: LoopTracker) -> Self {
        Self {
            importance,
            probe: Arc::new(probe),
            cache: ArcSwapOption::empty(),
            loops,
        }
    }

    pub fn name(&self) -> &str {
        self.probe.name()
    }

    pub fn importance(&self) -> Importance {
        self.importance
    }

    /// Invoke the probe directly, bypassing any cache.
    pub async fn perform(&self) -> CheckResult {
        self.probe.perform().await
    }

    /// Current result: read through the cache when one is attached,
    /// otherwise probe synchronously.
    pub async fn get_status(&self) -> CheckResult {
        match self.cache.load_full() {
            Some(cache) => cache.read().await,
            None => self.perform().await,
        }
    }

    /// Attach a refresh cache that re-probes once every `period`.
    ///
    /// The first scheduled refresh happens one full period after attaching.
    /// Until then the first read probes synchronously and fills the cache.
    /// Attaching again replaces the previous cache and stops its loop.
    pub fn with_cache(&self, period: Duration) -> Result<&Self, CacheError> {
        let cache = RefreshCache::new(self.probe.clone(), period, self.loops.clone())?;
        cache.start()?;

        if let Some(previous) = self.cache.swap(Some(Arc::new(cache))) {
            previous.stop();
            debug!(check = %self.name(), "Replaced existing refresh cache");
        }

        info!(check = %self.name(), "Attached refresh cache with period {:?}", period);
        Ok(self)
    }

    /// Stop the background refresh. Reads keep returning the last value.
    pub fn stop_cache(&self) {
        if let Some(cache) = self.cache.load_full() {
            cache.stop();
        }
    }

    /// Stop the background refresh and wait for the loop to exit.
    pub async fn shutdown_cache(&self) {
        if let Some(cache) = self.cache.load_full() {
            cache.shutdown().await;
        }
    }

    /// Refresh the cached value now, or just probe when uncached.
    pub async fn force_refresh(&self) -> CheckResult {
        match self.cache.load_full() {
            Some(cache) => cache.force_refresh().await,
            None => self.perform().await,
        }
    }

    pub fn is_cached(&self) -> bool {
        self.cache.load().is_some()
    }

    pub fn cache(&self) -> Option<Arc<RefreshCache>> {
        self.cache.load_full()
    }
}
