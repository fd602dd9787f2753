// src/metrics/collector.rs
use crate::health::{HealthStatus, Verdict};
use anyhow::Result;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<MetricsCollector>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let collector = Arc::new(MetricsCollector::new(&registry)?);

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    /// Encode every registered metric in the Prometheus text format.
    pub fn gather(&self) -> Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }
}

pub struct MetricsCollector {
    // Per-check metrics
    pub check_results_total: IntCounterVec,
    pub check_duration_seconds: HistogramVec,
    pub check_status: IntGaugeVec,
    pub cache_refreshes_total: IntCounterVec,

    // Registry metrics
    pub refresh_loops_active: IntGauge,
    pub registered_checks: IntGauge,
    pub polls_total: IntCounterVec,
    pub overall_status: IntGauge,
}

impl MetricsCollector {
    pub fn new(registry: &Registry) -> Result<Self> {
        let check_results_total = IntCounterVec::new(
            Opts::new("hc_check_results_total", "Probe invocations by outcome"),
            &["check", "status"],
        )?;
        registry.register(Box::new(check_results_total.clone()))?;

        let check_duration_seconds = HistogramVec::new(
            HistogramOpts::new("hc_check_duration_seconds", "Probe duration in seconds"),
            &["check"],
        )?;
        registry.register(Box::new(check_duration_seconds.clone()))?;

        let check_status = IntGaugeVec::new(
            Opts::new(
                "hc_check_status",
                "Last observed check status (0=pass, 1=warn, 2=fail)",
            ),
            &["check"],
        )?;
        registry.register(Box::new(check_status.clone()))?;

        let cache_refreshes_total = IntCounterVec::new(
            Opts::new("hc_cache_refreshes_total", "Refresh cache updates"),
            &["check"],
        )?;
        registry.register(Box::new(cache_refreshes_total.clone()))?;

        let refresh_loops_active =
            IntGauge::new("hc_refresh_loops_active", "Running background refresh loops")?;
        registry.register(Box::new(refresh_loops_active.clone()))?;

        let registered_checks =
            IntGauge::new("hc_registered_checks", "Number of registered checks")?;
        registry.register(Box::new(registered_checks.clone()))?;

        let polls_total = IntCounterVec::new(
            Opts::new("hc_polls_total", "Aggregate polls by overall status"),
            &["status"],
        )?;
        registry.register(Box::new(polls_total.clone()))?;

        let overall_status = IntGauge::new(
            "hc_overall_status",
            "Last aggregate status (0=pass, 1=warn, 2=fail)",
        )?;
        registry.register(Box::new(overall_status.clone()))?;

        Ok(Self {
            check_results_total,
            check_duration_seconds,
            check_status,
            cache_refreshes_total,
            refresh_loops_active,
            registered_checks,
            polls_total,
            overall_status,
        })
    }

    pub fn record_check(&self, check: &str, status: HealthStatus, duration: Duration) {
        self.check_results_total
            .with_label_values(&[check, status.as_str()])
            .inc();

        self.check_duration_seconds
            .with_label_values(&[check])
            .observe(duration.as_secs_f64());

        self.check_status
            .with_label_values(&[check])
            .set(status.as_gauge());
    }

    pub fn record_cache_refresh(&self, check: &str) {
        self.cache_refreshes_total.with_label_values(&[check]).inc();
    }

    pub fn record_poll(&self, verdict: &Verdict) {
        self.polls_total
            .with_label_values(&[verdict.status.as_str()])
            .inc();
        self.overall_status.set(verdict.status.as_gauge());
    }

    pub fn update_registered_checks(&self, count: usize) {
        self.registered_checks.set(count as i64);
    }
}
