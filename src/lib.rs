// src/lib.rs
pub mod cache;
pub mod config;
pub mod health;
pub mod metrics;
pub mod probes;
pub mod server;

pub use cache::{CacheError, LoopTracker, RefreshCache};
pub use health::{
    aggregate, probe_fn, Check, CheckResult, HealthCheckResponse, HealthChecker, HealthStatus,
    Importance, Probe, ProbeOutcome, Verdict,
};
