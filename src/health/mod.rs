// src/health/mod.rs
mod check;
mod checker;
mod probe;
mod result;
mod status;

pub use check::{Check, TimedProbe};
pub use checker::{aggregate, HealthCheckResponse, HealthChecker, Verdict};
pub use probe::{probe_fn, FnProbe, Probe, ProbeOutcome};
pub use result::CheckResult;
pub use status::{HealthStatus, Importance};
