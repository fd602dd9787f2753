// src/health/probe.rs
use super::status::HealthStatus;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// What a probe reports: a status plus optional diagnostic text.
///
/// The status is authoritative. `error` is carried through to the
/// result as output and never changes how the check is aggregated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub status: HealthStatus,
    pub error: Option<String>,
}

impl ProbeOutcome {
    pub fn new(status: HealthStatus, error: Option<String>) -> Self {
        Self { status, error }
    }

    pub fn pass() -> Self {
        Self::new(HealthStatus::Pass, None)
    }

    pub fn warn(error: impl Into<String>) -> Self {
        Self::new(HealthStatus::Warn, Some(error.into()))
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self::new(HealthStatus::Fail, Some(error.into()))
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

impl From<HealthStatus> for ProbeOutcome {
    fn from(status: HealthStatus) -> Self {
        Self::new(status, None)
    }
}

/// A user supplied health probe.
///
/// Must be callable any number of times and must not assume it runs
/// on a particular schedule.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self) -> ProbeOutcome;
}

#[async_trait]
impl<P> Probe for Arc<P>
where
    P: Probe + ?Sized,
{
    async fn probe(&self) -> ProbeOutcome {
        (**self).probe().await
    }
}

/// Probe backed by an async closure. Built with [`probe_fn`].
pub struct FnProbe<F> {
    f: F,
}

/// Adapt an async closure into a [`Probe`].
pub fn probe_fn<F, Fut>(f: F) -> FnProbe<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = ProbeOutcome> + Send,
{
    FnProbe { f }
}

#[async_trait]
impl<F, Fut> Probe for FnProbe<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = ProbeOutcome> + Send,
{
    async fn probe(&self) -> ProbeOutcome {
        (self.f)().await
    }
}
