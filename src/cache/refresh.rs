// src/cache/refresh.rs
use super::tracker::{LoopGuard, LoopTracker};
use crate::health::{CheckResult, TimedProbe};
use arc_swap::ArcSwapOption;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

/// Longest refresh period a cache accepts.
pub const MAX_REFRESH_PERIOD: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Refresh period must be greater than zero")]
    InvalidPeriod,

    #[error("Refresh period {0:?} exceeds the maximum of {max:?}", max = MAX_REFRESH_PERIOD)]
    PeriodTooLong(Duration),

    #[error("Refresh cache requires a running tokio runtime")]
    NoRuntime,

    #[error("Refresh cache has been stopped")]
    Stopped,
}

/// Periodically re-invokes a probe and keeps the latest result.
///
/// The slot holds an immutable snapshot that is swapped whole, so
/// readers never wait on an in-flight refresh and never see a partial
/// result. No refresh happens at start; the loop first fires one full
/// period later.
pub struct RefreshCache {
    period: Duration,
    probe: Arc<TimedProbe>,
    slot: Arc<ArcSwapOption<CheckResult>>,
    // Serializes the synchronous fallback when the slot is still empty.
    fill: tokio::sync::Mutex<()>,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
    tracker: LoopTracker,
}

impl RefreshCache {
    pub fn new(
        probe: Arc<TimedProbe>,
        period: Duration,
        tracker: LoopTracker,
    ) -> Result<Self, CacheError> {
        if period.is_zero() {
            return Err(CacheError::InvalidPeriod);
        }
        if period > MAX_REFRESH_PERIOD {
            return Err(CacheError::PeriodTooLong(period));
        }

        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            period,
            probe,
            slot: Arc::new(ArcSwapOption::empty()),
            fill: tokio::sync::Mutex::new(()),
            shutdown_tx,
            task: Mutex::new(None),
            tracker,
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Spawn the background refresh loop on the current runtime.
    ///
    /// Starting an already running cache is a no-op.
    pub fn start(&self) -> Result<(), CacheError> {
        if *self.shutdown_tx.borrow() {
            return Err(CacheError::Stopped);
        }

        let runtime = Handle::try_current().map_err(|_| CacheError::NoRuntime)?;

        let mut task = self.lock_task();
        if task.is_some() {
            debug!(check = %self.probe.name(), "Refresh loop already running");
            return Ok(());
        }

        let refresher = Refresher {
            probe: self.probe.clone(),
            slot: self.slot.clone(),
            period: self.period,
            shutdown_rx: self.shutdown_tx.subscribe(),
            _guard: self.tracker.enter(),
        };
        *task = Some(runtime.spawn(refresher.run()));

        Ok(())
    }

    /// The latest result, probing synchronously once if nothing is cached yet.
    pub async fn read(&self) -> CheckResult {
        if let Some(result) = self.slot.load_full() {
            return (*result).clone();
        }

        let _fill = self.fill.lock().await;
        if let Some(result) = self.slot.load_full() {
            return (*result).clone();
        }

        debug!(check = %self.probe.name(), "Cache empty, probing synchronously");
        (*refresh(&self.probe, &self.slot).await).clone()
    }

    /// The cached result without any fallback.
    pub fn cached(&self) -> Option<CheckResult> {
        self.slot.load_full().map(|result| (*result).clone())
    }

    /// Probe now and overwrite the cached value.
    pub async fn force_refresh(&self) -> CheckResult {
        (*refresh(&self.probe, &self.slot).await).clone()
    }

    /// Signal the refresh loop to exit. Safe to call any number of times,
    /// including before `start`.
    pub fn stop(&self) {
        let already_stopped = self.shutdown_tx.send_replace(true);
        if !already_stopped {
            debug!(check = %self.probe.name(), "Stopping refresh cache");
        }
    }

    /// Stop the loop and wait until its task has exited.
    pub async fn shutdown(&self) {
        self.stop();

        let handle = self.lock_task().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    error!(check = %self.probe.name(), "Refresh loop ended abnormally: {}", e);
                }
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock_task()
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }

    fn lock_task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for RefreshCache {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn refresh(probe: &TimedProbe, slot: &ArcSwapOption<CheckResult>) -> Arc<CheckResult> {
    let result = Arc::new(probe.perform().await);
    slot.store(Some(result.clone()));

    if let Some(metrics) = probe.metrics() {
        metrics.record_cache_refresh(probe.name());
    }

    result
}

struct Refresher {
    probe: Arc<TimedProbe>,
    slot: Arc<ArcSwapOption<CheckResult>>,
    period: Duration,
    shutdown_rx: watch::Receiver<bool>,
    _guard: LoopGuard,
}

impl Refresher {
    async fn run(mut self) {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            check = %self.probe.name(),
            "Starting refresh loop with period {:?}",
            self.period
        );

        loop {
            if *self.shutdown_rx.borrow_and_update() {
                break;
            }

            tokio::select! {
                biased;
                changed = self.shutdown_rx.changed() => {
                    // Sender gone means the cache itself was dropped.
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let result = refresh(&self.probe, &self.slot).await;
                    debug!(
                        check = %self.probe.name(),
                        status = %result.status,
                        "Refreshed cached result"
                    );
                }
            }
        }

        info!(check = %self.probe.name(), "Refresh loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{probe_fn, HealthStatus, Probe, ProbeOutcome};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct PanickingProbe;

    #[async_trait]
    impl Probe for PanickingProbe {
        async fn probe(&self) -> ProbeOutcome {
            panic!("refresh exploded")
        }
    }

    fn counting_probe(
        status: Arc<Mutex<HealthStatus>>,
        calls: Arc<AtomicU32>,
        delay: Duration,
    ) -> Arc<TimedProbe> {
        let probe = probe_fn(move || {
            let status = status.clone();
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let current = *status.lock().unwrap();
                ProbeOutcome::from(current)
            }
        });
        Arc::new(TimedProbe::new("cached", Arc::new(probe)))
    }

    fn new_cache(period: Duration) -> (RefreshCache, Arc<Mutex<HealthStatus>>, Arc<AtomicU32>) {
        let status = Arc::new(Mutex::new(HealthStatus::Pass));
        let calls = Arc::new(AtomicU32::new(0));
        let probe = counting_probe(status.clone(), calls.clone(), Duration::ZERO);
        let cache = RefreshCache::new(probe, period, LoopTracker::new()).unwrap();
        (cache, status, calls)
    }

    #[tokio::test]
    async fn test_miss_probes_exactly_once() {
        let (cache, _, calls) = new_cache(Duration::from_secs(60));
        cache.start().unwrap();

        assert!(cache.cached().is_none());
        assert_eq!(cache.read().await.status, HealthStatus::Pass);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.read().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.cached().is_some());

        cache.shutdown().await;
    }

    #[tokio::test]
    async fn test_no_refresh_before_first_period() {
        let (cache, _, calls) = new_cache(Duration::from_secs(60));
        cache.start().unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(cache.cached().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        cache.shutdown().await;
    }

    #[tokio::test]
    async fn test_refreshes_after_period() {
        let (cache, status, _) = new_cache(Duration::from_millis(100));
        cache.start().unwrap();

        assert_eq!(cache.read().await.status, HealthStatus::Pass);

        *status.lock().unwrap() = HealthStatus::Fail;
        assert_eq!(cache.read().await.status, HealthStatus::Pass);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(cache.read().await.status, HealthStatus::Fail);

        cache.shutdown().await;
    }

    #[tokio::test]
    async fn test_force_refresh_overwrites() {
        let (cache, status, calls) = new_cache(Duration::from_secs(60));
        cache.start().unwrap();

        cache.read().await;
        *status.lock().unwrap() = HealthStatus::Warn;

        assert_eq!(cache.force_refresh().await.status, HealthStatus::Warn);
        assert_eq!(cache.read().await.status, HealthStatus::Warn);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        cache.shutdown().await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_keeps_stale_value() {
        let tracker = LoopTracker::new();
        let status = Arc::new(Mutex::new(HealthStatus::Pass));
        let probe = counting_probe(status.clone(), Arc::new(AtomicU32::new(0)), Duration::ZERO);
        let cache = RefreshCache::new(probe, Duration::from_millis(50), tracker.clone()).unwrap();

        cache.start().unwrap();
        assert_eq!(tracker.active(), 1);
        assert!(cache.is_running());
        assert_eq!(cache.read().await.status, HealthStatus::Pass);

        cache.stop();
        cache.stop();
        cache.shutdown().await;
        cache.shutdown().await;

        assert_eq!(tracker.active(), 0);
        assert!(!cache.is_running());

        *status.lock().unwrap() = HealthStatus::Fail;
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(cache.read().await.status, HealthStatus::Pass);
    }

    #[tokio::test]
    async fn test_stop_before_start() {
        let tracker = LoopTracker::new();
        let probe = counting_probe(
            Arc::new(Mutex::new(HealthStatus::Pass)),
            Arc::new(AtomicU32::new(0)),
            Duration::ZERO,
        );
        let cache = RefreshCache::new(probe, Duration::from_secs(1), tracker.clone()).unwrap();

        cache.stop();
        cache.stop();
        cache.shutdown().await;

        assert!(matches!(cache.start(), Err(CacheError::Stopped)));
        assert_eq!(tracker.active(), 0);
        // Reads still work without a loop.
        assert_eq!(cache.read().await.status, HealthStatus::Pass);
    }

    #[tokio::test]
    async fn test_zero_period_rejected() {
        let probe = counting_probe(
            Arc::new(Mutex::new(HealthStatus::Pass)),
            Arc::new(AtomicU32::new(0)),
            Duration::ZERO,
        );
        let result = RefreshCache::new(probe, Duration::ZERO, LoopTracker::new());
        assert!(matches!(result, Err(CacheError::InvalidPeriod)));
    }

    #[tokio::test]
    async fn test_oversized_period_rejected() {
        let tracker = LoopTracker::new();
        let probe = counting_probe(
            Arc::new(Mutex::new(HealthStatus::Pass)),
            Arc::new(AtomicU32::new(0)),
            Duration::ZERO,
        );

        let result = RefreshCache::new(probe.clone(), Duration::from_secs(u64::MAX), tracker.clone());
        assert!(matches!(result, Err(CacheError::PeriodTooLong(_))));

        let cache = RefreshCache::new(probe, MAX_REFRESH_PERIOD, tracker.clone()).unwrap();
        cache.start().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(tracker.active(), 1);
        assert!(cache.is_running());

        cache.shutdown().await;
        assert_eq!(tracker.active(), 0);
    }

    #[test]
    fn test_start_requires_runtime() {
        let (cache, _, _) = new_cache(Duration::from_secs(1));
        assert!(matches!(cache.start(), Err(CacheError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_panicking_probe_keeps_loop_alive() {
        let probe = Arc::new(TimedProbe::new("explodes", Arc::new(PanickingProbe)));
        let cache = RefreshCache::new(probe, Duration::from_millis(50), LoopTracker::new()).unwrap();
        cache.start().unwrap();

        tokio::time::sleep(Duration::from_millis(180)).await;

        let cached = cache.cached().expect("loop should have refreshed");
        assert_eq!(cached.status, HealthStatus::Fail);
        assert_eq!(cached.output.as_deref(), Some("probe panicked: refresh exploded"));
        assert!(cache.is_running());

        cache.shutdown().await;
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_probe() {
        let calls = Arc::new(AtomicU32::new(0));
        let probe = counting_probe(
            Arc::new(Mutex::new(HealthStatus::Pass)),
            calls.clone(),
            Duration::from_millis(50),
        );
        let cache = RefreshCache::new(probe, Duration::from_secs(60), LoopTracker::new()).unwrap();

        let reads = (0..8).map(|_| cache.read());
        let results = futures::future::join_all(reads).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[tokio::test]
    async fn test_drop_ends_loop() {
        let tracker = LoopTracker::new();
        {
            let probe = counting_probe(
                Arc::new(Mutex::new(HealthStatus::Pass)),
                Arc::new(AtomicU32::new(0)),
                Duration::ZERO,
            );
            let cache = RefreshCache::new(probe, Duration::from_millis(20), tracker.clone()).unwrap();
            cache.start().unwrap();
            assert_eq!(tracker.active(), 1);
        }

        for _ in 0..50 {
            if tracker.active() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(tracker.active(), 0);
    }
}
