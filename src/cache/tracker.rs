// src/cache/tracker.rs
use prometheus::IntGauge;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Counts live background refresh loops.
///
/// Each loop holds a [`LoopGuard`] for as long as its task runs, so the
/// count drops back as soon as a loop exits, however it exits.
#[derive(Clone, Default)]
pub struct LoopTracker {
    active: Arc<AtomicUsize>,
    gauge: Option<IntGauge>,
}

impl LoopTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirror the count into a Prometheus gauge.
    pub fn with_gauge(gauge: IntGauge) -> Self {
        Self {
            active: Arc::new(AtomicUsize::new(0)),
            gauge: Some(gauge),
        }
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub(crate) fn enter(&self) -> LoopGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        if let Some(gauge) = &self.gauge {
            gauge.inc();
        }
        LoopGuard {
            tracker: self.clone(),
        }
    }
}

pub(crate) struct LoopGuard {
    tracker: LoopTracker,
}

impl Drop for LoopGuard {
    fn drop(&mut self) {
        self.tracker.active.fetch_sub(1, Ordering::SeqCst);
        if let Some(gauge) = &self.tracker.gauge {
            gauge.dec();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_counts() {
        let gauge = IntGauge::new("loops", "loops").unwrap();
        let tracker = LoopTracker::with_gauge(gauge.clone());

        let first = tracker.enter();
        let second = tracker.clone().enter();
        assert_eq!(tracker.active(), 2);
        assert_eq!(gauge.get(), 2);

        drop(first);
        drop(second);
        assert_eq!(tracker.active(), 0);
        assert_eq!(gauge.get(), 0);
    }
}
