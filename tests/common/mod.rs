//! Common test utilities and helpers

use std::sync::atomic::{AtomicUsize, Ordering};

/// Tracks how many work items run at the same time.
#[derive(Default)]
pub struct ConcurrencyMeter {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a work item as running until the returned guard is dropped.
    pub fn enter(&self) -> MeterGuard<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        MeterGuard { meter: self }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

pub struct MeterGuard<'a> {
    meter: &'a ConcurrencyMeter,
}

impl Drop for MeterGuard<'_> {
    fn drop(&mut self) {
        self.meter.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Busy a worker long enough for other workers to overlap with it.
pub fn short_pause() {
    std::thread::sleep(std::time::Duration::from_millis(5));
}
