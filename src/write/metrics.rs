use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Real-time counters for a write run.
///
/// The executor updates these while writes are in flight; callers can snapshot them at any time.
#[derive(Debug)]
pub struct WriteMetrics {
    run_id: AtomicU64,
    elapsed_ns: AtomicU64,

    attempted: AtomicU64,
    written: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,

    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl WriteMetrics {
    pub fn new() -> Self {
        Self {
            run_id: AtomicU64::new(0),
            elapsed_ns: AtomicU64::new(0),
            attempted: AtomicU64::new(0),
            written: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn begin_run(&self) {
        let _ = self.run_id.fetch_add(1, Ordering::SeqCst);
        self.elapsed_ns.store(0, Ordering::SeqCst);
        self.attempted.store(0, Ordering::SeqCst);
        self.written.store(0, Ordering::SeqCst);
        self.rejected.store(0, Ordering::SeqCst);
        self.failed.store(0, Ordering::SeqCst);
        self.in_flight.store(0, Ordering::SeqCst);
        self.max_in_flight.store(0, Ordering::SeqCst);
    }

    pub fn end_run(&self, elapsed: Duration) {
        self.elapsed_ns
            .store(elapsed.as_nanos().min(u64::MAX as u128) as u64, Ordering::SeqCst);
    }

    pub fn on_write_start(&self, items: usize) {
        let _ = self.attempted.fetch_add(items as u64, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        update_max_usize(&self.max_in_flight, now);
    }

    pub fn on_write_end(&self) {
        let _ = self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn on_written(&self, items: usize) {
        let _ = self.written.fetch_add(items as u64, Ordering::SeqCst);
    }

    pub fn on_rejected(&self, items: usize) {
        let _ = self.rejected.fetch_add(items as u64, Ordering::SeqCst);
    }

    pub fn on_failed(&self, items: usize) {
        let _ = self.failed.fetch_add(items as u64, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> WriteMetricsSnapshot {
        let elapsed_ns = self.elapsed_ns.load(Ordering::SeqCst);
        WriteMetricsSnapshot {
            run_id: self.run_id.load(Ordering::SeqCst),
            elapsed: (elapsed_ns > 0).then(|| Duration::from_nanos(elapsed_ns)),
            attempted: self.attempted.load(Ordering::SeqCst),
            written: self.written.load(Ordering::SeqCst),
            rejected: self.rejected.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            max_in_flight: self.max_in_flight.load(Ordering::SeqCst),
        }
    }
}

impl Default for WriteMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn update_max_usize(dst: &AtomicUsize, now: usize) {
    let _ = dst.fetch_max(now, Ordering::SeqCst);
}

/// Immutable snapshot of [`WriteMetrics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteMetricsSnapshot {
    pub run_id: u64,
    pub elapsed: Option<Duration>,
    /// Items submitted to the store.
    pub attempted: u64,
    pub written: u64,
    /// Items whose condition was false.
    pub rejected: u64,
    /// Items whose write failed for any other reason.
    pub failed: u64,
    pub max_in_flight: usize,
}

impl fmt::Display for WriteMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run_id={}, attempted={}, written={}, rejected={}, failed={}, max_in_flight={}, elapsed={:?}",
            self.run_id,
            self.attempted,
            self.written,
            self.rejected,
            self.failed,
            self.max_in_flight,
            self.elapsed
        )
    }
}
