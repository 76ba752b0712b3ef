use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::info;

/// Pipeline counters for observability
#[derive(Debug, Default)]
pub struct Metrics {
    /// Lifecycle passes currently executing
    in_flight: AtomicUsize,
    /// Highest `in_flight` observed
    peak_in_flight: AtomicUsize,
    /// Orders accepted by the admission gate
    pub orders_admitted: AtomicU64,
    /// Admissions collapsed onto an existing job
    pub orders_deduplicated: AtomicU64,
    /// Lifecycle passes started
    pub passes_started: AtomicU64,
    /// Passes that reached confirmed
    pub orders_confirmed: AtomicU64,
    /// Passes that emitted failed
    pub attempts_failed: AtomicU64,
    /// Failures the queue scheduled for another pass
    pub retries_scheduled: AtomicU64,
    /// Jobs moved to terminal failure
    pub jobs_exhausted: AtomicU64,
}

/// Point-in-time copy of [`Metrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub in_flight: usize,
    pub peak_in_flight: usize,
    pub orders_admitted: u64,
    pub orders_deduplicated: u64,
    pub passes_started: u64,
    pub orders_confirmed: u64,
    pub attempts_failed: u64,
    pub retries_scheduled: u64,
    pub jobs_exhausted: u64,
}

/// Decrements the in-flight gauge when the pass ends, however it ends
pub struct InFlightGuard<'a> {
    metrics: &'a Metrics,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.metrics.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Metrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a lifecycle pass as started
    pub fn enter_pass(&self) -> InFlightGuard<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        self.passes_started.fetch_add(1, Ordering::Relaxed);
        InFlightGuard { metrics: self }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn inc_admitted(&self, deduplicated: bool) {
        if deduplicated {
            self.orders_deduplicated.fetch_add(1, Ordering::Relaxed);
        } else {
            self.orders_admitted.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn inc_confirmed(&self) {
        self.orders_confirmed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failed(&self) {
        self.attempts_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_retry_scheduled(&self) {
        self.retries_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_exhausted(&self) {
        self.jobs_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            in_flight: self.in_flight(),
            peak_in_flight: self.peak_in_flight(),
            orders_admitted: self.orders_admitted.load(Ordering::Relaxed),
            orders_deduplicated: self.orders_deduplicated.load(Ordering::Relaxed),
            passes_started: self.passes_started.load(Ordering::Relaxed),
            orders_confirmed: self.orders_confirmed.load(Ordering::Relaxed),
            attempts_failed: self.attempts_failed.load(Ordering::Relaxed),
            retries_scheduled: self.retries_scheduled.load(Ordering::Relaxed),
            jobs_exhausted: self.jobs_exhausted.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format
    pub fn prometheus(&self) -> String {
        let s = self.snapshot();
        format!(
            r#"# HELP dexflow_in_flight Lifecycle passes currently executing
# TYPE dexflow_in_flight gauge
dexflow_in_flight {}

# HELP dexflow_peak_in_flight Highest concurrent lifecycle passes observed
# TYPE dexflow_peak_in_flight gauge
dexflow_peak_in_flight {}

# HELP dexflow_orders_admitted_total Orders accepted at admission
# TYPE dexflow_orders_admitted_total counter
dexflow_orders_admitted_total {}

# HELP dexflow_orders_deduplicated_total Duplicate admissions absorbed
# TYPE dexflow_orders_deduplicated_total counter
dexflow_orders_deduplicated_total {}

# HELP dexflow_passes_started_total Lifecycle passes started
# TYPE dexflow_passes_started_total counter
dexflow_passes_started_total {}

# HELP dexflow_orders_confirmed_total Orders confirmed
# TYPE dexflow_orders_confirmed_total counter
dexflow_orders_confirmed_total {}

# HELP dexflow_attempts_failed_total Lifecycle passes that failed
# TYPE dexflow_attempts_failed_total counter
dexflow_attempts_failed_total {}

# HELP dexflow_retries_scheduled_total Retries scheduled with backoff
# TYPE dexflow_retries_scheduled_total counter
dexflow_retries_scheduled_total {}

# HELP dexflow_jobs_exhausted_total Jobs failed after exhausting attempts
# TYPE dexflow_jobs_exhausted_total counter
dexflow_jobs_exhausted_total {}
"#,
            s.in_flight,
            s.peak_in_flight,
            s.orders_admitted,
            s.orders_deduplicated,
            s.passes_started,
            s.orders_confirmed,
            s.attempts_failed,
            s.retries_scheduled,
            s.jobs_exhausted,
        )
    }

    /// Log periodic status
    pub fn log_status(&self) {
        let s = self.snapshot();
        info!(
            "Pipeline: in_flight={} peak={} confirmed={} failed={} retries={} exhausted={}",
            s.in_flight,
            s.peak_in_flight,
            s.orders_confirmed,
            s.attempts_failed,
            s.retries_scheduled,
            s.jobs_exhausted
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_flight_guard_tracks_peak() {
        let m = Metrics::new();
        {
            let _a = m.enter_pass();
            let _b = m.enter_pass();
            assert_eq!(m.in_flight(), 2);
        }
        let _c = m.enter_pass();
        assert_eq!(m.in_flight(), 1);
        assert_eq!(m.peak_in_flight(), 2);
        assert_eq!(m.snapshot().passes_started, 3);
    }

    #[test]
    fn test_prometheus_export() {
        let m = Metrics::new();
        m.inc_confirmed();
        m.inc_admitted(true);
        let text = m.prometheus();
        assert!(text.contains("dexflow_orders_confirmed_total 1"));
        assert!(text.contains("dexflow_orders_deduplicated_total 1"));
        assert!(text.contains("dexflow_orders_admitted_total 0"));
    }
}
