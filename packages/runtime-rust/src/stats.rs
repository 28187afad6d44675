//! Per-endpoint dispatch counters for introspection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Live counters for one endpoint. Updated lock-free by the stats layer.
#[derive(Debug, Default)]
pub struct EndpointStats {
    num_requests: AtomicU64,
    num_errors: AtomicU64,
    processing_time_micros: AtomicU64,
}

impl EndpointStats {
    /// Records one completed dispatch.
    pub fn record(&self, elapsed: Duration, errored: bool) {
        self.num_requests.fetch_add(1, Ordering::Relaxed);
        if errored {
            self.num_errors.fetch_add(1, Ordering::Relaxed);
        }
        #[allow(clippy::cast_possible_truncation)]
        let micros = elapsed.as_micros() as u64;
        self.processing_time_micros.fetch_add(micros, Ordering::Relaxed);
    }

    /// Takes a consistent-enough snapshot for `info()` reporting.
    #[must_use]
    pub fn snapshot(&self) -> EndpointStatsSnapshot {
        let num_requests = self.num_requests.load(Ordering::Relaxed);
        let num_errors = self.num_errors.load(Ordering::Relaxed);
        let processing_time =
            Duration::from_micros(self.processing_time_micros.load(Ordering::Relaxed));
        let average_processing_time = if num_requests == 0 {
            Duration::ZERO
        } else {
            #[allow(clippy::cast_possible_truncation)]
            let avg = (processing_time.as_micros() / u128::from(num_requests)) as u64;
            Duration::from_micros(avg)
        };
        EndpointStatsSnapshot {
            num_requests,
            num_errors,
            processing_time,
            average_processing_time,
        }
    }
}

/// Point-in-time copy of an endpoint's counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointStatsSnapshot {
    /// Requests dispatched to the handler (including failures).
    pub num_requests: u64,
    /// Dispatches that produced an error envelope.
    pub num_errors: u64,
    /// Cumulative handler processing time.
    pub processing_time: Duration,
    /// `processing_time / num_requests`, zero when idle.
    pub average_processing_time: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_stats_are_zero() {
        let stats = EndpointStats::default();
        let snap = stats.snapshot();
        assert_eq!(snap.num_requests, 0);
        assert_eq!(snap.num_errors, 0);
        assert_eq!(snap.average_processing_time, Duration::ZERO);
    }

    #[test]
    fn record_accumulates_and_averages() {
        let stats = EndpointStats::default();
        stats.record(Duration::from_millis(10), false);
        stats.record(Duration::from_millis(30), true);

        let snap = stats.snapshot();
        assert_eq!(snap.num_requests, 2);
        assert_eq!(snap.num_errors, 1);
        assert_eq!(snap.processing_time, Duration::from_millis(40));
        assert_eq!(snap.average_processing_time, Duration::from_millis(20));
    }
}
