//! Service lifecycle: state machine, stop signalling, and in-flight
//! handler tracking.
//!
//! State lives in an `ArcSwap` so every dispatch loop can read it without
//! locking; the drain count is an atomic owned by RAII guards, which keeps
//! it correct through handler panics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::watch;

/// Service instance state.
///
/// State machine: Starting -> Running -> Stopping -> Stopped. The only way
/// into `Stopping` is an explicit `stop()`; errors never transition state
/// at runtime (partial registration fails construction instead).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// Endpoints are being subscribed; no messages dispatched yet.
    Starting,
    /// All endpoints subscribed; dispatching.
    Running,
    /// Draining in-flight handlers; new messages are rejected.
    Stopping,
    /// Fully stopped; any handler still executing is abandoned.
    Stopped,
}

/// Coordinates stop across the dispatch loops:
/// 1. loops select on `stop_receiver()` alongside their subscriptions
/// 2. `trigger_stop()` moves to `Stopping` and signals every loop
/// 3. `wait_for_drain()` blocks until in-flight handlers complete
#[derive(Debug)]
pub struct LifecycleController {
    stop_signal: watch::Sender<bool>,
    in_flight: Arc<AtomicU64>,
    state: Arc<ArcSwap<ServiceState>>,
}

impl LifecycleController {
    /// Creates a controller in the `Starting` state.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            stop_signal: tx,
            in_flight: Arc::new(AtomicU64::new(0)),
            state: Arc::new(ArcSwap::from_pointee(ServiceState::Starting)),
        }
    }

    /// Transitions to `Running` once every endpoint is subscribed.
    pub fn set_running(&self) {
        self.state.store(Arc::new(ServiceState::Running));
    }

    /// Returns a receiver notified when stop is triggered.
    #[must_use]
    pub fn stop_receiver(&self) -> watch::Receiver<bool> {
        self.stop_signal.subscribe()
    }

    /// Initiates stop: transitions to `Stopping` and signals the loops.
    pub fn trigger_stop(&self) {
        self.state.store(Arc::new(ServiceState::Stopping));
        // A send error just means every loop already exited
        let _ = self.stop_signal.send(true);
    }

    /// Marks the service fully stopped. Called after the drain window ends,
    /// whether or not every handler finished.
    pub fn mark_stopped(&self) {
        self.state.store(Arc::new(ServiceState::Stopped));
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ServiceState {
        **self.state.load()
    }

    /// Creates an RAII guard tracking one in-flight handler invocation.
    ///
    /// The counter decrements on drop, even through a panic unwind.
    #[must_use]
    pub fn in_flight_guard(&self) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    /// Number of handler invocations currently executing.
    #[must_use]
    pub fn in_flight_count(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Waits up to `grace` for in-flight handlers to finish.
    ///
    /// Returns `true` if everything drained. Returns `false` on expiry; the
    /// caller proceeds to `mark_stopped()` regardless and late handlers are
    /// abandoned, their eventual results discarded.
    pub async fn wait_for_drain(&self, grace: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + grace;

        loop {
            if self.in_flight.load(Ordering::Relaxed) == 0 {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            // Guards drop from arbitrary tasks, so there is nothing to
            // await on directly; a short sleep keeps the check cheap.
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Default for LifecycleController {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks one in-flight handler invocation for the drain count.
///
/// Dropping it releases the slot, whether the handler returned or unwound.
#[derive(Debug)]
pub struct InFlightGuard {
    in_flight: Arc<AtomicU64>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
