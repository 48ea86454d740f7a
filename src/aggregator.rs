//! Rolling aggregator: bounded history plus derived statistics.
//!
//! The aggregator owns a fixed-capacity [`Ringbuffer`] of samples and
//! republishes an immutable [`EngineSnapshot`] after every mutation. A single
//! writer (the stream client) inserts; any number of readers call
//! [`RollingAggregator::snapshot`] or hold a receiver from
//! [`RollingAggregator::subscribe`].
//!
//! Inserts and connection-state changes both go through the watch channel's
//! write lock, so a reader never observes a history that disagrees with its
//! aggregates.

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::ringbuffer::Ringbuffer;
use crate::sample::Sample;
use crate::snapshot::{
    Aggregates, ConnectionState, EngineSnapshot, HistoryPoint, MissingMemoryPolicy,
};

/// Default history capacity (points kept for the dashboard charts).
pub const DEFAULT_HISTORY_CAPACITY: usize = 10;

pub struct RollingAggregator {
    window: Mutex<Ringbuffer<Sample>>,
    policy: MissingMemoryPolicy,
    published: watch::Sender<Arc<EngineSnapshot>>,
}

impl RollingAggregator {
    /// Creates an empty aggregator keeping at most `capacity` samples.
    pub fn new(capacity: usize, policy: MissingMemoryPolicy) -> Self {
        let (published, _) = watch::channel(Arc::new(EngineSnapshot::empty()));
        let window = Ringbuffer::new(capacity);
        debug!(
            capacity = window.capacity(),
            ?policy,
            "rolling aggregator initialized"
        );
        Self {
            window: Mutex::new(window),
            policy,
            published,
        }
    }

    pub fn capacity(&self) -> usize {
        self.lock_window().capacity()
    }

    pub fn policy(&self) -> MissingMemoryPolicy {
        self.policy
    }

    /// Number of samples currently in the window.
    pub fn len(&self) -> usize {
        self.lock_window().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_window().is_empty()
    }

    /// Inserts a sample, evicting the oldest one at capacity, then publishes
    /// the recomputed `(history, aggregates)` pair.
    pub fn insert(&self, sample: Sample) {
        let mut window = self.lock_window();
        let evicted = window.push(sample);
        debug_assert!(
            window.len() <= window.capacity(),
            "history window exceeded its capacity"
        );

        let history: Vec<HistoryPoint> = window
            .iter()
            .map(|s| HistoryPoint::from_sample(s, self.policy))
            .collect();
        let aggregates = Aggregates::compute(window.iter(), self.policy);

        trace!(
            len = window.len(),
            evicted = evicted.is_some(),
            max_cpu = ?aggregates.max_cpu,
            avg_cpu = ?aggregates.avg_cpu,
            "sample inserted"
        );

        // Published while the window lock is still held so concurrent
        // inserts publish in the same order they mutated the window.
        self.published.send_modify(|snapshot| {
            *snapshot = Arc::new(EngineSnapshot {
                connection_state: snapshot.connection_state,
                history,
                aggregates,
            });
        });
    }

    /// Returns the current published state.
    pub fn snapshot(&self) -> Arc<EngineSnapshot> {
        self.published.borrow().clone()
    }

    /// Returns a receiver notified on every published change.
    pub fn subscribe(&self) -> watch::Receiver<Arc<EngineSnapshot>> {
        self.published.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.published.borrow().connection_state
    }

    /// Applies a connection-state transition.
    ///
    /// Returns `true` if the published state changed. Re-entering the current
    /// state is a silent no-op; illegal transitions (anything leaving
    /// `Closed`) are rejected with a warning.
    pub fn set_connection_state(&self, next: ConnectionState) -> bool {
        self.published.send_if_modified(|snapshot| {
            let current = snapshot.connection_state;
            if current == next {
                return false;
            }
            if !current.can_transition_to(next) {
                warn!(%current, %next, "rejected connection state transition");
                return false;
            }
            debug!(from = %current, to = %next, "connection state changed");
            let mut updated = EngineSnapshot::clone(snapshot);
            updated.connection_state = next;
            *snapshot = Arc::new(updated);
            true
        })
    }

    /// Raw samples in the window, oldest first.
    pub fn samples(&self) -> Vec<Sample> {
        self.lock_window().get_history()
    }

    fn lock_window(&self) -> MutexGuard<'_, Ringbuffer<Sample>> {
        // A panic while holding the lock cannot leave the ringbuffer half-written.
        self.window.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for RollingAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY, MissingMemoryPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::SampleClock;

    const TOLERANCE: f64 = 1e-9;

    fn cpu_sample(clock: &SampleClock, cpu: f64) -> Sample {
        Sample::decode(
            &format!(
                r#"{{"total_cpu_usage": {cpu}, "mem_info": {{"mem_total": 1000, "mem_free": 500}}}}"#
            ),
            clock,
        )
        .unwrap()
    }

    fn cpu_values(snapshot: &EngineSnapshot) -> Vec<f64> {
        snapshot
            .history
            .iter()
            .map(|p| p.cpu_usage_percent)
            .collect()
    }

    #[test]
    fn test_first_insert_initializes_aggregates() {
        let clock = SampleClock::new();
        let agg = RollingAggregator::new(5, MissingMemoryPolicy::TreatAsZero);
        agg.insert(cpu_sample(&clock, 42.0));

        let snap = agg.snapshot();
        assert_eq!(snap.aggregates.max_cpu, Some(42.0));
        assert_eq!(snap.aggregates.avg_cpu, Some(42.0));
        assert_eq!(snap.aggregates.sample_count, 1);
    }

    #[test]
    fn test_eviction_keeps_last_n_in_order() {
        let clock = SampleClock::new();
        let agg = RollingAggregator::new(2, MissingMemoryPolicy::TreatAsZero);
        for cpu in [10.0, 20.0, 30.0] {
            agg.insert(cpu_sample(&clock, cpu));
        }

        let snap = agg.snapshot();
        assert_eq!(cpu_values(&snap), vec![20.0, 30.0]);
        assert!((snap.aggregates.max_cpu.unwrap() - 30.0).abs() < TOLERANCE);
        assert!((snap.aggregates.avg_cpu.unwrap() - 25.0).abs() < TOLERANCE);
    }

    #[test]
    fn test_published_aggregates_match_recomputation() {
        let clock = SampleClock::new();
        let agg = RollingAggregator::new(4, MissingMemoryPolicy::TreatAsZero);
        for cpu in [3.5, 99.0, 12.25, 0.0, 150.0, -2.0, 47.0] {
            agg.insert(cpu_sample(&clock, cpu));
            let snap = agg.snapshot();
            let recomputed = Aggregates::compute(&agg.samples(), agg.policy());
            assert_eq!(snap.aggregates, recomputed);
            assert!(snap.history.len() <= agg.capacity());
        }
    }

    #[test]
    fn test_connection_state_does_not_touch_history() {
        let clock = SampleClock::new();
        let agg = RollingAggregator::default();
        assert!(agg.set_connection_state(ConnectionState::Open));
        agg.insert(cpu_sample(&clock, 1.0));
        assert!(agg.set_connection_state(ConnectionState::Errored));

        let snap = agg.snapshot();
        assert_eq!(snap.connection_state, ConnectionState::Errored);
        assert_eq!(snap.history.len(), 1);
    }

    #[test]
    fn test_insert_keeps_connection_state() {
        let clock = SampleClock::new();
        let agg = RollingAggregator::default();
        agg.set_connection_state(ConnectionState::Open);
        agg.insert(cpu_sample(&clock, 1.0));
        assert_eq!(agg.connection_state(), ConnectionState::Open);
    }

    #[test]
    fn test_same_state_is_noop_and_closed_is_terminal() {
        let agg = RollingAggregator::default();
        assert!(!agg.set_connection_state(ConnectionState::Connecting));
        assert!(agg.set_connection_state(ConnectionState::Closed));
        assert!(!agg.set_connection_state(ConnectionState::Connecting));
        assert_eq!(agg.connection_state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_subscribers_see_inserts() {
        let clock = SampleClock::new();
        let agg = RollingAggregator::default();
        let mut rx = agg.subscribe();

        agg.insert(cpu_sample(&clock, 5.0));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().aggregates.sample_count, 1);
    }
}
