//! Prometheus metrics definitions for sysmon-stream.
//!
//! Gauges mirror the published snapshot (latest sample, rolling aggregates,
//! window fill and connection state). Counters mirror [`StreamStats`].

use prometheus::{Gauge, IntCounter, IntGauge, Registry};
use std::sync::atomic::{AtomicU64, Ordering};
use sysmon_stream::{EngineSnapshot, StreamStats};

/// Collection of Prometheus metrics exported on `/metrics`.
#[derive(Clone)]
pub struct StreamMetrics {
    // ========== Latest Sample ==========
    pub cpu_usage_percent: Gauge,
    pub memory_usage_percent: Gauge,

    // ========== Rolling Aggregates ==========
    pub cpu_max_percent: Gauge,
    pub cpu_avg_percent: Gauge,
    pub memory_max_percent: Gauge,
    pub memory_avg_percent: Gauge,

    // ========== Window ==========
    pub history_samples: IntGauge,
    pub history_capacity: IntGauge,

    // ========== Connection ==========
    pub connection_state: IntGauge,
    pub seconds_since_last_sample: Gauge,

    // ========== Stream Counters ==========
    pub frames_received_total: IntCounter,
    pub samples_inserted_total: IntCounter,
    pub decode_errors_total: IntCounter,
    pub ignored_events_total: IntCounter,
    pub transport_errors_total: IntCounter,
    pub connects_total: IntCounter,
    pub reconnect_attempts_total: IntCounter,
}

/// Gauge value used when the window holds no data for a statistic.
const NO_DATA: f64 = f64::NAN;

impl StreamMetrics {
    /// Creates and registers all Prometheus metrics with the registry.
    pub fn new(registry: &Registry) -> Result<Self, Box<dyn std::error::Error>> {
        let cpu_usage_percent = Gauge::new(
            "sysmon_stream_cpu_usage_percent",
            "CPU usage of the most recent sample (0-100)",
        )?;
        let memory_usage_percent = Gauge::new(
            "sysmon_stream_memory_usage_percent",
            "Memory usage of the most recent sample (0-100)",
        )?;

        let cpu_max_percent = Gauge::new(
            "sysmon_stream_cpu_max_percent",
            "Maximum CPU usage over the history window",
        )?;
        let cpu_avg_percent = Gauge::new(
            "sysmon_stream_cpu_avg_percent",
            "Mean CPU usage over the history window",
        )?;
        let memory_max_percent = Gauge::new(
            "sysmon_stream_memory_max_percent",
            "Maximum memory usage over the history window",
        )?;
        let memory_avg_percent = Gauge::new(
            "sysmon_stream_memory_avg_percent",
            "Mean memory usage over the history window",
        )?;

        let history_samples = IntGauge::new(
            "sysmon_stream_history_samples",
            "Number of samples currently held in the history window",
        )?;
        let history_capacity = IntGauge::new(
            "sysmon_stream_history_capacity",
            "Maximum number of samples held in the history window",
        )?;

        let connection_state = IntGauge::new(
            "sysmon_stream_connection_state",
            "Stream connection state (0=connecting, 1=open, 2=errored, 3=closed)",
        )?;
        let seconds_since_last_sample = Gauge::new(
            "sysmon_stream_seconds_since_last_sample",
            "Seconds since the last sample was accepted",
        )?;

        let frames_received_total = IntCounter::new(
            "sysmon_stream_frames_received_total",
            "Server-sent events received from the upstream monitor",
        )?;
        let samples_inserted_total = IntCounter::new(
            "sysmon_stream_samples_inserted_total",
            "Samples decoded and inserted into the history window",
        )?;
        let decode_errors_total = IntCounter::new(
            "sysmon_stream_decode_errors_total",
            "Frames dropped because their payload could not be decoded",
        )?;
        let ignored_events_total = IntCounter::new(
            "sysmon_stream_ignored_events_total",
            "Events skipped because their name is not subscribed",
        )?;
        let transport_errors_total = IntCounter::new(
            "sysmon_stream_transport_errors_total",
            "Connection failures and dropped streams",
        )?;
        let connects_total = IntCounter::new(
            "sysmon_stream_connects_total",
            "Successful stream connections",
        )?;
        let reconnect_attempts_total = IntCounter::new(
            "sysmon_stream_reconnect_attempts_total",
            "Scheduled reconnect attempts",
        )?;

        registry.register(Box::new(cpu_usage_percent.clone()))?;
        registry.register(Box::new(memory_usage_percent.clone()))?;
        registry.register(Box::new(cpu_max_percent.clone()))?;
        registry.register(Box::new(cpu_avg_percent.clone()))?;
        registry.register(Box::new(memory_max_percent.clone()))?;
        registry.register(Box::new(memory_avg_percent.clone()))?;
        registry.register(Box::new(history_samples.clone()))?;
        registry.register(Box::new(history_capacity.clone()))?;
        registry.register(Box::new(connection_state.clone()))?;
        registry.register(Box::new(seconds_since_last_sample.clone()))?;
        registry.register(Box::new(frames_received_total.clone()))?;
        registry.register(Box::new(samples_inserted_total.clone()))?;
        registry.register(Box::new(decode_errors_total.clone()))?;
        registry.register(Box::new(ignored_events_total.clone()))?;
        registry.register(Box::new(transport_errors_total.clone()))?;
        registry.register(Box::new(connects_total.clone()))?;
        registry.register(Box::new(reconnect_attempts_total.clone()))?;

        Ok(Self {
            cpu_usage_percent,
            memory_usage_percent,
            cpu_max_percent,
            cpu_avg_percent,
            memory_max_percent,
            memory_avg_percent,
            history_samples,
            history_capacity,
            connection_state,
            seconds_since_last_sample,
            frames_received_total,
            samples_inserted_total,
            decode_errors_total,
            ignored_events_total,
            transport_errors_total,
            connects_total,
            reconnect_attempts_total,
        })
    }

    /// Copies the published snapshot into the gauges.
    pub fn update_from_snapshot(&self, snapshot: &EngineSnapshot, capacity: usize) {
        let latest = snapshot.history.last();
        self.cpu_usage_percent
            .set(latest.map_or(NO_DATA, |p| p.cpu_usage_percent));
        self.memory_usage_percent.set(
            latest
                .and_then(|p| p.memory_usage_percent)
                .unwrap_or(NO_DATA),
        );

        let agg = &snapshot.aggregates;
        self.cpu_max_percent.set(agg.max_cpu.unwrap_or(NO_DATA));
        self.cpu_avg_percent.set(agg.avg_cpu.unwrap_or(NO_DATA));
        self.memory_max_percent.set(agg.max_memory.unwrap_or(NO_DATA));
        self.memory_avg_percent.set(agg.avg_memory.unwrap_or(NO_DATA));

        self.history_samples.set(snapshot.history.len() as i64);
        self.history_capacity.set(capacity as i64);
        self.connection_state
            .set(snapshot.connection_state.as_gauge() as i64);
    }

    /// Advances the counters to the current [`StreamStats`] totals.
    pub fn update_from_stats(&self, stats: &StreamStats) {
        sync_counter(&self.frames_received_total, &stats.frames_received);
        sync_counter(&self.samples_inserted_total, &stats.samples_inserted);
        sync_counter(&self.decode_errors_total, &stats.decode_errors);
        sync_counter(&self.ignored_events_total, &stats.ignored_events);
        sync_counter(&self.transport_errors_total, &stats.transport_errors);
        sync_counter(&self.connects_total, &stats.connects);
        sync_counter(&self.reconnect_attempts_total, &stats.reconnect_attempts);

        self.seconds_since_last_sample
            .set(stats.seconds_since_last_sample().unwrap_or(NO_DATA));
    }
}

fn sync_counter(counter: &IntCounter, source: &AtomicU64) {
    let current = source.load(Ordering::Relaxed);
    let delta = current.saturating_sub(counter.get());
    if delta > 0 {
        counter.inc_by(delta);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sysmon_stream::{MissingMemoryPolicy, RollingAggregator, Sample};

    fn sample(cpu: f64, total: u64, free: u64) -> Sample {
        Sample {
            cpu_usage_percent: cpu,
            memory_total: Some(total),
            memory_free: Some(free),
            observed_at: 0,
            captured_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_gauges_follow_snapshot() {
        let registry = Registry::new();
        let metrics = StreamMetrics::new(&registry).unwrap();
        let aggregator = RollingAggregator::new(3, MissingMemoryPolicy::TreatAsZero);

        metrics.update_from_snapshot(&aggregator.snapshot(), aggregator.capacity());
        assert!(metrics.cpu_max_percent.get().is_nan());
        assert_eq!(metrics.history_samples.get(), 0);
        assert_eq!(metrics.connection_state.get(), 0);

        aggregator.insert(sample(10.0, 100, 50));
        aggregator.insert(sample(30.0, 100, 25));
        metrics.update_from_snapshot(&aggregator.snapshot(), aggregator.capacity());

        assert_eq!(metrics.cpu_usage_percent.get(), 30.0);
        assert_eq!(metrics.memory_usage_percent.get(), 75.0);
        assert_eq!(metrics.cpu_max_percent.get(), 30.0);
        assert_eq!(metrics.cpu_avg_percent.get(), 20.0);
        assert_eq!(metrics.memory_max_percent.get(), 75.0);
        assert_eq!(metrics.history_samples.get(), 2);
        assert_eq!(metrics.history_capacity.get(), 3);
    }

    #[test]
    fn test_counters_track_stats_without_double_counting() {
        let registry = Registry::new();
        let metrics = StreamMetrics::new(&registry).unwrap();
        let stats = StreamStats::new();

        stats.record_frame();
        stats.record_frame();
        stats.record_decode_error();
        metrics.update_from_stats(&stats);
        metrics.update_from_stats(&stats);

        assert_eq!(metrics.frames_received_total.get(), 2);
        assert_eq!(metrics.decode_errors_total.get(), 1);
        assert_eq!(metrics.samples_inserted_total.get(), 0);
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Registry::new();
        StreamMetrics::new(&registry).unwrap();
        assert!(StreamMetrics::new(&registry).is_err());
    }
}
