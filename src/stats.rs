//! Stream statistics for the engine.
//!
//! Tracks frame throughput, decode and transport failures and reconnect
//! activity of the stream client, and renders them as a plain-text table for
//! the `/health` endpoint.

use std::fmt::Write as FmtWrite;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

/// Running statistics for a single metric.
#[derive(Clone, Copy, Debug, Default)]
pub struct RunningStat {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    last: f64,
}

impl RunningStat {
    pub fn add(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
            self.last = value;
            self.sum = value;
            self.count = 1;
            return;
        }
        self.count += 1;
        self.sum += value;
        self.last = value;
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Largest value seen, `None` before the first sample.
    pub fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max)
    }

    /// Arithmetic mean, `None` before the first sample.
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    pub fn avg(&self) -> f64 {
        self.mean().unwrap_or(0.0)
    }
}

impl FromIterator<f64> for RunningStat {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut stat = RunningStat::default();
        for value in iter {
            stat.add(value);
        }
        stat
    }
}

/// Thread-safe wrapper for running statistics.
#[derive(Default)]
pub struct Stat {
    inner: Mutex<RunningStat>,
}

impl Stat {
    pub fn add_sample(&self, value: f64) {
        if let Ok(mut s) = self.inner.lock() {
            s.add(value);
        }
    }

    /// Returns `(last, avg, max, min, count)`.
    pub fn snapshot(&self) -> (f64, f64, f64, f64, u64) {
        if let Ok(s) = self.inner.lock() {
            (s.last, s.avg(), s.max, s.min, s.count)
        } else {
            (0.0, 0.0, 0.0, 0.0, 0)
        }
    }
}

/// Counters describing the health of the stream subscription.
pub struct StreamStats {
    pub frames_received: AtomicU64,
    pub samples_inserted: AtomicU64,
    pub decode_errors: AtomicU64,
    pub ignored_events: AtomicU64,
    pub transport_errors: AtomicU64,
    pub connects: AtomicU64,
    pub reconnect_attempts: AtomicU64,
    /// Seconds between consecutive accepted samples.
    pub sample_interval_seconds: Stat,
    last_sample_at: Mutex<Option<Instant>>,
    pub start_time: Instant,
}

impl Default for StreamStats {
    fn default() -> Self {
        Self {
            frames_received: AtomicU64::new(0),
            samples_inserted: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            ignored_events: AtomicU64::new(0),
            transport_errors: AtomicU64::new(0),
            connects: AtomicU64::new(0),
            reconnect_attempts: AtomicU64::new(0),
            sample_interval_seconds: Stat::default(),
            last_sample_at: Mutex::new(None),
            start_time: Instant::now(),
        }
    }
}

impl StreamStats {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn record_frame(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sample(&self) {
        self.samples_inserted.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        if let Ok(mut last) = self.last_sample_at.lock() {
            if let Some(prev) = last.replace(now) {
                self.sample_interval_seconds
                    .add_sample(now.duration_since(prev).as_secs_f64());
            }
        }
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ignored_event(&self) {
        self.ignored_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transport_error(&self) {
        self.transport_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connect(&self) {
        self.connects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect_attempt(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Seconds since the last accepted sample, `None` if none arrived yet.
    pub fn seconds_since_last_sample(&self) -> Option<f64> {
        self.last_sample_at
            .lock()
            .ok()
            .and_then(|guard| guard.map(|t| t.elapsed().as_secs_f64()))
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn render_table(&self) -> String {
        let (si_cur, si_avg, si_max, si_min, _) = self.sample_interval_seconds.snapshot();
        let left_col = 26usize;
        let col_w = 12usize;

        let mut out = String::new();

        writeln!(out, "STREAM STATISTICS").ok();
        writeln!(out, "=================").ok();
        writeln!(out).ok();

        let counters = [
            ("frames_received", &self.frames_received),
            ("samples_inserted", &self.samples_inserted),
            ("decode_errors", &self.decode_errors),
            ("ignored_events", &self.ignored_events),
            ("transport_errors", &self.transport_errors),
            ("connects", &self.connects),
            ("reconnect_attempts", &self.reconnect_attempts),
        ];
        for (name, counter) in counters {
            writeln!(
                out,
                "{:left$} | {:>col$}",
                name,
                counter.load(Ordering::Relaxed),
                left = left_col,
                col = col_w
            )
            .ok();
        }

        writeln!(out).ok();
        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "",
            "current",
            "average",
            "max",
            "min",
            left = left_col,
            col = col_w
        )
        .ok();
        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "sample_interval (s)",
            format!("{:.3}", si_cur),
            format!("{:.3}", si_avg),
            format!("{:.3}", si_max),
            format!("{:.3}", si_min),
            left = left_col,
            col = col_w
        )
        .ok();

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_stat_first_sample_initializes() {
        let mut stat = RunningStat::default();
        assert_eq!(stat.max(), None);
        assert_eq!(stat.mean(), None);

        stat.add(4.0);
        assert_eq!(stat.max(), Some(4.0));
        assert_eq!(stat.mean(), Some(4.0));
        assert_eq!(stat.count(), 1);
    }

    #[test]
    fn test_running_stat_from_iter() {
        let stat: RunningStat = [10.0, 30.0, 20.0].into_iter().collect();
        assert_eq!(stat.max(), Some(30.0));
        assert_eq!(stat.mean(), Some(20.0));
        assert_eq!(stat.count(), 3);
    }

    #[test]
    fn test_stream_stats_counters() {
        let stats = StreamStats::new();
        stats.record_frame();
        stats.record_frame();
        stats.record_decode_error();
        stats.record_sample();

        assert_eq!(stats.frames_received.load(Ordering::Relaxed), 2);
        assert_eq!(stats.decode_errors.load(Ordering::Relaxed), 1);
        assert_eq!(stats.samples_inserted.load(Ordering::Relaxed), 1);
        assert!(stats.seconds_since_last_sample().is_some());

        // Interval only recorded from the second sample on
        let (_, _, _, _, count) = stats.sample_interval_seconds.snapshot();
        assert_eq!(count, 0);
        stats.record_sample();
        let (_, _, _, _, count) = stats.sample_interval_seconds.snapshot();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_render_table_lists_counters() {
        let stats = StreamStats::new();
        stats.record_transport_error();
        let table = stats.render_table();
        assert!(table.contains("STREAM STATISTICS"));
        assert!(table.contains("transport_errors"));
        assert!(table.contains("sample_interval (s)"));
    }
}
