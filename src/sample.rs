//! Sample model and payload decoding.
//!
//! A [`Sample`] is one CPU/memory observation. It is built once per decoded
//! stream event and never mutated afterwards.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::error::DecodeError;

/// Memory counters as sent by the upstream monitor (kilobytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemInfo {
    pub mem_total: u64,
    pub mem_free: u64,
}

/// Wire payload of a `system_update` event.
///
/// `mem_info` is missing (or `null`) in degraded deployments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorMessage {
    pub total_cpu_usage: f64,
    #[serde(default)]
    pub mem_info: Option<MemInfo>,
}

impl MonitorMessage {
    /// Parses a raw event payload.
    pub fn parse(raw: &str) -> Result<Self, DecodeError> {
        let msg: MonitorMessage = serde_json::from_str(raw)?;

        if !msg.total_cpu_usage.is_finite() {
            return Err(DecodeError::NonFiniteCpu);
        }

        if let Some(mem) = msg.mem_info {
            if mem.mem_free > mem.mem_total {
                return Err(DecodeError::MemoryFreeExceedsTotal {
                    total: mem.mem_total,
                    free: mem.mem_free,
                });
            }
        }

        Ok(msg)
    }
}

/// Engine-local monotonic clock for `observed_at` stamps.
///
/// Every call to [`SampleClock::next`] returns a value strictly greater than
/// the previous one, even when the OS clock has not advanced in between.
#[derive(Debug)]
pub struct SampleClock {
    origin: Instant,
    last: AtomicU64,
}

impl Default for SampleClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            last: AtomicU64::new(0),
        }
    }

    /// Returns nanoseconds since the clock was created, strictly increasing.
    pub fn next(&self) -> u64 {
        let now = self.origin.elapsed().as_nanos() as u64;
        let mut issued = now;
        // fetch_update only fails when the closure returns None
        let _ = self
            .last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |prev| {
                issued = now.max(prev + 1);
                Some(issued)
            });
        issued
    }
}

/// One timestamped CPU/memory observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub cpu_usage_percent: f64,
    pub memory_total: Option<u64>,
    pub memory_free: Option<u64>,
    /// Monotonic receipt stamp assigned by the engine (see [`SampleClock`]).
    pub observed_at: u64,
    /// Wall-clock receipt time, used for display only.
    pub captured_at: DateTime<Utc>,
}

impl Sample {
    /// Builds a sample from a decoded message, stamping it with the clock.
    pub fn from_message(msg: &MonitorMessage, clock: &SampleClock) -> Self {
        Self {
            cpu_usage_percent: msg.total_cpu_usage,
            memory_total: msg.mem_info.map(|m| m.mem_total),
            memory_free: msg.mem_info.map(|m| m.mem_free),
            observed_at: clock.next(),
            captured_at: Utc::now(),
        }
    }

    /// Decodes a raw event payload straight into a sample.
    pub fn decode(raw: &str, clock: &SampleClock) -> Result<Self, DecodeError> {
        let msg = MonitorMessage::parse(raw)?;
        Ok(Self::from_message(&msg, clock))
    }

    /// Used memory as a percentage of total.
    ///
    /// `None` when the feed carried no memory info; `Some(0.0)` when the
    /// reported total is zero.
    pub fn memory_usage_percent(&self) -> Option<f64> {
        let (total, free) = (self.memory_total?, self.memory_free?);
        if total == 0 {
            return Some(0.0);
        }
        Some(total.saturating_sub(free) as f64 / total as f64 * 100.0)
    }

    /// Used memory in kilobytes (`mem_total - mem_free`).
    pub fn memory_used(&self) -> Option<u64> {
        Some(self.memory_total?.saturating_sub(self.memory_free?))
    }

    /// Receipt time in milliseconds since the Unix epoch.
    pub fn captured_at_epoch_ms(&self) -> i64 {
        self.captured_at.timestamp_millis()
    }

    /// Local wall-clock time of receipt formatted for display (`HH:MM:SS`).
    pub fn display_timestamp(&self) -> String {
        self.captured_at
            .with_timezone(&Local)
            .format("%H:%M:%S")
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_payload() {
        let msg = MonitorMessage::parse(
            r#"{"total_cpu_usage": 42.5, "mem_info": {"mem_total": 1000, "mem_free": 250}}"#,
        )
        .unwrap();
        assert_eq!(msg.total_cpu_usage, 42.5);
        assert_eq!(
            msg.mem_info,
            Some(MemInfo {
                mem_total: 1000,
                mem_free: 250
            })
        );
    }

    #[test]
    fn test_parse_integer_cpu_and_missing_mem_info() {
        let msg = MonitorMessage::parse(r#"{"total_cpu_usage": 7}"#).unwrap();
        assert_eq!(msg.total_cpu_usage, 7.0);
        assert!(msg.mem_info.is_none());

        let msg = MonitorMessage::parse(r#"{"total_cpu_usage": 7, "mem_info": null}"#).unwrap();
        assert!(msg.mem_info.is_none());
    }

    #[test]
    fn test_parse_out_of_range_cpu_is_accepted() {
        let msg = MonitorMessage::parse(r#"{"total_cpu_usage": 140.0}"#).unwrap();
        assert_eq!(msg.total_cpu_usage, 140.0);
        let msg = MonitorMessage::parse(r#"{"total_cpu_usage": -3.0}"#).unwrap();
        assert_eq!(msg.total_cpu_usage, -3.0);
    }

    #[test]
    fn test_parse_rejects_garbage_and_missing_cpu() {
        assert!(matches!(
            MonitorMessage::parse("not json"),
            Err(DecodeError::Json(_))
        ));
        assert!(matches!(
            MonitorMessage::parse(r#"{"mem_info": {"mem_total": 1, "mem_free": 0}}"#),
            Err(DecodeError::Json(_))
        ));
    }

    #[test]
    fn test_parse_rejects_free_above_total() {
        let err = MonitorMessage::parse(
            r#"{"total_cpu_usage": 1.0, "mem_info": {"mem_total": 10, "mem_free": 11}}"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            DecodeError::MemoryFreeExceedsTotal { total: 10, free: 11 }
        ));
    }

    #[test]
    fn test_memory_usage_percent() {
        let clock = SampleClock::new();
        let sample = Sample::decode(
            r#"{"total_cpu_usage": 1.0, "mem_info": {"mem_total": 1000, "mem_free": 250}}"#,
            &clock,
        )
        .unwrap();
        assert!((sample.memory_usage_percent().unwrap() - 75.0).abs() < 1e-9);

        let zero_total = Sample::decode(
            r#"{"total_cpu_usage": 1.0, "mem_info": {"mem_total": 0, "mem_free": 0}}"#,
            &clock,
        )
        .unwrap();
        assert_eq!(zero_total.memory_usage_percent(), Some(0.0));

        let missing = Sample::decode(r#"{"total_cpu_usage": 1.0}"#, &clock).unwrap();
        assert_eq!(missing.memory_usage_percent(), None);
    }

    #[test]
    fn test_clock_is_strictly_increasing() {
        let clock = SampleClock::new();
        let mut prev = clock.next();
        for _ in 0..10_000 {
            let next = clock.next();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn test_display_timestamp_format() {
        let clock = SampleClock::new();
        let sample = Sample::decode(r#"{"total_cpu_usage": 1.0}"#, &clock).unwrap();
        let ts = sample.display_timestamp();
        assert_eq!(ts.len(), 8);
        assert_eq!(ts.matches(':').count(), 2);
    }
}
