//! Published engine state.
//!
//! An [`EngineSnapshot`] is the immutable `{connection_state, history,
//! aggregates}` tuple handed to renderers. History is always oldest-first.

use serde::Serialize;
use std::fmt;

use crate::sample::Sample;
use crate::stats::RunningStat;

/// Lifecycle status of the push-stream subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Connecting,
    Open,
    Errored,
    Closed,
}

impl ConnectionState {
    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// `Closed` is terminal. Re-entering the current state is not a
    /// transition and is rejected here; callers treat it as a no-op.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,
            (Connecting, Open) | (Connecting, Errored) => true,
            (Open, Errored) => true,
            (Errored, Connecting) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Open => "Open",
            ConnectionState::Errored => "Errored",
            ConnectionState::Closed => "Closed",
        }
    }

    /// Numeric encoding used for the Prometheus gauge.
    pub fn as_gauge(self) -> f64 {
        match self {
            ConnectionState::Connecting => 0.0,
            ConnectionState::Open => 1.0,
            ConnectionState::Errored => 2.0,
            ConnectionState::Closed => 3.0,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How samples without memory info contribute to the memory aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingMemoryPolicy {
    /// Count the sample as 0% memory usage (dashboard behaviour).
    #[default]
    TreatAsZero,
    /// Leave the sample out of the memory aggregates entirely.
    Omit,
}

impl MissingMemoryPolicy {
    pub fn resolve(self, sample: &Sample) -> Option<f64> {
        match (sample.memory_usage_percent(), self) {
            (Some(pct), _) => Some(pct),
            (None, MissingMemoryPolicy::TreatAsZero) => Some(0.0),
            (None, MissingMemoryPolicy::Omit) => None,
        }
    }
}

/// One history row as seen by a renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPoint {
    /// Local time of receipt (`HH:MM:SS`).
    pub timestamp: String,
    pub cpu_usage_percent: f64,
    /// `None` only under [`MissingMemoryPolicy::Omit`] for samples without memory info.
    pub memory_usage_percent: Option<f64>,
    /// Absolute figures in kilobytes, `None` when the feed carried no memory info.
    pub memory_total: Option<u64>,
    pub memory_used: Option<u64>,
    pub captured_at_epoch_ms: i64,
}

impl HistoryPoint {
    pub fn from_sample(sample: &Sample, policy: MissingMemoryPolicy) -> Self {
        Self {
            timestamp: sample.display_timestamp(),
            cpu_usage_percent: sample.cpu_usage_percent,
            memory_usage_percent: policy.resolve(sample),
            memory_total: sample.memory_total,
            memory_used: sample.memory_used(),
            captured_at_epoch_ms: sample.captured_at_epoch_ms(),
        }
    }
}

/// Derived statistics over the current window.
///
/// Max/avg are `None` over an empty set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregates {
    pub max_cpu: Option<f64>,
    pub avg_cpu: Option<f64>,
    pub max_memory: Option<f64>,
    pub avg_memory: Option<f64>,
    pub sample_count: usize,
    /// Samples that contributed to the memory aggregates.
    pub memory_sample_count: usize,
}

impl Aggregates {
    /// Recomputes aggregates from scratch over `window` (oldest-first).
    pub fn compute<'a, I>(window: I, policy: MissingMemoryPolicy) -> Self
    where
        I: IntoIterator<Item = &'a Sample>,
    {
        let mut cpu = RunningStat::default();
        let mut memory = RunningStat::default();

        for sample in window {
            cpu.add(sample.cpu_usage_percent);
            if let Some(pct) = policy.resolve(sample) {
                memory.add(pct);
            }
        }

        Self {
            max_cpu: cpu.max(),
            avg_cpu: cpu.mean(),
            max_memory: memory.max(),
            avg_memory: memory.mean(),
            sample_count: cpu.count() as usize,
            memory_sample_count: memory.count() as usize,
        }
    }
}

/// The engine's published state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub connection_state: ConnectionState,
    pub history: Vec<HistoryPoint>,
    pub aggregates: Aggregates,
}

impl EngineSnapshot {
    /// Snapshot of an engine that has not received anything yet.
    pub fn empty() -> Self {
        Self {
            connection_state: ConnectionState::Connecting,
            history: Vec::new(),
            aggregates: Aggregates::default(),
        }
    }

    /// True when no sample has been received yet ("no data" vs "stale data").
    pub fn has_data(&self) -> bool {
        !self.history.is_empty()
    }
}
