//! Health check endpoint handler.
//!
//! This module provides the `/health` endpoint handler that returns
//! the stream connection state and stream statistics.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use std::fmt::Write as FmtWrite;
use sysmon_stream::{ConnectionState, EngineSnapshot};
use tracing::{debug, instrument};

use crate::state::SharedState;

// Time conversion constants
const SECONDS_PER_HOUR: f64 = 3600.0;
const MINUTES_PER_HOUR: f64 = 60.0;
const HOURS_PER_DAY: f64 = 24.0;

/// Footer text for human-readable HTTP endpoints.
pub const FOOTER_TEXT: &str = "sysmon-stream: live CPU/memory history from a system monitor event stream";

/// Handler for the /health endpoint.
#[instrument(skip(state))]
pub async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /health request");

    let snapshot = state.aggregator.snapshot();

    // Only a live subscription counts as healthy; stale history does not.
    let status = if snapshot.connection_state == ConnectionState::Open {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let message = status_message(&snapshot);

    let uptime_seconds = state.stats.get_uptime_seconds();
    let uptime_hours = uptime_seconds as f64 / SECONDS_PER_HOUR;
    let uptime_str = if uptime_hours < 1.0 {
        format!("{:.1} minutes", uptime_hours * MINUTES_PER_HOUR)
    } else if uptime_hours < HOURS_PER_DAY {
        format!("{:.1} hours", uptime_hours)
    } else {
        format!("{:.1} days", uptime_hours / HOURS_PER_DAY)
    };

    let last_sample = match state.stats.seconds_since_last_sample() {
        Some(secs) => format!("{secs:.1} seconds ago"),
        None => "never".to_string(),
    };

    let table = state.stats.render_table();
    let window = render_window(&snapshot, state.aggregator.capacity());

    debug!("Health check: {} - {}", status, message);
    (
        status,
        [("Content-Type", "text/plain; charset=utf-8")],
        format!(
            "{message}\n\nStream: {}\nUptime: {uptime_str}\nLast sample: {last_sample}\n\n{table}\n{window}\n{FOOTER_TEXT}",
            state.stream_url
        ),
    )
}

fn status_message(snapshot: &EngineSnapshot) -> &'static str {
    match (snapshot.connection_state, snapshot.has_data()) {
        (ConnectionState::Open, true) => "OK",
        (ConnectionState::Open, false) => "OK - Waiting for first sample",
        (ConnectionState::Connecting, _) => "Connecting to stream",
        (ConnectionState::Errored, true) => "Stream errored - Showing stale data",
        (ConnectionState::Errored, false) => "Stream errored - No data",
        (ConnectionState::Closed, _) => "Stream closed",
    }
}

/// Renders the rolling window aggregates as a plain-text table.
fn render_window(snapshot: &EngineSnapshot, capacity: usize) -> String {
    let agg = &snapshot.aggregates;
    let fmt_pct = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{v:.1}%"));

    let mut out = String::new();
    writeln!(out, "HISTORY WINDOW").ok();
    writeln!(out, "==============").ok();
    writeln!(out).ok();
    writeln!(out, "{:10} | {:>10} | {:>10}", "", "Max", "Avg").ok();
    writeln!(out, "{}", "-".repeat(36)).ok();
    writeln!(
        out,
        "{:10} | {:>10} | {:>10}",
        "CPU",
        fmt_pct(agg.max_cpu),
        fmt_pct(agg.avg_cpu)
    )
    .ok();
    writeln!(
        out,
        "{:10} | {:>10} | {:>10}",
        "Memory",
        fmt_pct(agg.max_memory),
        fmt_pct(agg.avg_memory)
    )
    .ok();
    writeln!(out).ok();
    if let Some((used, total)) = snapshot
        .history
        .last()
        .and_then(|p| Some((p.memory_used?, p.memory_total?)))
    {
        writeln!(
            out,
            "Memory used: {} of {}",
            format_kb(used),
            format_kb(total)
        )
        .ok();
    }
    writeln!(out, "Samples: {}/{}", agg.sample_count, capacity).ok();
    writeln!(out, "Connection: {}", snapshot.connection_state).ok();
    out
}

/// Formats a kilobyte count with a binary unit suffix.
fn format_kb(kb: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    let mut value = kb as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_message_distinguishes_stale_from_empty() {
        let mut snapshot = EngineSnapshot::empty();
        assert_eq!(status_message(&snapshot), "Connecting to stream");

        snapshot.connection_state = ConnectionState::Errored;
        assert_eq!(status_message(&snapshot), "Stream errored - No data");
    }

    #[test]
    fn test_render_window_empty() {
        let out = render_window(&EngineSnapshot::empty(), 10);
        assert!(out.contains("Samples: 0/10"));
        assert!(out.contains("Connection: Connecting"));
        assert!(!out.contains("Memory used"));
    }

    #[test]
    fn test_render_window_shows_latest_memory() {
        use sysmon_stream::{MissingMemoryPolicy, RollingAggregator, Sample, SampleClock};

        let aggregator = RollingAggregator::new(5, MissingMemoryPolicy::TreatAsZero);
        let clock = SampleClock::new();
        let sample = Sample::decode(
            r#"{"total_cpu_usage": 5.0, "mem_info": {"mem_total": 8388608, "mem_free": 6291456}}"#,
            &clock,
        )
        .unwrap();
        aggregator.insert(sample);

        let out = render_window(&aggregator.snapshot(), 5);
        assert!(out.contains("Memory used: 2.0 GB of 8.0 GB"));
    }

    #[test]
    fn test_format_kb() {
        assert_eq!(format_kb(512), "512.0 KB");
        assert_eq!(format_kb(1536), "1.5 MB");
        assert_eq!(format_kb(1024 * 1024), "1.0 GB");
    }
}
