//! Configuration display endpoint handler.
//!
//! This module provides the `/config` endpoint handler that displays
//! the current effective configuration.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use std::fmt::Write as FmtWrite;
use tracing::{debug, instrument};

use crate::config::{
    Config, DEFAULT_BIND_ADDR, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_IDLE_TIMEOUT_SECS,
    DEFAULT_PORT,
};
use crate::handlers::health::FOOTER_TEXT;
use crate::state::SharedState;

/// Handler for the /config endpoint.
#[instrument(skip(state))]
pub async fn config_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /config request");

    (
        StatusCode::OK,
        [("Content-Type", "text/plain; charset=utf-8")],
        render_config_text(&state.config, &state.stream_url),
    )
}

fn render_config_text(cfg: &Config, stream_url: &str) -> String {
    let mut out = String::new();

    writeln!(out, "SYSMON-STREAM - CONFIGURATION").ok();
    writeln!(out, "=============================").ok();
    writeln!(out).ok();

    writeln!(out, "STREAM CONFIGURATION").ok();
    writeln!(out, "--------------------").ok();
    writeln!(out, "stream_url:                 {}", stream_url).ok();
    writeln!(
        out,
        "event_names:                {}",
        cfg.client_options().event_names.join(", ")
    )
    .ok();
    writeln!(
        out,
        "connect_timeout_secs:       {}",
        cfg.connect_timeout_secs
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS)
    )
    .ok();
    match cfg.idle_timeout_secs.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS) {
        0 => writeln!(out, "idle_timeout_secs:          disabled").ok(),
        secs => writeln!(out, "idle_timeout_secs:          {}", secs).ok(),
    };
    writeln!(out).ok();

    writeln!(out, "RECONNECT POLICY").ok();
    writeln!(out, "----------------").ok();
    writeln!(
        out,
        "initial_backoff_ms:         {}",
        cfg.reconnect.initial_backoff_ms
    )
    .ok();
    writeln!(
        out,
        "max_backoff_ms:             {}",
        cfg.reconnect.max_backoff_ms
    )
    .ok();
    match cfg.reconnect.max_attempts {
        0 => writeln!(out, "max_attempts:               unlimited").ok(),
        n => writeln!(out, "max_attempts:               {}", n).ok(),
    };
    writeln!(out).ok();

    writeln!(out, "HISTORY WINDOW").ok();
    writeln!(out, "--------------").ok();
    writeln!(
        out,
        "history_capacity:           {}",
        cfg.history_capacity()
    )
    .ok();
    writeln!(
        out,
        "missing_memory:             {:?}",
        cfg.missing_memory()
    )
    .ok();
    writeln!(out).ok();

    writeln!(out, "SERVER CONFIGURATION").ok();
    writeln!(out, "--------------------").ok();
    writeln!(
        out,
        "bind:                       {}",
        cfg.bind.as_deref().unwrap_or(DEFAULT_BIND_ADDR)
    )
    .ok();
    writeln!(
        out,
        "port:                       {}",
        cfg.port.unwrap_or(DEFAULT_PORT)
    )
    .ok();
    writeln!(
        out,
        "enable_health:              {}",
        cfg.enable_health.unwrap_or(true)
    )
    .ok();
    writeln!(
        out,
        "enable_metrics:             {}",
        cfg.enable_metrics.unwrap_or(true)
    )
    .ok();
    writeln!(
        out,
        "log_level:                  {}",
        cfg.log_level.as_deref().unwrap_or("info")
    )
    .ok();
    writeln!(out).ok();

    writeln!(out, "{FOOTER_TEXT}").ok();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_config_text() {
        let mut cfg = Config::default();
        cfg.reconnect.max_attempts = 0;
        let out = render_config_text(&cfg, &cfg.stream_url());
        assert!(out.contains("stream_url:                 http://localhost:8080/sse/system/monitor"));
        assert!(out.contains("max_attempts:               unlimited"));
        assert!(out.contains("history_capacity:           10"));
        assert!(out.contains("missing_memory:             TreatAsZero"));
    }
}
