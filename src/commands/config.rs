//! Config command implementation.
//!
//! Generates configuration files in various formats.

use std::fs;
use std::path::PathBuf;

use crate::cli::ConfigFormat;
use crate::config::{render_config, Config};

/// Generates configuration files.
pub fn command_config(
    output: Option<PathBuf>,
    format: ConfigFormat,
    commented: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    let output = match output {
        Some(path) => path,
        None => PathBuf::from(default_file_name(&format)),
    };

    let mut content = render_config(&config, &format)?;
    if commented && matches!(format, ConfigFormat::Yaml | ConfigFormat::Toml) {
        content = add_config_comments(content);
    }

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

fn default_file_name(format: &ConfigFormat) -> &'static str {
    match format {
        ConfigFormat::Yaml => "sysmon-stream.yaml",
        ConfigFormat::Json => "sysmon-stream.json",
        ConfigFormat::Toml => "sysmon-stream.toml",
    }
}

/// Adds comments to YAML or TOML configuration (both use `#`).
fn add_config_comments(body: String) -> String {
    let comments = r#"# sysmon-stream Configuration
# ===========================
#
# Upstream Stream
# ---------------
# endpoint: "http://localhost:8080"      # Base URL of the system monitor
# stream_path: "/sse/system/monitor"     # Event stream path below the endpoint
# event_names: [system_update, message]  # SSE event names that carry samples
# connect_timeout_secs: 10               # TCP/TLS connect timeout
# idle_timeout_secs: 60                  # Reconnect after this long without data (0 = never)
#
# History Window
# --------------
# history_capacity: 10         # Samples kept for charts and aggregates
# missing_memory: treat-as-zero  # treat-as-zero | omit (samples without mem_info)
#
# Server Configuration
# --------------------
# bind: "0.0.0.0"              # Bind IP (0.0.0.0 = all interfaces)
# port: 9216                   # HTTP port
#
# Feature Flags
# -------------
# enable_health: true          # Enable /health endpoint
# enable_metrics: true         # Enable /metrics endpoint
#
# Logging
# -------
# log_level: "info"            # off, error, warn, info, debug, trace
#
# Reconnect Policy
# ----------------
# reconnect:
#   initial_backoff_ms: 1000   # First delay after a failure (doubles each attempt)
#   max_backoff_ms: 30000      # Upper bound for the delay
#   max_attempts: 20           # Consecutive failures before giving up (0 = never)
"#;

    format!("{comments}\n{body}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_yaml_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("generated.yaml");

        command_config(Some(path.clone()), ConfigFormat::Yaml, true).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("# sysmon-stream Configuration"));

        let loaded = crate::config::load_config(Some(&path)).unwrap();
        assert_eq!(loaded.history_capacity(), 10);
        assert_eq!(loaded.reconnect.max_attempts, 20);
    }

    #[test]
    fn test_generated_toml_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("generated.toml");

        command_config(Some(path.clone()), ConfigFormat::Toml, true).unwrap();

        let loaded = crate::config::load_config(Some(&path)).unwrap();
        assert_eq!(loaded.port, Some(crate::config::DEFAULT_PORT));
    }
}
