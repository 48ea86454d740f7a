//! Configuration management for sysmon-stream.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.

use crate::cli::{Args, ConfigFormat, MissingMemoryArg};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use sysmon_stream::{ClientOptions, MissingMemoryPolicy, ReconnectPolicy, DEFAULT_HISTORY_CAPACITY};
use tracing::info;
use tracing::level_filters::LevelFilter;

// Default configuration constants
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9216;
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8080";
pub const DEFAULT_STREAM_PATH: &str = "/sse/system/monitor";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 60;

/// Largest history window accepted by validation.
const MAX_HISTORY_CAPACITY: usize = 100_000;

/// Enhanced configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Upstream stream
    pub endpoint: Option<String>,
    #[serde(alias = "stream-path")]
    pub stream_path: Option<String>,
    #[serde(alias = "event-names")]
    pub event_names: Option<Vec<String>>,
    #[serde(alias = "connect-timeout-secs")]
    pub connect_timeout_secs: Option<u64>,
    /// 0 disables the idle watchdog
    #[serde(alias = "idle-timeout-secs")]
    pub idle_timeout_secs: Option<u64>,

    // Rolling window
    #[serde(alias = "history-capacity")]
    pub history_capacity: Option<usize>,
    #[serde(alias = "missing-memory")]
    pub missing_memory: Option<MissingMemoryPolicy>,

    // Server configuration
    pub port: Option<u16>,
    pub bind: Option<String>,

    // Feature flags
    #[serde(alias = "enable-health")]
    pub enable_health: Option<bool>,
    #[serde(alias = "enable-metrics")]
    pub enable_metrics: Option<bool>,

    // Logging
    #[serde(alias = "log-level")]
    pub log_level: Option<String>,

    // Reconnect configuration (kept last: TOML tables must follow plain values)
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: Some(DEFAULT_ENDPOINT.to_string()),
            stream_path: Some(DEFAULT_STREAM_PATH.to_string()),
            event_names: Some(ClientOptions::default().event_names),
            connect_timeout_secs: Some(DEFAULT_CONNECT_TIMEOUT_SECS),
            idle_timeout_secs: Some(DEFAULT_IDLE_TIMEOUT_SECS),
            history_capacity: Some(DEFAULT_HISTORY_CAPACITY),
            missing_memory: Some(MissingMemoryPolicy::default()),
            port: Some(DEFAULT_PORT),
            bind: Some(DEFAULT_BIND_ADDR.to_string()),
            enable_health: Some(true),
            enable_metrics: Some(true),
            log_level: Some("info".into()),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl Config {
    /// Full URL of the event stream: endpoint joined with stream_path.
    pub fn stream_url(&self) -> String {
        let endpoint = self.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT);
        let path = self.stream_path.as_deref().unwrap_or(DEFAULT_STREAM_PATH);
        format!(
            "{}/{}",
            endpoint.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn history_capacity(&self) -> usize {
        self.history_capacity.unwrap_or(DEFAULT_HISTORY_CAPACITY)
    }

    pub fn missing_memory(&self) -> MissingMemoryPolicy {
        self.missing_memory.unwrap_or_default()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(
            self.connect_timeout_secs
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
        )
    }

    /// Builds the stream client options from the effective config.
    pub fn client_options(&self) -> ClientOptions {
        let defaults = ClientOptions::default();
        let idle = self.idle_timeout_secs.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS);
        ClientOptions {
            event_names: self
                .event_names
                .clone()
                .unwrap_or(defaults.event_names),
            reconnect: self.reconnect.clone(),
            idle_timeout: (idle > 0).then(|| Duration::from_secs(idle)),
        }
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let endpoint = cfg.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT);
    if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
        return Err(format!(
            "Invalid endpoint '{}', expected an http:// or https:// URL",
            endpoint
        )
        .into());
    }

    match cfg.history_capacity() {
        0 => return Err("history_capacity must be at least 1".into()),
        n if n > MAX_HISTORY_CAPACITY => {
            return Err(format!(
                "history_capacity {} exceeds the maximum of {}",
                n, MAX_HISTORY_CAPACITY
            )
            .into());
        }
        _ => {}
    }

    if cfg
        .event_names
        .as_ref()
        .is_some_and(|names| names.is_empty() || names.iter().any(|n| n.trim().is_empty()))
    {
        return Err("event_names must list at least one non-empty event name".into());
    }

    let reconnect = &cfg.reconnect;
    if reconnect.max_backoff_ms < reconnect.initial_backoff_ms {
        return Err(format!(
            "reconnect.max_backoff_ms ({}) is smaller than reconnect.initial_backoff_ms ({})",
            reconnect.max_backoff_ms, reconnect.initial_backoff_ms
        )
        .into());
    }

    if cfg.connect_timeout_secs == Some(0) {
        return Err("connect_timeout_secs must be greater than 0".into());
    }

    if let Some(level) = cfg.log_level.as_deref() {
        level
            .parse::<LevelFilter>()
            .map_err(|_| {
                format!(
                    "Invalid log_level '{}', expected off/error/warn/info/debug/trace",
                    level
                )
            })?;
    }

    if let Some(bind) = cfg.bind.as_deref() {
        bind.parse::<std::net::IpAddr>()
            .map_err(|e| format!("Invalid bind address '{}': {}", bind, e))?;
    }

    Ok(())
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    if let Some(endpoint) = &args.endpoint {
        config.endpoint = Some(endpoint.clone());
    }
    if let Some(path) = &args.stream_path {
        config.stream_path = Some(path.clone());
    }
    if let Some(capacity) = args.history_capacity {
        config.history_capacity = Some(capacity);
    }
    if let Some(policy) = args.missing_memory {
        config.missing_memory = Some(match policy {
            MissingMemoryArg::TreatAsZero => MissingMemoryPolicy::TreatAsZero,
            MissingMemoryArg::Omit => MissingMemoryPolicy::Omit,
        });
    }
    if let Some(attempts) = args.max_reconnect_attempts {
        config.reconnect.max_attempts = attempts;
    }

    if let Some(bind_ip) = args.bind {
        config.bind = Some(bind_ip.to_string());
    }
    if let Some(cli_port) = args.port {
        config.port = Some(cli_port);
    }

    if let Some(level) = &args.log_level {
        config.log_level = Some(level.as_str().to_string());
    }

    // Feature flags
    if args.disable_health {
        config.enable_health = Some(false);
    }
    if args.disable_metrics {
        config.enable_metrics = Some(false);
    }

    Ok(config)
}

/// Enhanced configuration loading with multiple format support
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(format!("Config file not found: {}", p.display()).into());
            }
            p.to_path_buf()
        }
        None => {
            // Try default locations
            let defaults = [
                "/etc/sysmon-stream/sysmon-stream.yaml",
                "/etc/sysmon-stream/sysmon-stream.yml",
                "/etc/sysmon-stream/sysmon-stream.json",
                "./sysmon-stream.yaml",
                "./sysmon-stream.yml",
                "./sysmon-stream.json",
            ];

            match defaults.iter().find(|p| Path::new(p).exists()) {
                Some(found) => PathBuf::from(found),
                None => return Ok(Config::default()),
            }
        }
    };

    let content = fs::read_to_string(&path)?;

    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            let config: Config = serde_json::from_str(&content)?;
            info!("Loaded JSON configuration from: {}", path.display());
            Ok(config)
        }
        Some("toml") => {
            let config: Config = toml::from_str(&content)?;
            info!("Loaded TOML configuration from: {}", path.display());
            Ok(config)
        }
        _ => {
            // Default to YAML
            let config: Config = serde_yaml::from_str(&content)?;
            info!("Loaded YAML configuration from: {}", path.display());
            Ok(config)
        }
    }
}

/// Renders configuration in the requested format
pub fn render_config(
    config: &Config,
    format: &ConfigFormat,
) -> Result<String, Box<dyn std::error::Error>> {
    Ok(match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    })
}

/// Shows configuration in requested format
pub fn show_config(config: &Config, format: &ConfigFormat) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", render_config(config, format)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    fn write_config(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(suffix)
            .tempfile()
            .unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(validate_effective_config(&config).is_ok());
        assert_eq!(config.history_capacity(), 10);
        assert_eq!(config.missing_memory(), MissingMemoryPolicy::TreatAsZero);
        assert_eq!(
            config.stream_url(),
            "http://localhost:8080/sse/system/monitor"
        );
    }

    #[test]
    fn test_stream_url_joins_slashes() {
        let config = Config {
            endpoint: Some("http://monitor:9000/".into()),
            stream_path: Some("events".into()),
            ..Config::default()
        };
        assert_eq!(config.stream_url(), "http://monitor:9000/events");
    }

    #[test]
    fn test_load_yaml_config() {
        let file = write_config(
            ".yaml",
            "endpoint: http://monitor:9000\n\
             history-capacity: 25\n\
             missing_memory: omit\n\
             reconnect:\n  max_attempts: 0\n",
        );
        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.endpoint.as_deref(), Some("http://monitor:9000"));
        assert_eq!(config.history_capacity(), 25);
        assert_eq!(config.missing_memory(), MissingMemoryPolicy::Omit);
        assert_eq!(config.reconnect.max_attempts, 0);
        // unspecified reconnect fields fall back to their defaults
        assert_eq!(config.reconnect.initial_backoff_ms, 1000);
    }

    #[test]
    fn test_load_toml_and_json_config() {
        let toml_file = write_config(".toml", "port = 9999\n[reconnect]\nmax_backoff_ms = 5000\n");
        let config = load_config(Some(toml_file.path())).unwrap();
        assert_eq!(config.port, Some(9999));
        assert_eq!(config.reconnect.max_backoff_ms, 5000);

        let json_file = write_config(".json", r#"{"idle_timeout_secs": 0}"#);
        let config = load_config(Some(json_file.path())).unwrap();
        assert_eq!(config.client_options().idle_timeout, None);
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let result = load_config(Some(Path::new("/nonexistent/sysmon-stream.yaml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_overrides_file() {
        let file = write_config(".yaml", "history_capacity: 25\nport: 1234\n");
        let path = file.path().to_str().unwrap().to_string();
        let args = Args::parse_from([
            "sysmon-stream",
            "--config",
            &path,
            "--history-capacity",
            "5",
            "--disable-metrics",
            "--log-level",
            "debug",
        ]);
        let config = resolve_config(&args).unwrap();
        assert_eq!(config.history_capacity(), 5);
        assert_eq!(config.port, Some(1234));
        assert_eq!(config.enable_metrics, Some(false));
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let zero = Config {
            history_capacity: Some(0),
            ..Config::default()
        };
        assert!(validate_effective_config(&zero).is_err());

        let bad_endpoint = Config {
            endpoint: Some("localhost:8080".into()),
            ..Config::default()
        };
        assert!(validate_effective_config(&bad_endpoint).is_err());

        let mut inverted = Config::default();
        inverted.reconnect.initial_backoff_ms = 10_000;
        inverted.reconnect.max_backoff_ms = 100;
        assert!(validate_effective_config(&inverted).is_err());

        let no_events = Config {
            event_names: Some(vec![]),
            ..Config::default()
        };
        assert!(validate_effective_config(&no_events).is_err());

        let bad_level = Config {
            log_level: Some("loud".into()),
            ..Config::default()
        };
        assert!(validate_effective_config(&bad_level).is_err());
    }

    #[test]
    fn test_render_all_formats() {
        let config = Config::default();
        for format in [ConfigFormat::Yaml, ConfigFormat::Json, ConfigFormat::Toml] {
            let rendered = render_config(&config, &format).unwrap();
            assert!(rendered.contains("history_capacity"));
        }
    }
}
