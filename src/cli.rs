//! CLI arguments and subcommands for sysmon-stream.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Configuration format options for output
#[derive(Debug, Clone, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Policy for samples that arrive without memory info
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum MissingMemoryArg {
    TreatAsZero,
    Omit,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "sysmon-stream",
    about = "Live system monitor stream client with rolling CPU/memory statistics",
    long_about = "Live system monitor stream client with rolling CPU/memory statistics.\n\n\
                  Subscribes to a system monitor's server-sent events feed, keeps a bounded \
                  history of recent CPU and memory samples, and serves the current history, \
                  aggregates and connection state as JSON, plain text and Prometheus metrics.",
    version,
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Base URL of the system monitor (e.g. http://localhost:8080)
    #[arg(short = 'e', long)]
    pub endpoint: Option<String>,

    /// Path of the event stream below the endpoint
    #[arg(long)]
    pub stream_path: Option<String>,

    /// Number of samples kept in the history window
    #[arg(long)]
    pub history_capacity: Option<usize>,

    /// How samples without memory info enter the memory aggregates
    #[arg(long, value_enum)]
    pub missing_memory: Option<MissingMemoryArg>,

    /// Give up after this many consecutive failed reconnects (0 = never)
    #[arg(long)]
    pub max_reconnect_attempts: Option<u32>,

    /// HTTP listen port
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Bind to specific interface/IP
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Log level (overrides log_level from the config file) [default: info]
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Disable /health endpoint
    #[arg(long)]
    pub disable_health: bool,

    /// Disable /metrics endpoint
    #[arg(long)]
    pub disable_metrics: bool,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect to the stream once and wait for the first valid sample
    Check {
        /// Seconds to wait for a sample before failing
        #[arg(short = 't', long, default_value_t = 10)]
        timeout: u64,
    },

    /// Generate configuration files
    Config {
        /// Output file path ("-" for stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },
}
