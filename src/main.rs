//! sysmon-stream - version 0.1.0
//!
//! Live system monitor stream client with rolling CPU/memory statistics.
//! This is the main entry point that starts the stream subscription, serves the
//! published state over HTTP and handles subcommands.

mod cli;
mod commands;
mod config;
mod handlers;
mod metrics;
mod state;

use axum::{routing::get, Router};
use clap::Parser;
use prometheus::Registry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use sysmon_stream::{HttpTransport, RollingAggregator, StreamClient};
use tokio::{net::TcpListener, signal};
use tracing::level_filters::LevelFilter;
use tracing::{debug, error, info};

use cli::{Args, Commands};
use commands::{command_check, command_config};
use config::{
    resolve_config, show_config, validate_effective_config, Config, DEFAULT_BIND_ADDR, DEFAULT_PORT,
};
use handlers::{config_handler, health_handler, metrics_handler, root_handler, snapshot_handler};
use metrics::StreamMetrics;
use state::{AppState, SharedState};

/// Initializes tracing logging subsystem with configured log level.
fn setup_logging(config: &Config) {
    let log_level = config
        .log_level
        .as_deref()
        .and_then(|level| level.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::INFO);

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return;
    }

    info!("Logging initialized with level: {}", log_level);
}

/// Helper function to load and validate configuration.
/// Exits the process with error code 1 if validation fails.
fn load_validated_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let config = resolve_config(args)?;
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }
    Ok(config)
}

/// Resolves once SIGINT or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

/// Main application entry point.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        return show_config(&config, &args.config_format);
    }

    // Handle subcommands
    if let Some(command) = &args.command {
        match command {
            Commands::Config {
                output,
                format,
                commented,
            } => {
                return command_config(output.clone(), format.clone(), *commented);
            }
            Commands::Check { timeout } => {
                let config = load_validated_config(&args)?;
                setup_logging(&config);
                return Ok(command_check(&config, *timeout).await?);
            }
        }
    }

    let config = load_validated_config(&args)?;
    setup_logging(&config);

    let bind_ip_str = config.bind.as_deref().unwrap_or(DEFAULT_BIND_ADDR).to_string();
    let port = config.port.unwrap_or(DEFAULT_PORT);
    let stream_url = config.stream_url();

    info!(
        "Starting sysmon-stream v{} (history_capacity={}, missing_memory={:?})",
        env!("CARGO_PKG_VERSION"),
        config.history_capacity(),
        config.missing_memory()
    );

    // Stream ingestion
    let aggregator = Arc::new(RollingAggregator::new(
        config.history_capacity(),
        config.missing_memory(),
    ));
    let transport = HttpTransport::new(config.connect_timeout())?;
    let client = StreamClient::new(transport, Arc::clone(&aggregator), config.client_options());
    client.on_connection_state_change(|state| info!(%state, "stream connection state changed"));
    client.on_sample(|sample| {
        debug!(
            cpu = sample.cpu_usage_percent,
            memory = ?sample.memory_usage_percent(),
            "sample received"
        )
    });
    let stats = client.stats();

    // Prometheus registry
    let registry = Registry::new();
    let metrics = StreamMetrics::new(&registry)?;

    let state: SharedState = Arc::new(AppState {
        registry,
        metrics,
        aggregator,
        client,
        stats,
        config: Arc::new(config.clone()),
        stream_url: stream_url.clone(),
        start_time: Instant::now(),
    });

    state.client.start(&stream_url);

    // Configure HTTP server routes
    let addr: SocketAddr = format!("{}:{}", bind_ip_str, port).parse()?;

    let mut app = Router::new()
        .route("/", get(root_handler))
        .route("/snapshot", get(snapshot_handler))
        .route("/config", get(config_handler));

    if config.enable_metrics.unwrap_or(true) {
        app = app.route("/metrics", get(metrics_handler));
    }
    if config.enable_health.unwrap_or(true) {
        app = app.route("/health", get(health_handler));
    }

    let app = app.with_state(state.clone());

    let listener = TcpListener::bind(addr).await?;
    info!(
        "sysmon-stream listening on http://{}:{}",
        bind_ip_str, port
    );

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

    let result = server.await;

    state.client.stop().await;

    if let Err(e) = result {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    info!("sysmon-stream stopped gracefully");
    Ok(())
}
