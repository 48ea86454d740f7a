//! Check command implementation.
//!
//! Validates the configuration, subscribes to the stream once and waits for
//! the first valid sample.

use anyhow::{bail, Context};
use std::sync::Arc;
use std::time::Duration;
use sysmon_stream::{HttpTransport, RollingAggregator, StreamClient};

use crate::config::{validate_effective_config, Config};

/// Connects to the configured stream and reports the first sample.
pub async fn command_check(config: &Config, timeout_secs: u64) -> anyhow::Result<()> {
    println!("🔍 sysmon-stream - Stream Check");
    println!("===============================");

    println!("\n⚙️  Checking configuration...");
    if let Err(e) = validate_effective_config(config) {
        bail!("configuration invalid: {e}");
    }
    println!("   ✅ Configuration is valid");

    let url = config.stream_url();
    println!("\n📡 Subscribing to {url} ...");

    let transport =
        HttpTransport::new(config.connect_timeout()).context("building HTTP transport")?;
    let aggregator = Arc::new(RollingAggregator::new(
        config.history_capacity(),
        config.missing_memory(),
    ));
    let client = StreamClient::new(transport, Arc::clone(&aggregator), config.client_options());

    let mut updates = aggregator.subscribe();
    client.start(&url);

    let waited = tokio::time::timeout(
        Duration::from_secs(timeout_secs),
        updates.wait_for(|snapshot| snapshot.has_data()),
    )
    .await;

    let outcome = match waited {
        Ok(Ok(snapshot)) => Ok(EngineSummary::from(&**snapshot)),
        Ok(Err(_)) => Err(anyhow::anyhow!("aggregator dropped before a sample arrived")),
        Err(_) => Err(anyhow::anyhow!(
            "no sample received within {timeout_secs}s (connection state: {}, transport errors: {})",
            client.connection_state(),
            client
                .stats()
                .transport_errors
                .load(std::sync::atomic::Ordering::Relaxed)
        )),
    };

    client.stop().await;

    let summary = outcome.with_context(|| format!("checking stream at {url}"))?;
    println!("   ✅ First sample received");
    println!("      cpu:    {:.1}%", summary.cpu);
    match summary.memory {
        Some(memory) => println!("      memory: {:.1}%", memory),
        None => println!("      memory: n/a"),
    }

    println!("\n📋 Summary:");
    println!("   ✅ Stream is reachable and delivering samples");
    Ok(())
}

struct EngineSummary {
    cpu: f64,
    memory: Option<f64>,
}

impl From<&sysmon_stream::EngineSnapshot> for EngineSummary {
    fn from(snapshot: &sysmon_stream::EngineSnapshot) -> Self {
        let latest = snapshot.history.last();
        Self {
            cpu: latest.map_or(0.0, |p| p.cpu_usage_percent),
            memory: latest.and_then(|p| p.memory_usage_percent),
        }
    }
}
