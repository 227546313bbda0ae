//! Zenoh bridge for 1-wire temperature probes and GPIO inputs.
//!
//! Loads `configs/<hostname>.json5` (or `--config`), connects to the broker,
//! then polls the probes and watches the inputs until SIGINT/SIGTERM.

use anyhow::{Context, Result};
use std::sync::Arc;
use thermosight_bridge_framework::{BridgeArgs, BridgeConfig, BridgeRunner};

use zenoh_bridge_onewire::config::OneWireBridgeConfig;
use zenoh_bridge_onewire::gpio;
use zenoh_bridge_onewire::{InputStates, Poller, SensorReader, W1Bus, start_watchers};

#[tokio::main]
async fn main() -> Result<()> {
    let args = BridgeArgs::parse();

    let path = args
        .config_path()
        .context("Failed to determine host name")?;
    let config = OneWireBridgeConfig::load(&path)
        .with_context(|| format!("Failed to load config from {:?}", path))?;

    let mut runner = BridgeRunner::new_with_args("onewire", config, Some(&args))
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    tracing::info!(config = %path.display(), "Loaded configuration");

    for alias in runner.config().duplicate_aliases() {
        tracing::warn!(alias = %alias, "Alias is used more than once, last write wins");
    }

    let publisher = runner.publisher();
    let inputs = InputStates::new();

    // Watchers publish their initial values before the first poll cycle.
    let gpio = gpio::default_controller();
    let tasks = start_watchers(
        &runner.config().inputs,
        gpio.as_ref(),
        &publisher,
        &inputs,
        &runner.shutdown_coordinator(),
        &runner.shutdown_signal(),
    )
    .await;
    for task in tasks {
        runner.spawn(task.run());
    }

    let config = runner.config();
    let reader = SensorReader::new(Arc::new(W1Bus::new(&config.w1_root)), config.read_timeout());
    let poller = Poller::from_config(config, reader, publisher, inputs);
    let shutdown = runner.shutdown_signal();
    runner.spawn(poller.run(shutdown));

    let config = runner.config();
    let metadata = serde_json::json!({
        "sensors": config.sensors.iter().map(|s| &s.alias).collect::<Vec<_>>(),
        "processes": config.processes.iter().map(|p| &p.alias).collect::<Vec<_>>(),
        "inputs": config.inputs.iter().map(|i| &i.alias).collect::<Vec<_>>(),
        "poll_interval_ms": config.poll_interval_ms,
    });

    runner
        .run_with_metadata(Some(metadata))
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))
}
