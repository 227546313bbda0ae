//! Periodic sensor polling and derived metric evaluation.

use std::sync::Arc;
use std::time::Duration;
use thermosight_bridge_framework::Publisher;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::{OneWireBridgeConfig, ProcessConfig, SensorConfig};
use crate::inputs::InputStates;
use crate::process::{ProcessError, ProcessRegistry};
use crate::sensor::SensorReader;

/// Outcome counts of one poll cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleStats {
    /// Values handed to the broker successfully.
    pub published: usize,
    /// Sensors that produced no reading.
    pub read_failures: usize,
    /// Processes that produced no value.
    pub process_failures: usize,
    /// Values the broker did not accept.
    pub publish_failures: usize,
}

impl CycleStats {
    /// Every failure in the cycle.
    pub fn failed(&self) -> usize {
        self.read_failures + self.process_failures + self.publish_failures
    }
}

/// Reads every sensor, evaluates every process and re-publishes every known
/// input, once per cycle.
pub struct Poller {
    sensors: Vec<SensorConfig>,
    processes: Vec<ProcessConfig>,
    registry: Arc<ProcessRegistry>,
    reader: SensorReader,
    publisher: Publisher,
    inputs: InputStates,
    interval: Option<Duration>,
}

impl Poller {
    /// Create a poller with no sensors or processes that runs a single cycle.
    pub fn new(reader: SensorReader, publisher: Publisher, inputs: InputStates) -> Self {
        Self {
            sensors: Vec::new(),
            processes: Vec::new(),
            registry: Arc::new(ProcessRegistry::with_builtins()),
            reader,
            publisher,
            inputs,
            interval: None,
        }
    }

    /// Create a poller for the sensors, processes and interval of `config`.
    pub fn from_config(
        config: &OneWireBridgeConfig,
        reader: SensorReader,
        publisher: Publisher,
        inputs: InputStates,
    ) -> Self {
        Self::new(reader, publisher, inputs)
            .with_sensors(config.sensors.clone())
            .with_processes(config.processes.clone())
            .with_interval(config.poll_interval())
    }

    pub fn with_sensors(mut self, sensors: Vec<SensorConfig>) -> Self {
        self.sensors = sensors;
        self
    }

    pub fn with_processes(mut self, processes: Vec<ProcessConfig>) -> Self {
        self.processes = processes;
        self
    }

    pub fn with_registry(mut self, registry: Arc<ProcessRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Delay between the end of one cycle and the start of the next.
    /// `None` runs a single cycle.
    pub fn with_interval(mut self, interval: Option<Duration>) -> Self {
        self.interval = interval;
        self
    }

    /// Poll until `shutdown` fires.
    ///
    /// A cycle in progress when shutdown is requested runs to completion.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            sensors = self.sensors.len(),
            processes = self.processes.len(),
            interval_ms = self.interval.map(|i| i.as_millis() as u64),
            "Starting poller"
        );

        while !*shutdown.borrow() {
            let stats = self.poll_once().await;
            debug!(
                published = stats.published,
                failed = stats.failed(),
                "Poll cycle complete"
            );

            let Some(interval) = self.interval else {
                info!("No poll interval configured, stopping after one cycle");
                break;
            };

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        debug!("Poller stopped");
    }

    /// Run one cycle: sensors first, then processes, then the input heartbeat.
    pub async fn poll_once(&self) -> CycleStats {
        let mut stats = CycleStats::default();

        for sensor in &self.sensors {
            match self.reader.read(&sensor.id).await {
                Ok(value) => self.publish(&sensor.alias, value, &mut stats).await,
                Err(e) => {
                    stats.read_failures += 1;
                    warn!(
                        id = %sensor.id,
                        alias = %sensor.alias,
                        error = %e,
                        "Failed to read temperature"
                    );
                }
            }
        }

        // Processes see this cycle's sensor values through the cache.
        for process in &self.processes {
            match self.registry.evaluate(process, self.publisher.cache()) {
                Ok(value) => self.publish(&process.alias, value, &mut stats).await,
                Err(e @ ProcessError::UnrecognizedType(_)) => {
                    stats.process_failures += 1;
                    error!(alias = %process.alias, error = %e, "Unrecognised process type");
                }
                Err(e) => {
                    stats.process_failures += 1;
                    warn!(
                        alias = %process.alias,
                        kind = %process.kind,
                        error = %e,
                        "Failed to calculate process"
                    );
                }
            }
        }

        // Each input is re-read under its lock so a concurrent edge is never
        // overwritten by an older value.
        for alias in self.inputs.aliases() {
            if let Some(result) = self.inputs.republish(&self.publisher, &alias).await {
                Self::count(&alias, result, &mut stats);
            }
        }

        stats
    }

    async fn publish(&self, alias: &str, value: f64, stats: &mut CycleStats) {
        Self::count(alias, self.publisher.publish(alias, value).await, stats);
    }

    fn count(alias: &str, result: thermosight_bridge_framework::Result<()>, stats: &mut CycleStats) {
        match result {
            Ok(()) => stats.published += 1,
            Err(e) => {
                stats.publish_failures += 1;
                warn!(alias = %alias, error = %e, "Failed to publish");
            }
        }
    }
}
