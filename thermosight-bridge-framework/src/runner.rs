//! Bridge runner for lifecycle management.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use thermosight_common::{connect_with_credentials, init_tracing};

use crate::BridgeArgs;
use crate::broker::Broker;
use crate::cache::ValueCache;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::publisher::Publisher;
use crate::shutdown::{ShutdownCoordinator, ShutdownReport};
use crate::status::StatusPublisher;

/// Time given to workers to finish their current cycle after shutdown is signalled.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Bridge runner that manages the lifecycle of a sensor bridge.
///
/// Handles:
/// - Logging initialization
/// - Zenoh connection
/// - Task spawning and management
/// - Graceful shutdown on SIGINT/SIGTERM, including hardware release
/// - Status publishing (optional)
///
/// # Example
///
/// ```ignore
/// use thermosight_bridge_framework::{BridgeArgs, BridgeConfig, BridgeRunner};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let args = BridgeArgs::parse();
///     let config = MyBridgeConfig::load(args.config_path()?)?;
///
///     let mut runner = BridgeRunner::new_with_args("mybridge", config, Some(&args)).await?;
///
///     let publisher = runner.publisher();
///     let shutdown = runner.shutdown_signal();
///     runner.spawn(async move {
///         // Worker logic here, exits when `shutdown` flips to true
///     });
///
///     runner.run().await
/// }
/// ```
pub struct BridgeRunner<C: BridgeConfig> {
    /// Bridge name for logging and status.
    name: String,
    /// Bridge version.
    version: String,
    /// The loaded configuration.
    config: C,
    /// Zenoh session.
    session: Arc<zenoh::Session>,
    /// Publisher for readings.
    publisher: Publisher,
    /// Status publisher (optional).
    status_publisher: Option<StatusPublisher>,
    /// Cleanup callbacks for claimed hardware.
    coordinator: ShutdownCoordinator,
    /// Broadcasts the shutdown request to workers.
    shutdown_tx: watch::Sender<bool>,
    /// Spawned tasks.
    tasks: Vec<JoinHandle<()>>,
    /// How long workers get to finish after shutdown is signalled.
    grace_period: Duration,
}

impl<C: BridgeConfig> BridgeRunner<C> {
    /// Create a new bridge runner.
    ///
    /// This will:
    /// 1. Initialize logging based on config
    /// 2. Connect to Zenoh
    /// 3. Create the publisher and its value cache
    pub async fn new(name: impl Into<String>, config: C) -> Result<Self> {
        Self::new_with_args(name, config, None).await
    }

    /// Create a new bridge runner with CLI args for log level override.
    pub async fn new_with_args(
        name: impl Into<String>,
        config: C,
        args: Option<&BridgeArgs>,
    ) -> Result<Self> {
        let name = name.into();
        let version = env!("CARGO_PKG_VERSION").to_string();

        let cli_level = args.and_then(|a| a.log_level.as_deref());
        let log_config = config.effective_logging(cli_level);
        init_tracing(&log_config)?;

        tracing::info!(bridge = %name, version = %version, "Starting bridge");

        // Nothing may start before the broker session is up.
        let credentials = config.credentials();
        let session = Arc::new(
            connect_with_credentials(&config.zenoh(), credentials.as_ref())
                .await
                .map_err(|e| BridgeError::ZenohConnection(e.to_string()))?,
        );

        tracing::info!(zid = %session.zid(), "Connected to Zenoh");

        let broker: Arc<dyn Broker> = session.clone();
        let publisher = Publisher::new(broker, config.base_topic(), ValueCache::new())
            .with_timeout(config.publish_timeout());

        let status_publisher = config
            .publish_status()
            .then(|| StatusPublisher::new(publisher.clone(), &name, &version));

        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            name,
            version,
            config,
            session,
            publisher,
            status_publisher,
            coordinator: ShutdownCoordinator::new(),
            shutdown_tx,
            tasks: Vec::new(),
            grace_period: DEFAULT_GRACE_PERIOD,
        })
    }

    /// Change how long workers get to finish after shutdown is signalled.
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Get the bridge name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the bridge version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &C {
        &self.config
    }

    /// Get a reference to the Zenoh session.
    pub fn session(&self) -> &Arc<zenoh::Session> {
        &self.session
    }

    /// Get a clone of the publisher.
    pub fn publisher(&self) -> Publisher {
        self.publisher.clone()
    }

    /// Get the value cache shared by every worker.
    pub fn cache(&self) -> ValueCache {
        self.publisher.cache().clone()
    }

    /// Get the registry for hardware cleanup callbacks.
    pub fn shutdown_coordinator(&self) -> ShutdownCoordinator {
        self.coordinator.clone()
    }

    /// Receiver that flips to `true` once shutdown is requested.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Spawn a worker task.
    ///
    /// The task is awaited on shutdown for up to the grace period, then aborted.
    pub fn spawn<F>(&mut self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        self.tasks.push(handle);
    }

    /// Run the bridge until SIGINT or SIGTERM is received.
    ///
    /// This will:
    /// 1. Publish "running" status (if enabled)
    /// 2. Wait for a termination signal
    /// 3. Tell workers to stop and give them the grace period to finish
    /// 4. Run the shutdown callbacks (hardware release)
    /// 5. Publish "offline" status (if enabled)
    /// 6. Close the Zenoh session
    pub async fn run(self) -> Result<()> {
        self.run_with_metadata(None).await
    }

    /// Run the bridge with custom status metadata.
    pub async fn run_with_metadata(self, metadata: Option<serde_json::Value>) -> Result<()> {
        if let Some(ref status_pub) = self.status_publisher {
            if let Err(e) = status_pub.publish_running(metadata).await {
                tracing::warn!(error = %e, "Failed to publish running status");
            }
        }

        tracing::info!(
            bridge = %self.name,
            tasks = self.tasks.len(),
            "Bridge running. Press Ctrl+C to stop."
        );

        wait_for_termination().await;

        tracing::info!(bridge = %self.name, "Received shutdown signal");

        let report = stop(
            &self.shutdown_tx,
            self.tasks,
            &self.coordinator,
            self.grace_period,
        )
        .await;

        if !report.is_clean() {
            tracing::warn!(
                failed = report.failures().count(),
                invoked = report.invoked(),
                "Some shutdown callbacks failed"
            );
        }

        if let Some(ref status_pub) = self.status_publisher {
            if let Err(e) = status_pub.publish_offline().await {
                tracing::warn!(error = %e, "Failed to publish offline status");
            }
        }

        if let Err(e) = self.session.close().await {
            tracing::warn!(error = %e, "Error closing Zenoh session");
        }

        tracing::info!(bridge = %self.name, "Goodbye!");

        Ok(())
    }
}

/// Wait for Ctrl+C or, on Unix, SIGTERM.
pub async fn wait_for_termination() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C");
        }
        _ = sigterm() => {
            tracing::info!("Received SIGTERM");
        }
    }
}

#[cfg(unix)]
async fn sigterm() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn sigterm() {
    std::future::pending::<()>().await;
}

/// Stop workers and release hardware.
///
/// Signals shutdown, waits up to `grace_period` for the workers to finish
/// their in-flight work, aborts the stragglers, then runs the cleanup
/// callbacks exactly once.
pub async fn stop(
    shutdown_tx: &watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    coordinator: &ShutdownCoordinator,
    grace_period: Duration,
) -> ShutdownReport {
    // Receivers may all be gone already; that is fine.
    let _ = shutdown_tx.send(true);

    let aborts: Vec<_> = tasks.iter().map(|t| t.abort_handle()).collect();
    let drained = tokio::time::timeout(grace_period, async {
        for task in tasks {
            if let Err(e) = task.await {
                if e.is_panic() {
                    tracing::error!(error = %e, "Worker panicked");
                }
            }
        }
    })
    .await;

    if drained.is_err() {
        tracing::warn!(
            grace_ms = grace_period.as_millis() as u64,
            "Workers did not stop in time, aborting"
        );
        for abort in aborts {
            abort.abort();
        }
    }

    coordinator.shutdown()
}
