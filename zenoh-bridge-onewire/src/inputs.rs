//! Digital input watching.

use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thermosight_bridge_framework::{Publisher, Result, ShutdownCoordinator};
use tokio::sync::{mpsc, watch};

use crate::config::InputConfig;
use crate::gpio::{DEBOUNCE, EdgeEvent, GpioController, GpioError, InputLine};

/// Edge events buffered per input before the interrupt side waits.
const EVENT_QUEUE: usize = 32;

/// Last known value of every digital input.
///
/// Written by the input watchers, read by the poller's heartbeat. Clones
/// share the same state.
///
/// The `publish_*` and [`republish`](Self::republish) methods hold a per-alias
/// lock from reading or updating the value until the broker accepts it, so
/// the last payload published for an input is always its current value.
#[derive(Debug, Clone, Default)]
pub struct InputStates {
    values: Arc<RwLock<BTreeMap<String, u8>>>,
    publishing: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl InputStates {
    pub fn new() -> Self {
        Self::default()
    }

    fn alias_lock(&self, alias: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.publishing
            .lock()
            .entry(alias.to_string())
            .or_default()
            .clone()
    }

    pub fn get(&self, alias: &str) -> Option<u8> {
        self.values.read().get(alias).copied()
    }

    /// Record `value` for `alias`.
    pub fn set(&self, alias: impl Into<String>, value: u8) {
        self.values.write().insert(alias.into(), value);
    }

    /// Record `value` unless it equals the last known value.
    ///
    /// Returns `true` if the value changed.
    pub fn update_if_changed(&self, alias: &str, value: u8) -> bool {
        let mut values = self.values.write();
        match values.get(alias) {
            Some(current) if *current == value => false,
            _ => {
                values.insert(alias.to_string(), value);
                true
            }
        }
    }

    /// Forget `alias`, returning its last value.
    pub fn remove(&self, alias: &str) -> Option<u8> {
        self.values.write().remove(alias)
    }

    /// Record `value` for `alias` and publish it.
    pub async fn publish_initial(&self, publisher: &Publisher, alias: &str, value: u8) -> Result<()> {
        let lock = self.alias_lock(alias);
        let _guard = lock.lock().await;
        self.set(alias, value);
        publisher.publish(alias, f64::from(value)).await
    }

    /// Record and publish `value` if it differs from the last known value.
    ///
    /// Returns `None` when the value is unchanged and nothing was published.
    pub async fn publish_change(
        &self,
        publisher: &Publisher,
        alias: &str,
        value: u8,
    ) -> Option<Result<()>> {
        let lock = self.alias_lock(alias);
        let _guard = lock.lock().await;
        if !self.update_if_changed(alias, value) {
            return None;
        }
        Some(publisher.publish(alias, f64::from(value)).await)
    }

    /// Publish the current value of `alias` again.
    ///
    /// Returns `None` if the input has no known value.
    pub async fn republish(&self, publisher: &Publisher, alias: &str) -> Option<Result<()>> {
        let lock = self.alias_lock(alias);
        let _guard = lock.lock().await;
        let value = self.get(alias)?;
        Some(publisher.publish(alias, f64::from(value)).await)
    }

    /// Aliases of every known input, in order.
    pub fn aliases(&self) -> Vec<String> {
        self.values.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

/// Sets up the watch of one digital input.
pub struct InputWatcher {
    input: InputConfig,
    publisher: Publisher,
    states: InputStates,
}

impl InputWatcher {
    pub fn new(input: InputConfig, publisher: Publisher, states: InputStates) -> Self {
        Self {
            input,
            publisher,
            states,
        }
    }

    /// Claim the line and publish its current value.
    ///
    /// Once the claim succeeds a callback releasing the line is registered
    /// with `coordinator`, so the line is handed back on shutdown even if a
    /// later step fails. The returned task consumes edge events until
    /// `shutdown` fires.
    pub async fn start(
        self,
        gpio: &dyn GpioController,
        coordinator: &ShutdownCoordinator,
        shutdown: watch::Receiver<bool>,
    ) -> std::result::Result<InputTask, GpioError> {
        let alias = self.input.alias.clone();
        let pin = self.input.gpio;

        let line = gpio.claim(pin, DEBOUNCE)?;

        let release = line.clone();
        coordinator.register(format!("gpio{}", pin), move || release.release());

        match line.read() {
            Ok(value) => {
                tracing::info!(alias = %alias, gpio = pin, value, "Input claimed");
                if let Err(e) = self.states.publish_initial(&self.publisher, &alias, value).await {
                    tracing::warn!(alias = %alias, error = %e, "Failed to publish input");
                }
            }
            Err(e) => {
                tracing::error!(alias = %alias, gpio = pin, error = %e, "Failed to read input");
            }
        }

        let (tx, rx) = mpsc::channel(EVENT_QUEUE);
        if let Err(e) = line.subscribe(tx) {
            // The heartbeat must not keep reporting an input nobody watches.
            self.states.remove(&alias);
            return Err(e);
        }

        Ok(InputTask {
            alias,
            line,
            events: rx,
            publisher: self.publisher,
            states: self.states,
            shutdown,
        })
    }
}

/// Consumes the edge events of one claimed input.
pub struct InputTask {
    alias: String,
    line: Arc<dyn InputLine>,
    events: mpsc::Receiver<EdgeEvent>,
    publisher: Publisher,
    states: InputStates,
    shutdown: watch::Receiver<bool>,
}

impl InputTask {
    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn pin(&self) -> u8 {
        self.line.pin()
    }

    /// Handle events until shutdown or until the line stops delivering them.
    pub async fn run(mut self) {
        tracing::debug!(alias = %self.alias, gpio = self.pin(), "Watching input");

        while !*self.shutdown.borrow() {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => {
                        self.handle(event).await;
                    }
                    None => {
                        tracing::debug!(alias = %self.alias, "Input event stream closed");
                        break;
                    }
                },
                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::debug!(alias = %self.alias, "Stopped watching input");
    }

    /// Handle one edge event.
    ///
    /// Returns `true` if a value was published.
    pub async fn handle(&self, event: EdgeEvent) -> bool {
        let value = match event {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(alias = %self.alias, error = %e, "Error watching input");
                return false;
            }
        };

        match self.states.publish_change(&self.publisher, &self.alias, value).await {
            None => false,
            Some(result) => {
                tracing::debug!(alias = %self.alias, value, "Input changed");
                if let Err(e) = result {
                    tracing::warn!(alias = %self.alias, error = %e, "Failed to publish input");
                }
                true
            }
        }
    }
}

/// Start a watcher for every input.
///
/// Inputs that cannot be claimed or subscribed are logged and skipped; the
/// rest are returned ready to run.
pub async fn start_watchers(
    inputs: &[InputConfig],
    gpio: &dyn GpioController,
    publisher: &Publisher,
    states: &InputStates,
    coordinator: &ShutdownCoordinator,
    shutdown: &watch::Receiver<bool>,
) -> Vec<InputTask> {
    let mut tasks = Vec::with_capacity(inputs.len());

    for input in inputs {
        let watcher = InputWatcher::new(input.clone(), publisher.clone(), states.clone());
        match watcher.start(gpio, coordinator, shutdown.clone()).await {
            Ok(task) => tasks.push(task),
            Err(e) => {
                tracing::error!(
                    alias = %input.alias,
                    gpio = input.gpio,
                    error = %e,
                    "Failed to watch input"
                );
            }
        }
    }

    tasks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::SimulatedGpio;
    use thermosight_bridge_framework::{MemoryBroker, ValueCache};

    fn input(gpio: u8, alias: &str) -> InputConfig {
        InputConfig {
            gpio,
            alias: alias.to_string(),
        }
    }

    fn publisher(broker: &MemoryBroker) -> Publisher {
        Publisher::new(Arc::new(broker.clone()), "house", ValueCache::new())
    }

    #[test]
    fn test_update_if_changed() {
        let states = InputStates::new();
        assert!(states.update_if_changed("door", 1));
        assert!(!states.update_if_changed("door", 1));
        assert!(states.update_if_changed("door", 0));
        assert_eq!(states.get("door"), Some(0));
        assert_eq!(states.aliases(), vec!["door".to_string()]);
        assert_eq!(states.len(), 1);
    }

    #[tokio::test]
    async fn test_edges_are_deduplicated() {
        let broker = MemoryBroker::new();
        let gpio = SimulatedGpio::new();
        let coordinator = ShutdownCoordinator::new();
        let (_tx, rx) = watch::channel(false);

        let watcher = InputWatcher::new(input(17, "door"), publisher(&broker), InputStates::new());
        let task = watcher.start(&gpio, &coordinator, rx).await.unwrap();

        // Initial read (level 0) is always published.
        assert_eq!(broker.payloads_for("house/door"), vec!["0"]);
        broker.clear();

        let mut published = 0;
        for value in [1, 1, 0, 0, 1] {
            if task.handle(Ok(value)).await {
                published += 1;
            }
        }

        assert_eq!(published, 3);
        assert_eq!(broker.payloads_for("house/door"), vec!["1", "0", "1"]);
    }

    #[tokio::test]
    async fn test_error_event_keeps_watching() {
        let broker = MemoryBroker::new();
        let gpio = SimulatedGpio::new();
        let coordinator = ShutdownCoordinator::new();
        let (tx, rx) = watch::channel(false);

        let watcher = InputWatcher::new(input(4, "pump"), publisher(&broker), InputStates::new());
        let task = watcher.start(&gpio, &coordinator, rx).await.unwrap();
        let handle = tokio::spawn(task.run());

        let line = gpio.line(4).unwrap();
        assert!(line.emit_error("bus glitch"));
        assert!(line.emit(1));

        for _ in 0..50 {
            if broker.len() == 2 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(broker.payloads_for("house/pump"), vec!["0", "1"]);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_claim_registers_release() {
        let broker = MemoryBroker::new();
        let gpio = SimulatedGpio::new();
        let coordinator = ShutdownCoordinator::new();
        let (_tx, rx) = watch::channel(false);

        InputWatcher::new(input(27, "door"), publisher(&broker), InputStates::new())
            .start(&gpio, &coordinator, rx)
            .await
            .unwrap();

        assert_eq!(coordinator.pending(), 1);
        assert!(coordinator.shutdown().is_clean());
        assert!(gpio.line(27).unwrap().is_released());
    }

    #[tokio::test]
    async fn test_failed_claim_skips_input() {
        let broker = MemoryBroker::new();
        let gpio = SimulatedGpio::new();
        gpio.break_pin(22);
        let coordinator = ShutdownCoordinator::new();
        let (_tx, rx) = watch::channel(false);
        let states = InputStates::new();

        let tasks = start_watchers(
            &[input(22, "broken"), input(23, "window")],
            &gpio,
            &publisher(&broker),
            &states,
            &coordinator,
            &rx,
        )
        .await;

        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].alias(), "window");
        assert_eq!(tasks[0].pin(), 23);
        assert_eq!(coordinator.pending(), 1);
        assert_eq!(states.get("window"), Some(0));
        assert_eq!(states.get("broken"), None);
    }

    #[tokio::test]
    async fn test_failed_subscribe_forgets_input() {
        let broker = MemoryBroker::new();
        let gpio = SimulatedGpio::new();
        gpio.refuse_events(6);
        let coordinator = ShutdownCoordinator::new();
        let (_tx, rx) = watch::channel(false);
        let states = InputStates::new();

        let result = InputWatcher::new(input(6, "door"), publisher(&broker), states.clone())
            .start(&gpio, &coordinator, rx)
            .await;

        assert!(matches!(result, Err(GpioError::Subscribe { pin: 6, .. })));
        assert_eq!(states.get("door"), None);
        assert!(states.is_empty());
        // The claimed line is still released on shutdown.
        assert_eq!(coordinator.pending(), 1);
        assert!(coordinator.shutdown().is_clean());
        assert!(gpio.line(6).unwrap().is_released());
    }

    #[tokio::test]
    async fn test_publish_change_and_republish() {
        let broker = MemoryBroker::new();
        let publisher = publisher(&broker);
        let states = InputStates::new();

        assert!(states.republish(&publisher, "door").await.is_none());
        states.publish_initial(&publisher, "door", 0).await.unwrap();
        assert!(states.publish_change(&publisher, "door", 0).await.is_none());
        assert!(states.publish_change(&publisher, "door", 1).await.unwrap().is_ok());
        assert!(states.republish(&publisher, "door").await.unwrap().is_ok());

        assert_eq!(broker.payloads_for("house/door"), vec!["0", "1", "1"]);
        assert_eq!(publisher.cache().get("door"), Some(1.0));
        assert_eq!(states.aliases(), vec!["door".to_string()]);
        assert_eq!(states.remove("door"), Some(1));
    }

    #[tokio::test]
    async fn test_run_stops_when_events_close() {
        let broker = MemoryBroker::new();
        let gpio = SimulatedGpio::new();
        let coordinator = ShutdownCoordinator::new();
        let (_tx, rx) = watch::channel(false);

        let task = InputWatcher::new(input(5, "door"), publisher(&broker), InputStates::new())
            .start(&gpio, &coordinator, rx)
            .await
            .unwrap();
        let handle = tokio::spawn(task.run());

        coordinator.shutdown();
        handle.await.unwrap();
    }
}
