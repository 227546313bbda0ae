//! Ordered, run-once registry of cleanup callbacks.
//!
//! Components that claim a releasable resource (a GPIO line, a device
//! handle) register a callback here when the claim succeeds. On termination
//! the runner calls [`ShutdownCoordinator::shutdown`] once; every callback is
//! invoked in registration order and its outcome recorded, whether or not
//! earlier callbacks failed.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::BridgeError;

/// Error type returned by cleanup callbacks.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

type Callback = Box<dyn FnOnce() -> Result<(), CallbackError> + Send>;

/// Process-wide registry of cleanup callbacks.
///
/// Clones share the same registry.
#[derive(Clone, Default)]
pub struct ShutdownCoordinator {
    inner: Arc<Mutex<Registry>>,
}

#[derive(Default)]
struct Registry {
    callbacks: Vec<(String, Callback)>,
    finished: bool,
}

impl std::fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.inner.lock();
        f.debug_struct("ShutdownCoordinator")
            .field("pending", &registry.callbacks.len())
            .field("finished", &registry.finished)
            .finish()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cleanup callback.
    ///
    /// If shutdown already ran, the callback is invoked immediately so the
    /// resource it guards is still released.
    pub fn register<F, E>(&self, name: impl Into<String>, callback: F)
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
        E: Into<CallbackError>,
    {
        let name = name.into();
        let callback: Callback = Box::new(move || callback().map_err(Into::into));

        let late = {
            let mut registry = self.inner.lock();
            if registry.finished {
                Some(callback)
            } else {
                tracing::debug!(callback = %name, "Registered shutdown callback");
                registry.callbacks.push((name.clone(), callback));
                None
            }
        };

        if let Some(callback) = late {
            tracing::warn!(callback = %name, "Shutdown already ran, releasing immediately");
            let outcome = run_callback(name, callback);
            outcome.log();
        }
    }

    /// Number of callbacks waiting for shutdown.
    pub fn pending(&self) -> usize {
        self.inner.lock().callbacks.len()
    }

    /// Whether [`shutdown`](Self::shutdown) has already run.
    pub fn is_finished(&self) -> bool {
        self.inner.lock().finished
    }

    /// Run every registered callback once.
    ///
    /// Failures and panics are caught per callback, logged, and recorded in
    /// the report; they never prevent the remaining callbacks from running.
    /// Calling this a second time does nothing and returns an empty report.
    pub fn shutdown(&self) -> ShutdownReport {
        let callbacks = {
            let mut registry = self.inner.lock();
            if registry.finished {
                tracing::debug!("Shutdown already completed");
                return ShutdownReport::default();
            }
            registry.finished = true;
            std::mem::take(&mut registry.callbacks)
        };

        tracing::info!(callbacks = callbacks.len(), "Running shutdown callbacks");

        let outcomes = callbacks
            .into_iter()
            .map(|(name, callback)| {
                let outcome = run_callback(name, callback);
                outcome.log();
                outcome
            })
            .collect();

        ShutdownReport { outcomes }
    }
}

fn run_callback(name: String, callback: Callback) -> CallbackOutcome {
    let result = match catch_unwind(AssertUnwindSafe(callback)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(BridgeError::ShutdownCallback {
            name: name.clone(),
            message: e.to_string(),
        }),
        Err(panic) => Err(BridgeError::ShutdownCallback {
            name: name.clone(),
            message: panic_message(panic.as_ref()),
        }),
    };

    CallbackOutcome { name, result }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", msg)
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("panicked: {}", msg)
    } else {
        "panicked".to_string()
    }
}

/// Outcome of one cleanup callback.
#[derive(Debug)]
pub struct CallbackOutcome {
    pub name: String,
    pub result: Result<(), BridgeError>,
}

impl CallbackOutcome {
    fn log(&self) {
        match &self.result {
            Ok(()) => tracing::debug!(callback = %self.name, "Shutdown callback completed"),
            Err(e) => tracing::error!(callback = %self.name, error = %e, "Error in shutdown callback"),
        }
    }
}

/// Outcomes of a shutdown run, in registration order.
#[derive(Debug, Default)]
pub struct ShutdownReport {
    pub outcomes: Vec<CallbackOutcome>,
}

impl ShutdownReport {
    /// Number of callbacks that were invoked.
    pub fn invoked(&self) -> usize {
        self.outcomes.len()
    }

    /// Callbacks that failed.
    pub fn failures(&self) -> impl Iterator<Item = &CallbackOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }

    /// Whether every callback succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }
}
