//! Digital input lines.
//!
//! [`GpioController`] claims a pin as an input with edge detection on both
//! edges; the returned [`InputLine`] can be read, subscribed to and released.
//! On a Raspberry Pi the controller is backed by `rppal` (cargo feature
//! `gpio`); without it every claim fails with [`GpioError::Unavailable`].

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Debounce applied to edge detection.
pub const DEBOUNCE: Duration = Duration::from_millis(10);

/// GPIO errors.
#[derive(Debug, Clone, Error)]
pub enum GpioError {
    #[error("GPIO unavailable: {0}")]
    Unavailable(String),
    #[error("Failed to claim GPIO {pin}: {message}")]
    Claim { pin: u8, message: String },
    #[error("Failed to read GPIO {pin}: {message}")]
    Read { pin: u8, message: String },
    #[error("Failed to watch GPIO {pin}: {message}")]
    Subscribe { pin: u8, message: String },
    #[error("Failed to release GPIO {pin}: {message}")]
    Release { pin: u8, message: String },
    #[error("Error watching GPIO {pin}: {message}")]
    HardwareEvent { pin: u8, message: String },
}

/// New input value (0 or 1) or a hardware error, delivered per edge.
pub type EdgeEvent = Result<u8, GpioError>;

/// A claimed input line.
pub trait InputLine: Send + Sync {
    /// BCM pin number.
    fn pin(&self) -> u8;

    /// Current level, 0 or 1.
    fn read(&self) -> Result<u8, GpioError>;

    /// Deliver every debounced edge to `events`.
    fn subscribe(&self, events: mpsc::Sender<EdgeEvent>) -> Result<(), GpioError>;

    /// Stop edge detection and hand the pin back. Releasing twice is a no-op.
    fn release(&self) -> Result<(), GpioError>;
}

/// Claims input lines.
pub trait GpioController: Send + Sync {
    /// Claim `pin` as an input with edge detection on both edges.
    fn claim(&self, pin: u8, debounce: Duration) -> Result<Arc<dyn InputLine>, GpioError>;
}

/// Controller whose claims always fail.
#[derive(Debug, Clone)]
pub struct UnavailableGpio {
    reason: String,
}

impl UnavailableGpio {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl GpioController for UnavailableGpio {
    fn claim(&self, _pin: u8, _debounce: Duration) -> Result<Arc<dyn InputLine>, GpioError> {
        Err(GpioError::Unavailable(self.reason.clone()))
    }
}

#[cfg(feature = "gpio")]
mod raspberry_pi {
    use super::*;
    use rppal::gpio::{Event, Gpio, InputPin, Level, Trigger};

    /// Raspberry Pi GPIO controller using rppal.
    pub struct RppalGpio {
        gpio: Gpio,
    }

    impl RppalGpio {
        pub fn new() -> Result<Self, GpioError> {
            let gpio = Gpio::new().map_err(|e| GpioError::Unavailable(e.to_string()))?;
            Ok(Self { gpio })
        }
    }

    impl GpioController for RppalGpio {
        fn claim(&self, pin: u8, debounce: Duration) -> Result<Arc<dyn InputLine>, GpioError> {
            let input = self
                .gpio
                .get(pin)
                .map_err(|e| GpioError::Claim {
                    pin,
                    message: e.to_string(),
                })?
                .into_input();

            Ok(Arc::new(RppalLine {
                pin,
                debounce,
                input: Mutex::new(Some(input)),
            }))
        }
    }

    struct RppalLine {
        pin: u8,
        debounce: Duration,
        input: Mutex<Option<InputPin>>,
    }

    fn level_value(level: Level) -> u8 {
        match level {
            Level::High => 1,
            Level::Low => 0,
        }
    }

    impl InputLine for RppalLine {
        fn pin(&self) -> u8 {
            self.pin
        }

        fn read(&self) -> Result<u8, GpioError> {
            match self.input.lock().as_ref() {
                Some(input) => Ok(level_value(input.read())),
                None => Err(GpioError::Read {
                    pin: self.pin,
                    message: "line released".to_string(),
                }),
            }
        }

        fn subscribe(&self, events: mpsc::Sender<EdgeEvent>) -> Result<(), GpioError> {
            let pin = self.pin;
            let mut guard = self.input.lock();
            let input = guard.as_mut().ok_or_else(|| GpioError::Subscribe {
                pin,
                message: "line released".to_string(),
            })?;

            // Runs on rppal's interrupt thread, outside the runtime.
            let callback = move |event: Event| {
                let value = match event.trigger {
                    Trigger::RisingEdge => Ok(1),
                    Trigger::FallingEdge => Ok(0),
                    other => Err(GpioError::HardwareEvent {
                        pin,
                        message: format!("unexpected trigger {:?}", other),
                    }),
                };
                // The receiver is gone once the watcher stopped.
                let _ = events.blocking_send(value);
            };

            input
                .set_async_interrupt(Trigger::Both, Some(self.debounce), callback)
                .map_err(|e| GpioError::Subscribe {
                    pin,
                    message: e.to_string(),
                })
        }

        fn release(&self) -> Result<(), GpioError> {
            let Some(mut input) = self.input.lock().take() else {
                return Ok(());
            };

            // Dropping the pin resets it to its original mode.
            input.clear_async_interrupt().map_err(|e| GpioError::Release {
                pin: self.pin,
                message: e.to_string(),
            })
        }
    }
}

#[cfg(feature = "gpio")]
pub use raspberry_pi::RppalGpio;

/// Controller for the host the bridge runs on.
///
/// Falls back to [`UnavailableGpio`] when the GPIO peripheral cannot be
/// opened, so sensors keep being polled on hosts without inputs.
pub fn default_controller() -> Arc<dyn GpioController> {
    #[cfg(feature = "gpio")]
    {
        match RppalGpio::new() {
            Ok(gpio) => Arc::new(gpio),
            Err(e) => {
                tracing::warn!(error = %e, "GPIO peripheral unavailable");
                Arc::new(UnavailableGpio::new(e.to_string()))
            }
        }
    }

    #[cfg(not(feature = "gpio"))]
    {
        Arc::new(UnavailableGpio::new("built without the gpio feature"))
    }
}

/// In-process GPIO controller for tests.
///
/// Lines change level only when a test calls [`SimulatedLine::emit`]. Clones
/// share the same lines.
#[derive(Clone, Default)]
pub struct SimulatedGpio {
    lines: Arc<Mutex<HashMap<u8, Arc<SimulatedLine>>>>,
    broken: Arc<Mutex<HashSet<u8>>>,
    deaf: Arc<Mutex<HashSet<u8>>>,
}

impl SimulatedGpio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make claims of `pin` fail.
    pub fn break_pin(&self, pin: u8) {
        self.broken.lock().insert(pin);
    }

    /// Let `pin` be claimed but make subscribing to its edges fail.
    pub fn refuse_events(&self, pin: u8) {
        self.deaf.lock().insert(pin);
    }

    /// The line claimed for `pin`, if any.
    pub fn line(&self, pin: u8) -> Option<Arc<SimulatedLine>> {
        self.lines.lock().get(&pin).cloned()
    }
}

impl GpioController for SimulatedGpio {
    fn claim(&self, pin: u8, _debounce: Duration) -> Result<Arc<dyn InputLine>, GpioError> {
        if self.broken.lock().contains(&pin) {
            return Err(GpioError::Claim {
                pin,
                message: "pin is busy".to_string(),
            });
        }

        let line = Arc::new(SimulatedLine::new(pin, self.deaf.lock().contains(&pin)));
        self.lines.lock().insert(pin, line.clone());
        Ok(line)
    }
}

/// A line of [`SimulatedGpio`].
#[derive(Debug)]
pub struct SimulatedLine {
    pin: u8,
    level: AtomicU8,
    released: AtomicBool,
    deaf: bool,
    events: Mutex<Option<mpsc::Sender<EdgeEvent>>>,
}

impl SimulatedLine {
    fn new(pin: u8, deaf: bool) -> Self {
        Self {
            pin,
            level: AtomicU8::new(0),
            released: AtomicBool::new(false),
            deaf,
            events: Mutex::new(None),
        }
    }

    /// Set the level returned by [`InputLine::read`] without raising an edge.
    pub fn set_level(&self, value: u8) {
        self.level.store(value, Ordering::SeqCst);
    }

    /// Drive the line to `value` and deliver the edge.
    ///
    /// Returns `false` if nobody is subscribed.
    pub fn emit(&self, value: u8) -> bool {
        self.set_level(value);
        self.deliver(Ok(value))
    }

    /// Deliver a hardware error to the subscriber.
    pub fn emit_error(&self, message: impl Into<String>) -> bool {
        self.deliver(Err(GpioError::HardwareEvent {
            pin: self.pin,
            message: message.into(),
        }))
    }

    pub fn is_subscribed(&self) -> bool {
        self.events.lock().is_some()
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    fn deliver(&self, event: EdgeEvent) -> bool {
        match self.events.lock().as_ref() {
            Some(sender) => sender.try_send(event).is_ok(),
            None => false,
        }
    }
}

impl InputLine for SimulatedLine {
    fn pin(&self) -> u8 {
        self.pin
    }

    fn read(&self) -> Result<u8, GpioError> {
        if self.is_released() {
            return Err(GpioError::Read {
                pin: self.pin,
                message: "line released".to_string(),
            });
        }
        Ok(self.level.load(Ordering::SeqCst))
    }

    fn subscribe(&self, events: mpsc::Sender<EdgeEvent>) -> Result<(), GpioError> {
        if self.deaf {
            return Err(GpioError::Subscribe {
                pin: self.pin,
                message: "edge detection unsupported".to_string(),
            });
        }
        *self.events.lock() = Some(events);
        Ok(())
    }

    fn release(&self) -> Result<(), GpioError> {
        self.released.store(true, Ordering::SeqCst);
        self.events.lock().take();
        Ok(())
    }
}
