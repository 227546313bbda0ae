//! Zenoh bridge for 1-wire temperature probes and GPIO inputs.
//!
//! The bridge polls DS18B20 probes through the kernel 1-wire tree, watches
//! digital inputs for edges, derives heat output from flow/return
//! temperatures and publishes every value as a plain decimal string.
//!
//! # Topics
//!
//! ```text
//! <topic>/<alias>     alias without '/'
//! <alias>             alias containing '/', used verbatim
//! <topic>/@/status    bridge status (when enabled)
//! ```

pub mod config;
pub mod gpio;
pub mod inputs;
pub mod poller;
pub mod process;
pub mod sensor;

pub use config::OneWireBridgeConfig;
pub use inputs::{InputStates, InputTask, InputWatcher, start_watchers};
pub use poller::{CycleStats, Poller};
pub use process::{DerivedMetric, ProcessError, ProcessRegistry, WaterKw};
pub use sensor::{SensorError, SensorReader, SensorSource, W1Bus};
