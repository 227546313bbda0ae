//! ThermoSight Bridge Framework
//!
//! Common abstractions for building sensor bridges that publish readings to Zenoh.
//!
//! # Overview
//!
//! This framework provides:
//! - [`BridgeConfig`] trait for configuration loading and validation
//! - [`BridgeRunner`] for managing bridge lifecycle (startup, shutdown, signal handling)
//! - [`Publisher`] for publishing readings through a [`Broker`]
//! - [`ValueCache`] holding the latest value of every alias
//! - [`ShutdownCoordinator`] for releasing claimed hardware exactly once
//! - [`BridgeArgs`] for common CLI argument parsing
//! - [`BridgeStatus`] for standardized status reporting
//!
//! # Example
//!
//! ```ignore
//! use thermosight_bridge_framework::{BridgeArgs, BridgeConfig, BridgeRunner};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = BridgeArgs::parse();
//!     let config = MyBridgeConfig::load(args.config_path()?)?;
//!
//!     let mut runner = BridgeRunner::new_with_args("mybridge", config, Some(&args)).await?;
//!
//!     // Spawn sensor-specific workers
//!     runner.spawn(my_worker(runner.publisher(), runner.shutdown_signal()));
//!
//!     // Run until Ctrl+C
//!     runner.run().await
//! }
//! ```

mod args;
mod broker;
mod cache;
mod config;
mod error;
mod memory;
mod publisher;
mod runner;
mod shutdown;
mod status;

pub use args::{BridgeArgs, host_config_path};
pub use broker::Broker;
pub use cache::ValueCache;
pub use config::{BridgeConfig, DEFAULT_PUBLISH_TIMEOUT};
pub use error::{BridgeError, Result};
pub use memory::MemoryBroker;
pub use publisher::Publisher;
pub use runner::{BridgeRunner, DEFAULT_GRACE_PERIOD, stop, wait_for_termination};
pub use shutdown::{CallbackError, CallbackOutcome, ShutdownCoordinator, ShutdownReport};
pub use status::{BridgeState, BridgeStatus, StatusPublisher};

// Re-export commonly used types from thermosight-common
pub use thermosight_common::{Credentials, LogFormat, LoggingConfig, TopicResolver, ZenohConfig};
