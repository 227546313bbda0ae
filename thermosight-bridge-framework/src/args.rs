//! CLI argument parsing for bridges.

use std::path::{Path, PathBuf};

use clap::Parser;

/// Extension used for host-selected configuration files.
const CONFIG_EXTENSION: &str = "json5";

/// Common CLI arguments for all bridges.
#[derive(Parser, Debug, Clone)]
#[command(about = "ThermoSight sensor bridge")]
#[command(version)]
pub struct BridgeArgs {
    /// Path to configuration file. Defaults to `<config-dir>/<hostname>.json5`.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory searched for host-named configuration files.
    #[arg(long, default_value = "configs")]
    pub config_dir: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,
}

impl BridgeArgs {
    /// Parse CLI arguments.
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// Resolve the configuration file to load.
    ///
    /// An explicit `--config` wins; otherwise the file is selected by the
    /// host name of the machine the bridge runs on.
    pub fn config_path(&self) -> std::io::Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => {
                let host = hostname::get()?;
                Ok(host_config_path(&self.config_dir, &host.to_string_lossy()))
            }
        }
    }
}

/// Build the path of the configuration file for `host` inside `dir`.
pub fn host_config_path(dir: &Path, host: &str) -> PathBuf {
    dir.join(format!("{}.{}", host, CONFIG_EXTENSION))
}
