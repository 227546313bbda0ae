//! 1-wire temperature probe reading.
//!
//! A DS18B20 probe exposes its last conversion as a two-line report:
//!
//! ```text
//! 72 01 4b 46 7f ff 0e 10 57 : crc=57 YES
//! 72 01 4b 46 7f ff 0e 10 57 t=23125
//! ```
//!
//! The value after `t=` is the temperature in thousandths of a degree.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Name of the report file inside a device directory.
const REPORT_FILE: &str = "w1_slave";

/// Matches the temperature field at the end of the second report line.
static READING_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\st=([0-9]+)$").unwrap());

/// Sensor read errors.
#[derive(Debug, Error)]
pub enum SensorError {
    #[error("No data")]
    NoData,
    #[error("Malformed report: {0}")]
    Malformed(String),
    #[error("Invalid value '{0}'")]
    InvalidValue(String),
    #[error("Read timed out after {0:?}")]
    Timeout(Duration),
}

/// Source of raw device reports.
#[async_trait]
pub trait SensorSource: Send + Sync {
    /// Return the device report, or `None` when the device has nothing to say.
    async fn read_raw(&self, id: &str) -> Option<String>;
}

/// Reads device reports from the kernel 1-wire tree.
#[derive(Debug, Clone)]
pub struct W1Bus {
    root: PathBuf,
}

impl W1Bus {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn report_path(&self, id: &str) -> PathBuf {
        self.root.join(id).join(REPORT_FILE)
    }
}

#[async_trait]
impl SensorSource for W1Bus {
    async fn read_raw(&self, id: &str) -> Option<String> {
        let path = self.report_path(id);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let content = content.trim();
                (!content.is_empty()).then(|| content.to_string())
            }
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    tracing::debug!(path = %path.display(), error = %e, "Failed to read sensor report");
                }
                None
            }
        }
    }
}

/// Parse a device report into degrees.
pub fn parse_reading(report: &str) -> Result<f64, SensorError> {
    let lines: Vec<&str> = report.split('\n').collect();
    if lines.len() < 2 {
        return Err(SensorError::Malformed(format!(
            "expected 2 lines, got {}",
            lines.len()
        )));
    }

    let captures = READING_REGEX
        .captures(lines[1])
        .ok_or_else(|| SensorError::Malformed(format!("no temperature in '{}'", lines[1])))?;

    let raw = &captures[1];
    let millis: i64 = raw
        .parse()
        .map_err(|_| SensorError::InvalidValue(raw.to_string()))?;

    Ok(millis as f64 / 1000.0)
}

/// Reads and parses probes through a [`SensorSource`], one bounded read at a time.
#[derive(Clone)]
pub struct SensorReader {
    source: Arc<dyn SensorSource>,
    timeout: Duration,
}

impl SensorReader {
    pub fn new(source: Arc<dyn SensorSource>, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    /// Read one probe.
    pub async fn read(&self, id: &str) -> Result<f64, SensorError> {
        let report = tokio::time::timeout(self.timeout, self.source.read_raw(id))
            .await
            .map_err(|_| SensorError::Timeout(self.timeout))?
            .ok_or(SensorError::NoData)?;

        parse_reading(&report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "72 01 4b 46 7f ff 0e 10 57 : crc=57 YES\n\
                          72 01 4b 46 7f ff 0e 10 57 t=23562";

    #[test]
    fn test_parse_reading() {
        assert_eq!(parse_reading(REPORT).unwrap(), 23.562);
        assert_eq!(parse_reading("crc=00 YES\n00 t=5000").unwrap(), 5.0);
        assert_eq!(parse_reading("crc=00 YES\n00 t=0").unwrap(), 0.0);
    }

    #[test]
    fn test_single_line_is_malformed() {
        let result = parse_reading("72 01 4b 46 7f ff 0e 10 57 t=23562");
        assert!(matches!(result, Err(SensorError::Malformed(_))));
    }

    #[test]
    fn test_missing_temperature_is_malformed() {
        assert!(matches!(
            parse_reading("crc=57 YES\n72 01 4b 46"),
            Err(SensorError::Malformed(_))
        ));
        // Sign and trailing text are not accepted.
        assert!(matches!(
            parse_reading("crc=57 YES\n72 t=-1250"),
            Err(SensorError::Malformed(_))
        ));
        assert!(matches!(
            parse_reading("crc=57 YES\n72 t=23562 "),
            Err(SensorError::Malformed(_))
        ));
        assert!(matches!(
            parse_reading("crc=57 YES\n72t=23562"),
            Err(SensorError::Malformed(_))
        ));
    }

    #[test]
    fn test_overflow_is_invalid_value() {
        let result = parse_reading("crc=57 YES\n72 t=99999999999999999999999");
        assert!(matches!(result, Err(SensorError::InvalidValue(_))));
    }

    #[tokio::test]
    async fn test_w1_bus_reads_trimmed_report() {
        let dir = tempfile::tempdir().unwrap();
        let device = dir.path().join("28-0316a2792cff");
        std::fs::create_dir(&device).unwrap();
        std::fs::write(device.join(REPORT_FILE), format!("{}\n\n", REPORT)).unwrap();

        let bus = W1Bus::new(dir.path());
        assert_eq!(bus.read_raw("28-0316a2792cff").await.as_deref(), Some(REPORT));
        assert_eq!(bus.read_raw("28-missing").await, None);
    }

    #[tokio::test]
    async fn test_w1_bus_empty_report_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let device = dir.path().join("28-empty");
        std::fs::create_dir(&device).unwrap();
        std::fs::write(device.join(REPORT_FILE), "  \n").unwrap();

        let reader = SensorReader::new(Arc::new(W1Bus::new(dir.path())), Duration::from_secs(1));
        assert!(matches!(
            reader.read("28-empty").await,
            Err(SensorError::NoData)
        ));
    }

    struct StalledSource;

    #[async_trait]
    impl SensorSource for StalledSource {
        async fn read_raw(&self, _id: &str) -> Option<String> {
            std::future::pending::<()>().await;
            None
        }
    }

    #[tokio::test]
    async fn test_read_times_out() {
        let reader = SensorReader::new(Arc::new(StalledSource), Duration::from_millis(20));
        assert!(matches!(
            reader.read("28-a").await,
            Err(SensorError::Timeout(_))
        ));
    }
}
