//! Derived metrics computed from cached readings.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use thermosight_bridge_framework::ValueCache;
use thiserror::Error;

use crate::config::ProcessConfig;

/// Type name of the heat output metric.
pub const WATER_KW: &str = "water_kw";

/// Litres per cubic metre.
const LITRES_PER_M3: f64 = 1000.0;
/// Seconds per minute.
const SECONDS_PER_MINUTE: f64 = 60.0;
/// Divisor turning litres per minute times kelvin into kilowatts.
const KW_DIVISOR: f64 = 14.0;

/// Derived metric errors.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Unrecognised process type '{0}'")]
    UnrecognizedType(String),
    #[error("Invalid parameters for '{alias}': {message}")]
    InvalidParameters { alias: String, message: String },
    #[error("Failed to calculate value for '{0}'")]
    ComputationUndefined(String),
}

/// A metric computed from values already in the cache.
pub trait DerivedMetric: Send + Sync {
    /// Compute the metric for one process.
    fn evaluate(&self, process: &ProcessConfig, cache: &ValueCache) -> Result<f64, ProcessError>;
}

#[derive(Debug, Deserialize)]
struct WaterKwParams {
    flow: String,
    #[serde(rename = "return")]
    return_alias: String,
    #[serde(rename = "flowRate")]
    flow_rate: f64,
}

/// Heat carried by a water circuit, from its flow and return temperatures
/// and its volumetric flow rate.
#[derive(Debug, Default, Clone, Copy)]
pub struct WaterKw;

impl DerivedMetric for WaterKw {
    fn evaluate(&self, process: &ProcessConfig, cache: &ValueCache) -> Result<f64, ProcessError> {
        let params = WaterKwParams::deserialize(&process.data).map_err(|e| {
            ProcessError::InvalidParameters {
                alias: process.alias.clone(),
                message: e.to_string(),
            }
        })?;

        let flow_temp = cache.get(&params.flow).unwrap_or(f64::NAN);
        let return_temp = cache.get(&params.return_alias).unwrap_or(f64::NAN);

        let temp_change = return_temp - flow_temp;
        let flow_rate_lpm = params.flow_rate * LITRES_PER_M3 / SECONDS_PER_MINUTE;
        let kw = flow_rate_lpm * temp_change / KW_DIVISOR;

        tracing::debug!(
            alias = %process.alias,
            flow_temp,
            return_temp,
            temp_change,
            flow_rate_lpm,
            kw,
            "Calculated water kW"
        );

        if !kw.is_finite() {
            return Err(ProcessError::ComputationUndefined(process.alias.clone()));
        }

        Ok(kw)
    }
}

/// Maps process type names to their metric implementation.
pub struct ProcessRegistry {
    metrics: HashMap<String, Box<dyn DerivedMetric>>,
}

impl std::fmt::Debug for ProcessRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.metrics.keys().collect();
        types.sort();
        f.debug_struct("ProcessRegistry")
            .field("types", &types)
            .finish()
    }
}

impl Default for ProcessRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl ProcessRegistry {
    /// Registry with no metric types.
    pub fn empty() -> Self {
        Self {
            metrics: HashMap::new(),
        }
    }

    /// Registry with every built-in metric type.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(WATER_KW, WaterKw);
        registry
    }

    /// Register (or replace) a metric type.
    pub fn register(&mut self, kind: impl Into<String>, metric: impl DerivedMetric + 'static) {
        self.metrics.insert(kind.into(), Box::new(metric));
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.metrics.contains_key(kind)
    }

    /// Evaluate one process against the cache.
    pub fn evaluate(&self, process: &ProcessConfig, cache: &ValueCache) -> Result<f64, ProcessError> {
        let metric = self
            .metrics
            .get(&process.kind)
            .ok_or_else(|| ProcessError::UnrecognizedType(process.kind.clone()))?;

        metric.evaluate(process, cache)
    }
}

/// Parameters of a `water_kw` process, for building configs in code.
pub fn water_kw_data(flow: &str, return_alias: &str, flow_rate: f64) -> Value {
    serde_json::json!({ "flow": flow, "return": return_alias, "flowRate": flow_rate })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heat_process(flow_rate: f64) -> ProcessConfig {
        ProcessConfig {
            kind: WATER_KW.to_string(),
            alias: "heat_kw".to_string(),
            data: water_kw_data("flow", "return", flow_rate),
        }
    }

    #[test]
    fn test_water_kw() {
        let cache = ValueCache::new();
        cache.set("flow", 40.0);
        cache.set("return", 45.0);

        let kw = ProcessRegistry::with_builtins()
            .evaluate(&heat_process(0.01), &cache)
            .unwrap();

        // 0.01 * 1000 / 60 * 5 / 14
        assert!((kw - 0.059_523_809_5).abs() < 1e-9);
        assert!((kw - 0.0595).abs() < 1e-4);
    }

    #[test]
    fn test_water_kw_sign_follows_return_minus_flow() {
        let cache = ValueCache::new();
        cache.set("flow", 45.0);
        cache.set("return", 40.0);

        let kw = WaterKw.evaluate(&heat_process(0.01), &cache).unwrap();
        assert!(kw < 0.0);
    }

    #[test]
    fn test_missing_input_is_undefined() {
        let cache = ValueCache::new();
        cache.set("flow", 40.0);

        let result = WaterKw.evaluate(&heat_process(0.01), &cache);
        assert!(matches!(result, Err(ProcessError::ComputationUndefined(alias)) if alias == "heat_kw"));
    }

    #[test]
    fn test_overflowing_flow_rate_is_undefined() {
        let cache = ValueCache::new();
        cache.set("flow", 40.0);
        cache.set("return", 45.0);

        let result = WaterKw.evaluate(&heat_process(1e308), &cache);
        assert!(matches!(result, Err(ProcessError::ComputationUndefined(alias)) if alias == "heat_kw"));
    }

    #[test]
    fn test_invalid_parameters() {
        let cache = ValueCache::new();
        let process = ProcessConfig {
            kind: WATER_KW.to_string(),
            alias: "heat_kw".to_string(),
            data: serde_json::json!({ "flow": "flow" }),
        };

        let result = WaterKw.evaluate(&process, &cache);
        assert!(matches!(result, Err(ProcessError::InvalidParameters { .. })));
    }

    #[test]
    fn test_unknown_type() {
        let process = ProcessConfig {
            kind: "bogus".to_string(),
            alias: "x".to_string(),
            data: Value::Null,
        };

        let result = ProcessRegistry::with_builtins().evaluate(&process, &ValueCache::new());
        assert!(matches!(result, Err(ProcessError::UnrecognizedType(kind)) if kind == "bogus"));
    }

    struct Constant(f64);

    impl DerivedMetric for Constant {
        fn evaluate(&self, _: &ProcessConfig, _: &ValueCache) -> Result<f64, ProcessError> {
            Ok(self.0)
        }
    }

    #[test]
    fn test_register_custom_metric() {
        let mut registry = ProcessRegistry::empty();
        assert!(!registry.contains(WATER_KW));

        registry.register("constant", Constant(7.5));
        let process = ProcessConfig {
            kind: "constant".to_string(),
            alias: "seven".to_string(),
            data: Value::Null,
        };

        assert_eq!(registry.evaluate(&process, &ValueCache::new()).unwrap(), 7.5);
    }
}
