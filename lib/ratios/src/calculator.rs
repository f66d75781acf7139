use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::debug;

use crate::metric::{RatioMetric, RatioUnit};

/// Named input figures, e.g. `"net_income" -> 100_000.0`
pub type RatioInputs = HashMap<String, f64>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RatioError {
    #[error("Unsupported metric: {metric}. Supported: {supported}")]
    UnsupportedMetric { metric: String, supported: String },

    #[error("Missing required value '{field}' for {metric}")]
    MissingValue { metric: RatioMetric, field: &'static str },

    #[error("Division by zero in {metric}: '{field}' is zero")]
    DivisionByZero { metric: RatioMetric, field: &'static str },

    #[error("Value '{field}' for {metric} is not a finite number")]
    NonFiniteValue { metric: RatioMetric, field: &'static str },
}

/// Capability handed to the orchestration layer for ratio computation.
pub trait CalculatorPort: Send + Sync {
    fn calculate(&self, metric_name: &str, values: &RatioInputs) -> Result<f64, RatioError>;
}

/// Stateless calculator for the metrics in [`RatioMetric`].
///
/// Errors are deterministic for a given input, so callers should fix the
/// input rather than retry.
#[derive(Debug, Clone, Copy, Default)]
pub struct RatioCalculator;

impl RatioCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Compute `metric_name` from `values`.
    ///
    /// ```
    /// use kpiscope_ratios::{RatioCalculator, RatioInputs};
    ///
    /// let values: RatioInputs = [("net_income", 100_000.0), ("equity", 500_000.0)]
    ///     .into_iter()
    ///     .map(|(k, v)| (k.to_string(), v))
    ///     .collect();
    /// assert_eq!(RatioCalculator::new().calculate("roe", &values).unwrap(), 20.0);
    /// ```
    pub fn calculate(&self, metric_name: &str, values: &RatioInputs) -> Result<f64, RatioError> {
        let metric: RatioMetric = metric_name.parse()?;
        self.calculate_metric(metric, values)
    }

    pub fn calculate_metric(&self, metric: RatioMetric, values: &RatioInputs) -> Result<f64, RatioError> {
        let fields = metric.required_fields();
        let mut inputs = [0.0f64; 3];
        for (slot, &field) in inputs.iter_mut().zip(fields) {
            let value = *values
                .get(field)
                .ok_or(RatioError::MissingValue { metric, field })?;
            if !value.is_finite() {
                return Err(RatioError::NonFiniteValue { metric, field });
            }
            *slot = value;
        }

        let (numerator, denominator) = match metric {
            RatioMetric::QuickRatio => (inputs[0] - inputs[1], inputs[2]),
            _ => (inputs[0], inputs[1]),
        };
        if denominator == 0.0 {
            return Err(RatioError::DivisionByZero {
                metric,
                field: fields[fields.len() - 1],
            });
        }

        let ratio = numerator / denominator;
        let value = match metric.unit() {
            RatioUnit::Ratio => ratio,
            RatioUnit::Percent => ratio * 100.0,
        };
        debug!("{} = {}{}", metric, value, metric.unit());
        Ok(value)
    }

    /// Every metric whose inputs are all present in `values`.
    ///
    /// Metrics with missing inputs are left out; other failures, such as a
    /// zero denominator, are reported per metric.
    pub fn calculate_available(&self, values: &RatioInputs) -> BTreeMap<RatioMetric, Result<f64, RatioError>> {
        RatioMetric::ALL
            .iter()
            .copied()
            .filter(|m| m.required_fields().iter().all(|f| values.contains_key(*f)))
            .map(|m| (m, self.calculate_metric(m, values)))
            .collect()
    }
}

impl CalculatorPort for RatioCalculator {
    fn calculate(&self, metric_name: &str, values: &RatioInputs) -> Result<f64, RatioError> {
        RatioCalculator::calculate(self, metric_name, values)
    }
}
