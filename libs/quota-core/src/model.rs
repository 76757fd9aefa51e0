use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub code: String,
    pub display_name: String,
}

impl ServiceDescriptor {
    pub fn new(code: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            display_name: display_name.into(),
        }
    }
}

/// A single quota as reported by the catalog.
///
/// `applied_value` is already resolved by the catalog: it holds the account
/// override when one exists and the default otherwise. It is the only limit
/// the evaluator compares against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaDescriptor {
    pub service_code: String,
    pub quota_code: String,
    pub quota_name: String,
    pub adjustable: bool,
    pub is_global: bool,
    pub default_value: f64,
    pub applied_value: f64,
    #[serde(default)]
    pub metric: Option<MetricDescriptor>,
}

impl QuotaDescriptor {
    pub fn limit(&self) -> f64 {
        self.applied_value
    }

    pub fn is_evaluable(&self) -> bool {
        self.applied_value > 0.0
    }

    /// Whole-number limit for reports. Fractional limits round up, so an
    /// evaluable quota never reports a limit of 0.
    pub fn reported_limit(&self) -> u64 {
        self.applied_value.ceil() as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricStatistic {
    Sum,
    Maximum,
}

impl MetricStatistic {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricStatistic::Sum => "Sum",
            MetricStatistic::Maximum => "Maximum",
        }
    }
}

impl fmt::Display for MetricStatistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque reference to the time series that tracks a quota. The core hands it
/// to the metric source untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDescriptor {
    pub namespace: String,
    pub metric_name: String,
    #[serde(default)]
    pub dimensions: BTreeMap<String, String>,
    pub statistic: MetricStatistic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageProvenance {
    Metric,
    Api,
}

impl UsageProvenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageProvenance::Metric => "metric",
            UsageProvenance::Api => "api",
        }
    }
}

impl fmt::Display for UsageProvenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub quota_code: String,
    pub value: u64,
    pub source: UsageProvenance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmDefinition {
    pub name: String,
    pub threshold_percent: u32,
}

impl AlarmDefinition {
    pub fn new(name: impl Into<String>, threshold_percent: u32) -> Self {
        Self {
            name: name.into(),
            threshold_percent,
        }
    }
}

/// One reporting row: a quota joined with its reconciled usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaUsage {
    pub service_code: String,
    pub service_name: String,
    pub quota_code: String,
    pub quota_name: String,
    pub usage: u64,
    /// See [`QuotaDescriptor::reported_limit`].
    pub limit: u64,
    pub source: UsageProvenance,
}

impl QuotaUsage {
    pub fn percentage(&self) -> f64 {
        if self.limit == 0 {
            return 0.0;
        }
        (self.usage as f64 / self.limit as f64) * 100.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub service_code: String,
    pub service_name: String,
    pub quota_code: String,
    pub quota_name: String,
    pub usage: u64,
    /// See [`QuotaDescriptor::reported_limit`]; evaluation itself uses the
    /// exact applied value.
    pub limit: u64,
    pub matched_alarm_name: String,
    pub matched_threshold: u32,
}
