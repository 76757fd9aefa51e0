use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use quota_watch_core::{MetricDescriptor, MetricStatistic, MetricUsageSource};
use serde::{Deserialize, Serialize};

use crate::provider::ProviderClient;

pub const STATISTICS_PATH: &str = "/v1/metrics/statistics";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsRequest {
    pub namespace: String,
    pub metric_name: String,
    pub dimensions: Vec<Dimension>,
    pub statistics: Vec<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub period: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatisticsResponse {
    #[serde(default)]
    pub datapoints: Vec<Datapoint>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Datapoint {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub sum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

/// Reads quota usage from a CloudWatch-style statistics endpoint over a
/// trailing window ending now.
pub struct HttpMetricSource {
    client: ProviderClient,
    window: ChronoDuration,
    period_secs: u64,
}

impl HttpMetricSource {
    pub fn new(client: ProviderClient, window_minutes: u64, period_secs: u64) -> Self {
        Self {
            client,
            window: ChronoDuration::minutes(window_minutes as i64),
            period_secs,
        }
    }

    fn request_for(&self, metric: &MetricDescriptor, end_time: DateTime<Utc>) -> StatisticsRequest {
        StatisticsRequest {
            namespace: metric.namespace.clone(),
            metric_name: metric.metric_name.clone(),
            dimensions: metric
                .dimensions
                .iter()
                .map(|(name, value)| Dimension {
                    name: name.clone(),
                    value: value.clone(),
                })
                .collect(),
            statistics: vec![metric.statistic.as_str().to_string()],
            start_time: end_time - self.window,
            end_time,
            period: self.period_secs,
        }
    }
}

#[async_trait]
impl MetricUsageSource for HttpMetricSource {
    async fn get_usage(&self, metric: &MetricDescriptor) -> anyhow::Result<u64> {
        let request = self.request_for(metric, Utc::now());
        let response: StatisticsResponse = self.client.post_json(STATISTICS_PATH, &request).await?;
        Ok(usage_from_datapoints(&response.datapoints, metric.statistic))
    }
}

/// Integer usage from the newest datapoint; an empty window counts as zero.
pub fn usage_from_datapoints(datapoints: &[Datapoint], statistic: MetricStatistic) -> u64 {
    let Some(latest) = datapoints.iter().max_by_key(|point| point.timestamp) else {
        return 0;
    };

    let value = match statistic {
        MetricStatistic::Sum => latest.sum,
        MetricStatistic::Maximum => latest.maximum,
    };

    // float-to-int casts saturate: negatives and NaN become 0
    value.unwrap_or(0.0) as u64
}
