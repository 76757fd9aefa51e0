use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use quota_watch_core::{
    AllowFilter, CatalogError, MetricDescriptor, MetricStatistic, QuotaCatalog, QuotaDescriptor,
    ServiceDescriptor,
};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::provider::{ProviderClient, ProviderError};

#[derive(Debug, Deserialize)]
struct ServicesPage {
    services: Vec<ServiceEntry>,
    #[serde(default)]
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServiceEntry {
    service_code: String,
    service_name: String,
}

#[derive(Debug, Deserialize)]
struct QuotasPage {
    quotas: Vec<QuotaEntry>,
    #[serde(default)]
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QuotaEntry {
    quota_code: String,
    quota_name: String,
    #[serde(default)]
    adjustable: bool,
    #[serde(default)]
    global_quota: bool,
    value: f64,
    #[serde(default)]
    usage_metric: Option<UsageMetricEntry>,
}

#[derive(Debug, Deserialize)]
struct UsageMetricEntry {
    metric_namespace: String,
    metric_name: String,
    #[serde(default)]
    metric_dimensions: BTreeMap<String, String>,
    metric_statistic_recommendation: String,
}

#[derive(Debug, Deserialize)]
struct AppliedQuota {
    value: f64,
}

/// Quota catalog backed by a service-quotas style HTTP provider.
///
/// Defaults come from the `quotas/defaults` listing; each quota's applied
/// value is then looked up individually, and a 404 there means the account
/// has no override so the default applies.
pub struct HttpQuotaCatalog {
    client: ProviderClient,
}

impl HttpQuotaCatalog {
    pub fn new(client: ProviderClient) -> Self {
        Self { client }
    }

    async fn applied_value(
        &self,
        service_code: &str,
        quota_code: &str,
        default_value: f64,
    ) -> Result<f64, ProviderError> {
        let path = format!("/v1/services/{service_code}/quotas/{quota_code}");
        match self.client.get_json::<AppliedQuota>(&path, &[]).await {
            Ok(applied) => Ok(applied.value),
            Err(err) if err.is_not_found() => Ok(default_value),
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl QuotaCatalog for HttpQuotaCatalog {
    async fn list_services(
        &self,
        filter: &AllowFilter,
    ) -> Result<Vec<ServiceDescriptor>, CatalogError> {
        let mut services = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let mut query = Vec::new();
            if let Some(token) = next_token.as_deref() {
                query.push(("next_token", token));
            }
            let page: ServicesPage = self
                .client
                .get_json("/v1/services", &query)
                .await
                .map_err(unavailable)?;

            services.extend(
                page.services
                    .into_iter()
                    .filter(|entry| filter.allows_service(&entry.service_code))
                    .map(|entry| ServiceDescriptor::new(entry.service_code, entry.service_name)),
            );

            next_token = page.next_token;
            if next_token.is_none() {
                break;
            }
        }

        debug!(services = services.len(), "listed catalog services");
        Ok(services)
    }

    async fn list_quotas(
        &self,
        service_code: &str,
        allowed: Option<&BTreeSet<String>>,
    ) -> Result<Vec<QuotaDescriptor>, CatalogError> {
        let path = format!("/v1/services/{service_code}/quotas/defaults");
        let mut quotas = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let mut query = Vec::new();
            if let Some(token) = next_token.as_deref() {
                query.push(("next_token", token));
            }
            let page: QuotasPage = match self.client.get_json(&path, &query).await {
                Ok(page) => page,
                Err(err) if err.is_not_found() => {
                    return Err(CatalogError::ServiceNotFound(service_code.to_string()))
                }
                Err(err) => return Err(unavailable(err)),
            };

            for entry in page.quotas {
                if allowed.is_some_and(|codes| !codes.contains(&entry.quota_code)) {
                    continue;
                }

                let applied_value = self
                    .applied_value(service_code, &entry.quota_code, entry.value)
                    .await
                    .map_err(unavailable)?;

                quotas.push(QuotaDescriptor {
                    service_code: service_code.to_string(),
                    metric: entry
                        .usage_metric
                        .and_then(|metric| metric_descriptor(&entry.quota_code, metric)),
                    quota_code: entry.quota_code,
                    quota_name: entry.quota_name,
                    adjustable: entry.adjustable,
                    is_global: entry.global_quota,
                    default_value: entry.value,
                    applied_value,
                });
            }

            next_token = page.next_token;
            if next_token.is_none() {
                break;
            }
        }

        debug!(
            service_code,
            quotas = quotas.len(),
            "listed catalog quotas"
        );
        Ok(quotas)
    }
}

/// Only Sum and Maximum can be queried. Any other recommendation drops the
/// descriptor, so the quota is counted by usage sources alone instead of
/// being reported with a metric usage of 0.
fn metric_descriptor(quota_code: &str, entry: UsageMetricEntry) -> Option<MetricDescriptor> {
    let statistic = match entry.metric_statistic_recommendation.as_str() {
        "Sum" => MetricStatistic::Sum,
        "Maximum" => MetricStatistic::Maximum,
        other => {
            warn!(
                quota_code,
                statistic = other,
                "unsupported metric statistic, quota will not use metric usage"
            );
            return None;
        }
    };

    Some(MetricDescriptor {
        namespace: entry.metric_namespace,
        metric_name: entry.metric_name,
        dimensions: entry.metric_dimensions,
        statistic,
    })
}

fn unavailable(err: ProviderError) -> CatalogError {
    CatalogError::Unavailable(err.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage_metric(statistic: &str) -> UsageMetricEntry {
        UsageMetricEntry {
            metric_namespace: "AWS/Usage".to_string(),
            metric_name: "ResourceCount".to_string(),
            metric_dimensions: BTreeMap::from([("Resource".to_string(), "vCPU".to_string())]),
            metric_statistic_recommendation: statistic.to_string(),
        }
    }

    #[test]
    fn supported_statistics_map_to_descriptor() {
        let descriptor = metric_descriptor("L-1216C47A", usage_metric("Maximum")).unwrap();
        assert_eq!(descriptor.statistic, MetricStatistic::Maximum);
        assert_eq!(descriptor.dimensions["Resource"], "vCPU");

        let descriptor = metric_descriptor("L-1216C47A", usage_metric("Sum")).unwrap();
        assert_eq!(descriptor.statistic, MetricStatistic::Sum);
    }

    #[test]
    fn unsupported_statistic_drops_descriptor() {
        assert!(metric_descriptor("L-1216C47A", usage_metric("Average")).is_none());
    }
}
