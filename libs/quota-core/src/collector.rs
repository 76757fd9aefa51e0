use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::Error as AnyhowError;
use futures_util::stream::{self, StreamExt, TryStreamExt};
use thiserror::Error;
use tracing::{debug, warn};

use crate::filter::AllowFilter;
use crate::model::{MetricDescriptor, QuotaDescriptor};
use crate::source::{MetricUsageSource, UsageSource};

pub const DEFAULT_COLLECTION_CONCURRENCY: usize = 8;

#[derive(Debug, Error)]
#[error("usage collection failed in '{collaborator}'")]
pub struct CollectionError {
    pub collaborator: String,
    #[source]
    pub source: AnyhowError,
}

/// Raw output of one collection pass. Both maps are keyed by quota code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectedUsage {
    pub metric: BTreeMap<String, u64>,
    pub api: BTreeMap<String, u64>,
    /// Quota codes returned by more than one usage source.
    pub collisions: Vec<String>,
}

/// Turns quota descriptors plus the allow filter into metric and API usage.
///
/// Metric lookups and usage-source calls share one pipeline and run at most
/// `concurrency` at a time in total. The first failure drops every call still
/// in flight and fails the whole pass.
#[derive(Debug, Clone)]
pub struct UsageCollector {
    concurrency: usize,
}

impl Default for UsageCollector {
    fn default() -> Self {
        Self::new(DEFAULT_COLLECTION_CONCURRENCY)
    }
}

impl UsageCollector {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub async fn collect(
        &self,
        quotas: &[QuotaDescriptor],
        filter: &AllowFilter,
        sources: &[Arc<dyn UsageSource>],
        metrics: &dyn MetricUsageSource,
    ) -> Result<CollectedUsage, CollectionError> {
        let mut calls: Vec<UsageCall> = quotas
            .iter()
            .filter(|quota| filter.allows_quota(&quota.service_code, &quota.quota_code))
            .filter_map(|quota| {
                quota.metric.as_ref().map(|metric| UsageCall::Metric {
                    quota_code: quota.quota_code.clone(),
                    metric: metric.clone(),
                })
            })
            .collect();
        calls.extend(
            sources
                .iter()
                .filter(|source| filter.allows_service(source.service_code()))
                .map(|source| UsageCall::Api {
                    allowed: filter.allowed_quotas(source.service_code()).cloned(),
                    source: Arc::clone(source),
                }),
        );

        // One pipeline for both kinds of call, so `concurrency` bounds the total.
        let outcomes: Vec<UsageOutcome> = stream::iter(calls)
            .map(move |call| async move {
                match call {
                    UsageCall::Metric { quota_code, metric } => {
                        match metrics.get_usage(&metric).await {
                            Ok(value) => Ok(UsageOutcome::Metric(quota_code, value)),
                            Err(source) => Err(CollectionError {
                                collaborator: format!("{} ({quota_code})", metrics.name()),
                                source,
                            }),
                        }
                    }
                    UsageCall::Api { source, allowed } => {
                        match source.get_usage(allowed.as_ref()).await {
                            Ok(usage) => Ok(UsageOutcome::Api(
                                source.service_code().to_string(),
                                usage,
                            )),
                            Err(err) => Err(CollectionError {
                                collaborator: source.name().to_string(),
                                source: err,
                            }),
                        }
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .try_collect()
            .await?;

        let mut metric = BTreeMap::new();
        let mut per_service = Vec::new();
        for outcome in outcomes {
            match outcome {
                UsageOutcome::Metric(quota_code, value) => {
                    metric.insert(quota_code, value);
                }
                UsageOutcome::Api(service_code, usage) => per_service.push((service_code, usage)),
            }
        }
        let (api, collisions) = merge_api_usage(filter, per_service);

        debug!(
            metric_quotas = metric.len(),
            api_quotas = api.len(),
            collisions = collisions.len(),
            "usage collection finished"
        );

        Ok(CollectedUsage {
            metric,
            api,
            collisions,
        })
    }
}

enum UsageCall {
    Metric {
        quota_code: String,
        metric: MetricDescriptor,
    },
    Api {
        source: Arc<dyn UsageSource>,
        allowed: Option<BTreeSet<String>>,
    },
}

enum UsageOutcome {
    Metric(String, u64),
    Api(String, BTreeMap<String, u64>),
}

fn merge_api_usage(
    filter: &AllowFilter,
    mut per_service: Vec<(String, BTreeMap<String, u64>)>,
) -> (BTreeMap<String, u64>, Vec<String>) {
    // Completion order is arbitrary; merge in a fixed order.
    per_service.sort_by(|a, b| a.0.cmp(&b.0));

    let mut api = BTreeMap::new();
    let mut collisions = Vec::new();
    for (service_code, usage) in per_service {
        for (quota_code, value) in usage {
            if !filter.allows_quota(&service_code, &quota_code) {
                continue;
            }
            if let Some(previous) = api.insert(quota_code.clone(), value) {
                warn!(
                    quota_code = %quota_code,
                    service_code = %service_code,
                    previous,
                    value,
                    "quota code reported by more than one usage source"
                );
                collisions.push(quota_code);
            }
        }
    }

    (api, collisions)
}
