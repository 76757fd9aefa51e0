use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use futures_util::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::alarm::AlarmRegistry;
use crate::collector::UsageCollector;
use crate::error::MonitorError;
use crate::filter::AllowFilter;
use crate::model::{
    AlarmDefinition, QuotaDescriptor, QuotaUsage, ServiceDescriptor, UsageRecord, Warning,
};
use crate::reconcile::reconcile;
use crate::source::{CatalogError, MetricUsageSource, QuotaCatalog, UsageSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSummary {
    pub services: usize,
    pub quotas: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub metric_quotas: usize,
    pub api_quotas: usize,
    pub collisions: Vec<String>,
}

#[derive(Debug, Default)]
struct CatalogSnapshot {
    services: BTreeMap<String, ServiceDescriptor>,
    quotas: BTreeMap<String, BTreeMap<String, QuotaDescriptor>>,
    // quota code -> service code
    quota_index: HashMap<String, String>,
}

impl CatalogSnapshot {
    fn build(listed: Vec<(ServiceDescriptor, Vec<QuotaDescriptor>)>) -> Self {
        let mut snapshot = CatalogSnapshot::default();

        for (service, quotas) in listed {
            let mut by_code = BTreeMap::new();
            for quota in quotas {
                if let Some(previous) = snapshot
                    .quota_index
                    .insert(quota.quota_code.clone(), service.code.clone())
                {
                    warn!(
                        quota_code = %quota.quota_code,
                        service_code = %service.code,
                        previous_service = %previous,
                        "quota code listed under more than one service"
                    );
                }
                by_code.insert(quota.quota_code.clone(), quota);
            }
            snapshot.quotas.insert(service.code.clone(), by_code);
            snapshot.services.insert(service.code.clone(), service);
        }

        snapshot
    }

    fn descriptor(&self, quota_code: &str) -> Option<&QuotaDescriptor> {
        let service_code = self.quota_index.get(quota_code)?;
        self.quotas.get(service_code)?.get(quota_code)
    }

    fn service_name(&self, service_code: &str) -> String {
        self.services
            .get(service_code)
            .map(|service| service.display_name.clone())
            .unwrap_or_default()
    }

    fn all_quotas(&self) -> Vec<QuotaDescriptor> {
        self.quotas
            .values()
            .flat_map(|quotas| quotas.values().cloned())
            .collect()
    }

    fn quota_count(&self) -> usize {
        self.quotas.values().map(BTreeMap::len).sum()
    }
}

#[derive(Debug, Default)]
struct UsageSnapshot {
    metric: BTreeMap<String, u64>,
    api: BTreeMap<String, u64>,
}

/// Ties the quota catalog, usage collection and alarm evaluation together.
///
/// Catalog and usage state are immutable snapshots behind `Arc`s. A refresh
/// builds the next snapshot off to the side and swaps it in only on success,
/// so readers see either the old or the new state and a failed refresh leaves
/// the previous one in place.
pub struct QuotaMonitor {
    catalog: Arc<dyn QuotaCatalog>,
    metric_source: Arc<dyn MetricUsageSource>,
    usage_sources: Vec<Arc<dyn UsageSource>>,
    filter: AllowFilter,
    collector: UsageCollector,
    catalog_state: RwLock<Arc<CatalogSnapshot>>,
    usage_state: RwLock<Arc<UsageSnapshot>>,
    alarms: RwLock<AlarmRegistry>,
}

impl QuotaMonitor {
    pub fn new(
        catalog: Arc<dyn QuotaCatalog>,
        metric_source: Arc<dyn MetricUsageSource>,
        filter: AllowFilter,
    ) -> Self {
        Self {
            catalog,
            metric_source,
            usage_sources: Vec::new(),
            filter,
            collector: UsageCollector::default(),
            catalog_state: RwLock::new(Arc::new(CatalogSnapshot::default())),
            usage_state: RwLock::new(Arc::new(UsageSnapshot::default())),
            alarms: RwLock::new(AlarmRegistry::new()),
        }
    }

    pub fn with_usage_source(mut self, source: Arc<dyn UsageSource>) -> Self {
        self.usage_sources.push(source);
        self
    }

    pub fn with_usage_sources<I>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn UsageSource>>,
    {
        self.usage_sources.extend(sources);
        self
    }

    pub fn with_collector(mut self, collector: UsageCollector) -> Self {
        self.collector = collector;
        self
    }

    pub fn allow_filter(&self) -> &AllowFilter {
        &self.filter
    }

    pub fn list_services(&self) -> Result<Vec<ServiceDescriptor>, MonitorError> {
        let catalog = self.catalog_snapshot()?;
        Ok(catalog.services.values().cloned().collect())
    }

    pub fn service_name(&self, service_code: &str) -> Result<String, MonitorError> {
        let catalog = self.catalog_snapshot()?;
        catalog
            .services
            .get(service_code)
            .map(|service| service.display_name.clone())
            .ok_or_else(|| MonitorError::UnknownService(service_code.to_string()))
    }

    pub fn list_quotas(&self, service_code: &str) -> Result<Vec<QuotaDescriptor>, MonitorError> {
        let catalog = self.catalog_snapshot()?;
        catalog
            .quotas
            .get(service_code)
            .map(|quotas| quotas.values().cloned().collect())
            .ok_or_else(|| MonitorError::UnknownService(service_code.to_string()))
    }

    pub fn get_quota(
        &self,
        service_code: &str,
        quota_code: &str,
    ) -> Result<QuotaDescriptor, MonitorError> {
        let catalog = self.catalog_snapshot()?;
        let quotas = catalog
            .quotas
            .get(service_code)
            .ok_or_else(|| MonitorError::UnknownService(service_code.to_string()))?;
        quotas
            .get(quota_code)
            .cloned()
            .ok_or_else(|| MonitorError::UnknownQuota {
                service_code: service_code.to_string(),
                quota_code: quota_code.to_string(),
            })
    }

    pub async fn refresh_catalog(&self) -> Result<CatalogSummary, MonitorError> {
        let services = self
            .catalog
            .list_services(&self.filter)
            .await
            .map_err(MonitorError::CatalogUnavailable)?;

        let enabled: Vec<ServiceDescriptor> = services
            .into_iter()
            .filter(|service| self.filter.allows_service(&service.code))
            .collect();

        let requests: Vec<(ServiceDescriptor, Option<BTreeSet<String>>)> = enabled
            .into_iter()
            .map(|service| {
                let allowed = self.filter.allowed_quotas(&service.code).cloned();
                (service, allowed)
            })
            .collect();

        let catalog = Arc::clone(&self.catalog);
        let listed: Vec<Option<(ServiceDescriptor, Vec<QuotaDescriptor>)>> =
            stream::iter(requests)
                .map(move |(service, allowed)| {
                    let catalog = Arc::clone(&catalog);
                    async move {
                        match catalog.list_quotas(&service.code, allowed.as_ref()).await {
                            Ok(quotas) => {
                                let quotas = quotas
                                    .into_iter()
                                    .filter(|quota| {
                                        allowed
                                            .as_ref()
                                            .map_or(true, |codes| codes.contains(&quota.quota_code))
                                    })
                                    .collect::<Vec<_>>();
                                Ok(Some((service, quotas)))
                            }
                            // vanished between listing and lookup
                            Err(CatalogError::ServiceNotFound(code)) => {
                                warn!(service_code = %code, "service disappeared from quota catalog");
                                Ok(None)
                            }
                            Err(err) => Err(err),
                        }
                    }
                })
                .buffer_unordered(self.collector.concurrency())
                .try_collect()
                .await
                .map_err(MonitorError::CatalogUnavailable)?;

        let mut listed: Vec<(ServiceDescriptor, Vec<QuotaDescriptor>)> =
            listed.into_iter().flatten().collect();
        // Completion order is arbitrary; index quotas in a fixed order.
        listed.sort_by(|a, b| a.0.code.cmp(&b.0.code));

        let snapshot = CatalogSnapshot::build(listed);
        let summary = CatalogSummary {
            services: snapshot.services.len(),
            quotas: snapshot.quota_count(),
        };

        *self
            .catalog_state
            .write()
            .map_err(|_| MonitorError::StatePoisoned)? = Arc::new(snapshot);

        debug!(
            services = summary.services,
            quotas = summary.quotas,
            "quota catalog refreshed"
        );
        Ok(summary)
    }

    pub async fn refresh_usage(&self) -> Result<UsageSummary, MonitorError> {
        let quotas = self.catalog_snapshot()?.all_quotas();

        let collected = self
            .collector
            .collect(
                &quotas,
                &self.filter,
                &self.usage_sources,
                self.metric_source.as_ref(),
            )
            .await?;

        let summary = UsageSummary {
            metric_quotas: collected.metric.len(),
            api_quotas: collected.api.len(),
            collisions: collected.collisions,
        };

        *self
            .usage_state
            .write()
            .map_err(|_| MonitorError::StatePoisoned)? = Arc::new(UsageSnapshot {
            metric: collected.metric,
            api: collected.api,
        });

        Ok(summary)
    }

    /// Inserts the alarm or replaces the threshold of an existing one.
    pub fn register_alarm(
        &self,
        name: impl Into<String>,
        threshold_percent: u32,
    ) -> Result<(), MonitorError> {
        let mut alarms = self
            .alarms
            .write()
            .map_err(|_| MonitorError::StatePoisoned)?;
        alarms.register(name, threshold_percent)?;
        Ok(())
    }

    pub fn remove_alarm(&self, name: &str) -> Result<bool, MonitorError> {
        let mut alarms = self
            .alarms
            .write()
            .map_err(|_| MonitorError::StatePoisoned)?;
        Ok(alarms.remove(name))
    }

    pub fn alarms(&self) -> Result<Vec<AlarmDefinition>, MonitorError> {
        let alarms = self
            .alarms
            .read()
            .map_err(|_| MonitorError::StatePoisoned)?;
        Ok(alarms.definitions())
    }

    pub fn metric_usage(&self) -> Result<BTreeMap<String, u64>, MonitorError> {
        Ok(self.usage_snapshot()?.metric.clone())
    }

    pub fn api_usage(&self) -> Result<BTreeMap<String, u64>, MonitorError> {
        Ok(self.usage_snapshot()?.api.clone())
    }

    /// The reconciled per-quota usage, derived from the raw maps on every call.
    pub fn reporting_view(&self) -> Result<BTreeMap<String, UsageRecord>, MonitorError> {
        let usage = self.usage_snapshot()?;
        Ok(reconcile(&usage.metric, &usage.api))
    }

    /// Reconciled usage joined with the catalog, ordered by quota code.
    /// Quotas that are no longer in the catalog are skipped.
    pub fn usage_report(&self) -> Result<Vec<QuotaUsage>, MonitorError> {
        let catalog = self.catalog_snapshot()?;
        let usage = self.usage_snapshot()?;

        let rows = reconcile(&usage.metric, &usage.api)
            .into_values()
            .filter_map(|record| {
                let quota = catalog.descriptor(&record.quota_code)?;
                Some(QuotaUsage {
                    service_code: quota.service_code.clone(),
                    service_name: catalog.service_name(&quota.service_code),
                    quota_code: record.quota_code,
                    quota_name: quota.quota_name.clone(),
                    usage: record.value,
                    limit: quota.reported_limit(),
                    source: record.source,
                })
            })
            .collect();

        Ok(rows)
    }

    /// Runs every registered alarm against every quota in the reporting view.
    /// Produces at most one warning per quota, ordered by quota code.
    pub fn evaluate_all(&self) -> Result<Vec<Warning>, MonitorError> {
        let catalog = self.catalog_snapshot()?;
        let usage = self.usage_snapshot()?;
        let alarms = self
            .alarms
            .read()
            .map_err(|_| MonitorError::StatePoisoned)?
            .clone();

        let mut warnings = Vec::new();
        for (quota_code, record) in reconcile(&usage.metric, &usage.api) {
            let Some(quota) = catalog.descriptor(&quota_code) else {
                continue;
            };
            let Some(matched) = alarms.evaluate(record.value, quota.limit()) else {
                continue;
            };

            warnings.push(Warning {
                service_code: quota.service_code.clone(),
                service_name: catalog.service_name(&quota.service_code),
                quota_code,
                quota_name: quota.quota_name.clone(),
                usage: record.value,
                limit: quota.reported_limit(),
                matched_alarm_name: matched.name,
                matched_threshold: matched.threshold_percent,
            });
        }

        Ok(warnings)
    }

    fn catalog_snapshot(&self) -> Result<Arc<CatalogSnapshot>, MonitorError> {
        self.catalog_state
            .read()
            .map(|snapshot| Arc::clone(&snapshot))
            .map_err(|_| MonitorError::StatePoisoned)
    }

    fn usage_snapshot(&self) -> Result<Arc<UsageSnapshot>, MonitorError> {
        self.usage_state
            .read()
            .map(|snapshot| Arc::clone(&snapshot))
            .map_err(|_| MonitorError::StatePoisoned)
    }
}
