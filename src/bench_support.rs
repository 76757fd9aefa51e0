use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use quota_watch_core::{
    AllowFilter, CatalogError, MetricDescriptor, MetricStatistic, MetricUsageSource,
    QuotaCatalog, QuotaDescriptor, QuotaMonitor, ServiceDescriptor, UsageSource,
};
use quota_watch_monitor::inventory::{
    builtin_rules, builtin_sources, ResourceInventory, ResourceRecord,
};
use tokio::runtime::Runtime;

pub use quota_watch_core;
pub use quota_watch_monitor;

pub const BENCH_ALARMS: &[(&str, u32)] = &[("notice", 50), ("warn", 80), ("critical", 95)];

/// Catalog served from memory.
pub struct StaticCatalog {
    services: Vec<ServiceDescriptor>,
    quotas: BTreeMap<String, Vec<QuotaDescriptor>>,
}

#[async_trait]
impl QuotaCatalog for StaticCatalog {
    async fn list_services(
        &self,
        filter: &AllowFilter,
    ) -> Result<Vec<ServiceDescriptor>, CatalogError> {
        Ok(self
            .services
            .iter()
            .filter(|service| filter.allows_service(&service.code))
            .cloned()
            .collect())
    }

    async fn list_quotas(
        &self,
        service_code: &str,
        allowed: Option<&BTreeSet<String>>,
    ) -> Result<Vec<QuotaDescriptor>, CatalogError> {
        let quotas = self
            .quotas
            .get(service_code)
            .ok_or_else(|| CatalogError::ServiceNotFound(service_code.to_string()))?;
        Ok(quotas
            .iter()
            .filter(|quota| allowed.map_or(true, |codes| codes.contains(&quota.quota_code)))
            .cloned()
            .collect())
    }
}

/// Reads the sample from the metric's `Sample` dimension.
pub struct DimensionMetrics;

#[async_trait]
impl MetricUsageSource for DimensionMetrics {
    async fn get_usage(&self, metric: &MetricDescriptor) -> Result<u64> {
        Ok(metric
            .dimensions
            .get("Sample")
            .and_then(|value| value.parse().ok())
            .unwrap_or(0))
    }
}

pub struct StaticUsage {
    service_code: String,
    usage: BTreeMap<String, u64>,
}

#[async_trait]
impl UsageSource for StaticUsage {
    fn name(&self) -> &str {
        "static"
    }

    fn service_code(&self) -> &str {
        &self.service_code
    }

    async fn get_usage(
        &self,
        allowed: Option<&BTreeSet<String>>,
    ) -> Result<BTreeMap<String, u64>> {
        Ok(self
            .usage
            .iter()
            .filter(|(code, _)| allowed.map_or(true, |codes| codes.contains(*code)))
            .map(|(code, value)| (code.clone(), *value))
            .collect())
    }
}

/// Inventory that returns `per_kind` synthetic records for every kind.
pub struct SyntheticInventory {
    per_kind: usize,
}

#[async_trait]
impl ResourceInventory for SyntheticInventory {
    async fn list_resources(
        &self,
        _service_code: &str,
        kind: &str,
    ) -> Result<Vec<ResourceRecord>> {
        const FAMILIES: &[&str] = &["m5", "c5", "r5", "m5d", "x1", "z1d"];

        Ok((0..self.per_kind)
            .map(|index| {
                ResourceRecord::new()
                    .with("id", format!("{kind}-{index}"))
                    .with(
                        "instance_type",
                        format!("{}.large", FAMILIES[index % FAMILIES.len()]),
                    )
                    .with("domain", if index % 3 == 0 { "standard" } else { "vpc" })
                    .with(
                        "vpc_endpoint_type",
                        if index % 2 == 0 { "Gateway" } else { "Interface" },
                    )
            })
            .collect())
    }
}

pub struct MonitorBenchFixture {
    pub monitor: Arc<QuotaMonitor>,
    pub runtime: Runtime,
}

impl MonitorBenchFixture {
    /// `services` services with `quotas_per_service` quotas each; every other
    /// quota is metered, the rest are counted by a per-service usage source.
    pub fn synthetic(services: usize, quotas_per_service: usize) -> Result<Self> {
        let mut catalog = StaticCatalog {
            services: Vec::new(),
            quotas: BTreeMap::new(),
        };
        let mut usage_sources: Vec<Arc<dyn UsageSource>> = Vec::new();

        for service_index in 0..services {
            let service_code = format!("svc{service_index:03}");
            let mut quotas = Vec::new();
            let mut api_usage = BTreeMap::new();

            for quota_index in 0..quotas_per_service {
                let quota_code = format!("L-{service_index:03}{quota_index:05}");
                let sample = ((service_index * 7 + quota_index * 13) % 120) as u64;
                let metric = (quota_index % 2 == 0).then(|| MetricDescriptor {
                    namespace: "AWS/Usage".to_string(),
                    metric_name: "ResourceCount".to_string(),
                    dimensions: BTreeMap::from([("Sample".to_string(), sample.to_string())]),
                    statistic: MetricStatistic::Maximum,
                });
                if metric.is_none() {
                    api_usage.insert(quota_code.clone(), sample);
                }

                quotas.push(QuotaDescriptor {
                    service_code: service_code.clone(),
                    quota_code,
                    quota_name: format!("Synthetic quota {quota_index}"),
                    adjustable: true,
                    is_global: false,
                    default_value: 100.0,
                    applied_value: 100.0,
                    metric,
                });
            }

            catalog.services.push(ServiceDescriptor::new(
                service_code.clone(),
                format!("Synthetic service {service_index}"),
            ));
            catalog.quotas.insert(service_code.clone(), quotas);
            usage_sources.push(Arc::new(StaticUsage {
                service_code,
                usage: api_usage,
            }));
        }

        let monitor = QuotaMonitor::new(
            Arc::new(catalog),
            Arc::new(DimensionMetrics),
            AllowFilter::all(),
        )
        .with_usage_sources(usage_sources);

        Self::refreshed(monitor)
    }

    /// Monitor over the built-in ec2 and vpc inventory rules.
    pub fn inventory_backed(resources_per_kind: usize) -> Result<Self> {
        let mut catalog = StaticCatalog {
            services: Vec::new(),
            quotas: BTreeMap::new(),
        };
        for service_code in ["ec2", "vpc"] {
            let quotas = builtin_rules(service_code)
                .into_iter()
                .map(|rule| QuotaDescriptor {
                    service_code: service_code.to_string(),
                    quota_name: format!("{} in use", rule.kind),
                    quota_code: rule.quota_code,
                    adjustable: true,
                    is_global: false,
                    default_value: resources_per_kind as f64,
                    applied_value: resources_per_kind as f64,
                    metric: None,
                })
                .collect();
            catalog
                .services
                .push(ServiceDescriptor::new(service_code, service_code.to_uppercase()));
            catalog.quotas.insert(service_code.to_string(), quotas);
        }

        let filter = AllowFilter::default().allow_service("ec2").allow_service("vpc");
        let inventory = Arc::new(SyntheticInventory {
            per_kind: resources_per_kind,
        });
        let monitor = QuotaMonitor::new(Arc::new(catalog), Arc::new(DimensionMetrics), filter)
            .with_usage_sources(builtin_sources(inventory));

        Self::refreshed(monitor)
    }

    fn refreshed(monitor: QuotaMonitor) -> Result<Self> {
        for (name, threshold) in BENCH_ALARMS {
            monitor.register_alarm(*name, *threshold)?;
        }

        let runtime = Runtime::new()?;
        runtime.block_on(async {
            monitor.refresh_catalog().await?;
            monitor.refresh_usage().await?;
            Ok::<_, anyhow::Error>(())
        })?;

        Ok(Self {
            monitor: Arc::new(monitor),
            runtime,
        })
    }
}
