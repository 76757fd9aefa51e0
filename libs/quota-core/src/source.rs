use std::collections::{BTreeMap, BTreeSet};

use anyhow::Error as AnyhowError;
use async_trait::async_trait;
use thiserror::Error;

use crate::filter::AllowFilter;
use crate::model::{MetricDescriptor, QuotaDescriptor, ServiceDescriptor};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("service '{0}' not found in quota catalog")]
    ServiceNotFound(String),
    #[error("quota catalog unavailable")]
    Unavailable(#[source] AnyhowError),
}

/// Supplies the services and quota descriptors that are tracked.
#[async_trait]
pub trait QuotaCatalog: Send + Sync {
    async fn list_services(
        &self,
        filter: &AllowFilter,
    ) -> Result<Vec<ServiceDescriptor>, CatalogError>;

    /// `allowed` of `None` means every quota of the service.
    async fn list_quotas(
        &self,
        service_code: &str,
        allowed: Option<&BTreeSet<String>>,
    ) -> Result<Vec<QuotaDescriptor>, CatalogError>;
}

/// Counts live resources for one service, keyed by quota code.
///
/// Implementations return only the codes they know how to compute; allowed
/// codes they do not recognise are skipped, not reported as errors.
#[async_trait]
pub trait UsageSource: Send + Sync {
    fn name(&self) -> &str;

    fn service_code(&self) -> &str;

    async fn get_usage(
        &self,
        allowed: Option<&BTreeSet<String>>,
    ) -> anyhow::Result<BTreeMap<String, u64>>;
}

/// Reads a single usage sample for a quota's metric.
#[async_trait]
pub trait MetricUsageSource: Send + Sync {
    fn name(&self) -> &str {
        "metrics"
    }

    async fn get_usage(&self, metric: &MetricDescriptor) -> anyhow::Result<u64>;
}
