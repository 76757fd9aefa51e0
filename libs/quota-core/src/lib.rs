//! Usage reconciliation and alarm evaluation for cloud service quotas.
//!
//! The crate does no I/O of its own. Quota descriptors, resource counts and
//! metric samples come from the collaborators in [`source`]; [`QuotaMonitor`]
//! merges them and reports which quotas are approaching their limits.

pub mod alarm;
pub mod collector;
pub mod error;
pub mod filter;
pub mod model;
pub mod monitor;
pub mod reconcile;
pub mod source;

pub use alarm::{evaluate, AlarmError, AlarmMatch, AlarmRegistry};
pub use collector::{
    CollectedUsage, CollectionError, UsageCollector, DEFAULT_COLLECTION_CONCURRENCY,
};
pub use error::MonitorError;
pub use filter::AllowFilter;
pub use model::{
    AlarmDefinition, MetricDescriptor, MetricStatistic, QuotaDescriptor, QuotaUsage,
    ServiceDescriptor, UsageProvenance, UsageRecord, Warning,
};
pub use monitor::{CatalogSummary, QuotaMonitor, UsageSummary};
pub use reconcile::reconcile;
pub use source::{CatalogError, MetricUsageSource, QuotaCatalog, UsageSource};
