//! Resource enumeration for quotas that have no usage metric.
//!
//! Each supported service is described by a table of [`InventoryRule`]s
//! mapping a quota code to a resource kind and an optional attribute filter.
//! [`InventoryUsageSource`] turns one service's table into a
//! [`quota_watch_core::UsageSource`].

pub mod client;
pub mod rules;
pub mod source;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use client::HttpResourceInventory;
pub use rules::{builtin_rules, builtin_sources, SUPPORTED_SERVICES};
pub use source::InventoryUsageSource;

/// One listed resource, as a flat map of attribute name to value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceRecord {
    attributes: BTreeMap<String, String>,
}

impl ResourceRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, attribute: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(attribute.into(), value.into());
        self
    }

    pub fn get(&self, attribute: &str) -> Option<&str> {
        self.attributes.get(attribute).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceFilter {
    Equals { attribute: String, value: String },
    StartsWith { attribute: String, prefix: String },
    /// Matches when any inner filter matches.
    Any(Vec<ResourceFilter>),
}

impl ResourceFilter {
    pub fn equals(attribute: &str, value: &str) -> Self {
        ResourceFilter::Equals {
            attribute: attribute.to_string(),
            value: value.to_string(),
        }
    }

    pub fn starts_with(attribute: &str, prefix: &str) -> Self {
        ResourceFilter::StartsWith {
            attribute: attribute.to_string(),
            prefix: prefix.to_string(),
        }
    }

    pub fn matches(&self, record: &ResourceRecord) -> bool {
        match self {
            ResourceFilter::Equals { attribute, value } => record.get(attribute) == Some(value),
            ResourceFilter::StartsWith { attribute, prefix } => record
                .get(attribute)
                .is_some_and(|actual| actual.starts_with(prefix.as_str())),
            ResourceFilter::Any(filters) => filters.iter().any(|filter| filter.matches(record)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryRule {
    pub quota_code: String,
    pub kind: String,
    pub filter: Option<ResourceFilter>,
}

impl InventoryRule {
    pub fn new(quota_code: &str, kind: &str) -> Self {
        Self {
            quota_code: quota_code.to_string(),
            kind: kind.to_string(),
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: ResourceFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn matches(&self, record: &ResourceRecord) -> bool {
        self.filter
            .as_ref()
            .map_or(true, |filter| filter.matches(record))
    }
}

/// Lists the live resources of one kind within a service.
#[async_trait]
pub trait ResourceInventory: Send + Sync {
    async fn list_resources(&self, service_code: &str, kind: &str)
        -> anyhow::Result<Vec<ResourceRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equals_requires_exact_value() {
        let filter = ResourceFilter::equals("domain", "vpc");
        assert!(filter.matches(&ResourceRecord::new().with("domain", "vpc")));
        assert!(!filter.matches(&ResourceRecord::new().with("domain", "standard")));
        assert!(!filter.matches(&ResourceRecord::new()));
    }

    #[test]
    fn any_matches_on_either_branch() {
        let filter = ResourceFilter::Any(vec![
            ResourceFilter::starts_with("instance_type", "m5."),
            ResourceFilter::equals("instance_family", "m5"),
        ]);

        assert!(filter.matches(&ResourceRecord::new().with("instance_type", "m5.large")));
        assert!(filter.matches(&ResourceRecord::new().with("instance_family", "m5")));
        assert!(!filter.matches(&ResourceRecord::new().with("instance_type", "m5a.large")));
        assert!(!filter.matches(&ResourceRecord::new().with("instance_family", "m5d")));
    }

    #[test]
    fn rule_without_filter_counts_everything() {
        let rule = InventoryRule::new("L-F678F1CE", "vpcs");
        assert!(rule.matches(&ResourceRecord::new()));
    }
}
