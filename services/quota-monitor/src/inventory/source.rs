use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use quota_watch_core::UsageSource;
use tracing::debug;

use super::{InventoryRule, ResourceInventory};

/// Counts resources for one service according to its rule table.
///
/// Every resource kind needed by the selected rules is listed once per
/// `get_usage` call, however many quotas read from it.
pub struct InventoryUsageSource {
    name: String,
    service_code: String,
    rules: Vec<InventoryRule>,
    inventory: Arc<dyn ResourceInventory>,
}

impl InventoryUsageSource {
    pub fn new(
        service_code: &str,
        rules: Vec<InventoryRule>,
        inventory: Arc<dyn ResourceInventory>,
    ) -> Self {
        Self {
            name: format!("inventory:{service_code}"),
            service_code: service_code.to_string(),
            rules,
            inventory,
        }
    }

    pub fn rules(&self) -> &[InventoryRule] {
        &self.rules
    }
}

#[async_trait]
impl UsageSource for InventoryUsageSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn service_code(&self) -> &str {
        &self.service_code
    }

    async fn get_usage(
        &self,
        allowed: Option<&BTreeSet<String>>,
    ) -> anyhow::Result<BTreeMap<String, u64>> {
        let selected: Vec<&InventoryRule> = self
            .rules
            .iter()
            .filter(|rule| allowed.map_or(true, |codes| codes.contains(&rule.quota_code)))
            .collect();

        let kinds: BTreeSet<&str> = selected.iter().map(|rule| rule.kind.as_str()).collect();
        let mut listings = BTreeMap::new();
        for kind in kinds {
            let records = self
                .inventory
                .list_resources(&self.service_code, kind)
                .await?;
            debug!(
                service_code = %self.service_code,
                kind,
                resources = records.len(),
                "listed resources"
            );
            listings.insert(kind, records);
        }

        let mut usage = BTreeMap::new();
        for rule in selected {
            let count = listings
                .get(rule.kind.as_str())
                .map_or(0, |records| {
                    records.iter().filter(|record| rule.matches(record)).count()
                });
            usage.insert(rule.quota_code.clone(), count as u64);
        }

        Ok(usage)
    }
}
