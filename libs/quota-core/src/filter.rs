use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Restricts which services and quotas take part in collection.
///
/// `None` means no restriction at all. Otherwise a service participates only
/// when its code is a key; a `None` value allows every quota of that service
/// and a set limits it to the listed quota codes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllowFilter {
    services: Option<BTreeMap<String, Option<BTreeSet<String>>>>,
}

impl AllowFilter {
    pub fn all() -> Self {
        Self { services: None }
    }

    pub fn from_services(services: BTreeMap<String, Option<BTreeSet<String>>>) -> Self {
        Self {
            services: Some(services),
        }
    }

    /// Builder-style helper: allow every quota of `service_code`.
    pub fn allow_service(mut self, service_code: impl Into<String>) -> Self {
        self.services
            .get_or_insert_with(BTreeMap::new)
            .insert(service_code.into(), None);
        self
    }

    /// Builder-style helper: allow only `quota_codes` within `service_code`.
    pub fn allow_quotas<I, S>(mut self, service_code: impl Into<String>, quota_codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let codes = quota_codes.into_iter().map(Into::into).collect();
        self.services
            .get_or_insert_with(BTreeMap::new)
            .insert(service_code.into(), Some(codes));
        self
    }

    pub fn is_unrestricted(&self) -> bool {
        self.services.is_none()
    }

    pub fn allows_service(&self, service_code: &str) -> bool {
        match &self.services {
            None => true,
            Some(services) => services.contains_key(service_code),
        }
    }

    /// Quota codes allowed for a service. `None` means all of them, which is
    /// also what a disabled service returns; check `allows_service` first.
    pub fn allowed_quotas(&self, service_code: &str) -> Option<&BTreeSet<String>> {
        self.services
            .as_ref()
            .and_then(|services| services.get(service_code))
            .and_then(|quotas| quotas.as_ref())
    }

    pub fn allows_quota(&self, service_code: &str, quota_code: &str) -> bool {
        if !self.allows_service(service_code) {
            return false;
        }
        match self.allowed_quotas(service_code) {
            None => true,
            Some(quotas) => quotas.contains(quota_code),
        }
    }

    pub fn service_codes(&self) -> Option<impl Iterator<Item = &str>> {
        self.services
            .as_ref()
            .map(|services| services.keys().map(String::as_str))
    }
}
