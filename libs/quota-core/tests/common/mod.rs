#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use quota_watch_core::{
    AllowFilter, CatalogError, MetricDescriptor, MetricStatistic, MetricUsageSource,
    QuotaCatalog, QuotaDescriptor, ServiceDescriptor, UsageSource,
};

pub fn quota(service: &str, code: &str, applied: f64) -> QuotaDescriptor {
    QuotaDescriptor {
        service_code: service.to_string(),
        quota_code: code.to_string(),
        quota_name: format!("{code} name"),
        adjustable: true,
        is_global: false,
        default_value: applied,
        applied_value: applied,
        metric: None,
    }
}

pub fn metered_quota(service: &str, code: &str, applied: f64) -> QuotaDescriptor {
    let mut descriptor = quota(service, code, applied);
    descriptor.metric = Some(metric_for(code));
    descriptor
}

pub fn metric_for(code: &str) -> MetricDescriptor {
    MetricDescriptor {
        namespace: "AWS/Usage".to_string(),
        metric_name: code.to_string(),
        dimensions: BTreeMap::from([("Type".to_string(), "Resource".to_string())]),
        statistic: MetricStatistic::Maximum,
    }
}

#[derive(Default)]
pub struct FakeCatalog {
    services: Mutex<Vec<(ServiceDescriptor, Vec<QuotaDescriptor>)>>,
    // listed as services but unknown to list_quotas
    vanished: Mutex<Vec<ServiceDescriptor>>,
    pub fail: AtomicBool,
}

impl FakeCatalog {
    pub fn new(services: Vec<(ServiceDescriptor, Vec<QuotaDescriptor>)>) -> Self {
        Self {
            services: Mutex::new(services),
            vanished: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn advertise_vanished(&self, service: ServiceDescriptor) {
        self.vanished.lock().unwrap().push(service);
    }

    pub fn replace(&self, services: Vec<(ServiceDescriptor, Vec<QuotaDescriptor>)>) {
        *self.services.lock().unwrap() = services;
    }
}

#[async_trait]
impl QuotaCatalog for FakeCatalog {
    async fn list_services(
        &self,
        filter: &AllowFilter,
    ) -> Result<Vec<ServiceDescriptor>, CatalogError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CatalogError::Unavailable(anyhow!("catalog offline")));
        }
        let mut listed: Vec<ServiceDescriptor> = self
            .services
            .lock()
            .unwrap()
            .iter()
            .map(|(service, _)| service.clone())
            .collect();
        listed.extend(self.vanished.lock().unwrap().iter().cloned());
        Ok(listed
            .into_iter()
            .filter(|service| filter.allows_service(&service.code))
            .collect())
    }

    async fn list_quotas(
        &self,
        service_code: &str,
        allowed: Option<&BTreeSet<String>>,
    ) -> Result<Vec<QuotaDescriptor>, CatalogError> {
        let services = self.services.lock().unwrap();
        let (_, quotas) = services
            .iter()
            .find(|(service, _)| service.code == service_code)
            .ok_or_else(|| CatalogError::ServiceNotFound(service_code.to_string()))?;
        Ok(quotas
            .iter()
            .filter(|quota| allowed.map_or(true, |set| set.contains(&quota.quota_code)))
            .cloned()
            .collect())
    }
}

pub struct FakeUsageSource {
    service_code: String,
    usage: Mutex<BTreeMap<String, u64>>,
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
    pub last_allowed: Mutex<Option<Option<BTreeSet<String>>>>,
    delay: Option<Duration>,
    in_flight: Option<Arc<InFlight>>,
}

impl FakeUsageSource {
    pub fn new(service_code: &str, usage: &[(&str, u64)]) -> Self {
        Self {
            service_code: service_code.to_string(),
            usage: Mutex::new(
                usage
                    .iter()
                    .map(|(code, value)| (code.to_string(), *value))
                    .collect(),
            ),
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            last_allowed: Mutex::new(None),
            delay: None,
            in_flight: None,
        }
    }

    pub fn slow(mut self, delay: Duration, in_flight: Arc<InFlight>) -> Self {
        self.delay = Some(delay);
        self.in_flight = Some(in_flight);
        self
    }

    pub fn set(&self, code: &str, value: u64) {
        self.usage.lock().unwrap().insert(code.to_string(), value);
    }
}

#[async_trait]
impl UsageSource for FakeUsageSource {
    fn name(&self) -> &str {
        &self.service_code
    }

    fn service_code(&self) -> &str {
        &self.service_code
    }

    async fn get_usage(
        &self,
        allowed: Option<&BTreeSet<String>>,
    ) -> anyhow::Result<BTreeMap<String, u64>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_allowed.lock().unwrap() = Some(allowed.cloned());

        if let (Some(delay), Some(in_flight)) = (self.delay, self.in_flight.as_ref()) {
            in_flight.enter();
            tokio::time::sleep(delay).await;
            in_flight.leave();
        }

        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("{} listing failed", self.service_code);
        }

        Ok(self.usage.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct FakeMetricSource {
    samples: Mutex<BTreeMap<String, u64>>,
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
    delay: Option<Duration>,
    in_flight: Option<Arc<InFlight>>,
}

impl FakeMetricSource {
    pub fn new(samples: &[(&str, u64)]) -> Self {
        Self {
            samples: Mutex::new(
                samples
                    .iter()
                    .map(|(name, value)| (name.to_string(), *value))
                    .collect(),
            ),
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            delay: None,
            in_flight: None,
        }
    }

    pub fn slow(mut self, delay: Duration, in_flight: Arc<InFlight>) -> Self {
        self.delay = Some(delay);
        self.in_flight = Some(in_flight);
        self
    }
}

#[async_trait]
impl MetricUsageSource for FakeMetricSource {
    async fn get_usage(&self, metric: &MetricDescriptor) -> anyhow::Result<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let (Some(delay), Some(in_flight)) = (self.delay, self.in_flight.as_ref()) {
            in_flight.enter();
            tokio::time::sleep(delay).await;
            in_flight.leave();
        }
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("metric backend unavailable");
        }
        Ok(self
            .samples
            .lock()
            .unwrap()
            .get(&metric.metric_name)
            .copied()
            .unwrap_or(0))
    }
}

#[derive(Default)]
pub struct InFlight {
    current: AtomicUsize,
    pub max: AtomicUsize,
}

impl InFlight {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}
