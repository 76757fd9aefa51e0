//! Runnable quota monitor: HTTP-backed collaborators for the core monitor,
//! a periodic refresh driver and the JSON API.

pub mod api;
pub mod catalog;
pub mod config;
pub mod inventory;
pub mod metrics;
pub mod provider;
pub mod refresh;

use std::sync::Arc;

use anyhow::Result;
use quota_watch_core::{QuotaMonitor, UsageCollector};

use catalog::HttpQuotaCatalog;
use config::MonitorConfig;
use inventory::{builtin_sources, HttpResourceInventory};
use metrics::HttpMetricSource;
use provider::ProviderClient;

/// Wires the HTTP collaborators described by `config` into a monitor and
/// registers the configured alarms.
pub fn build_monitor(config: &MonitorConfig) -> Result<QuotaMonitor> {
    let timeout = config.request_timeout();
    let token = config.provider_token.clone();

    let catalog = HttpQuotaCatalog::new(ProviderClient::new(
        &config.catalog_url,
        token.clone(),
        timeout,
    )?);
    let metrics = HttpMetricSource::new(
        ProviderClient::new(&config.metrics_url, token.clone(), timeout)?,
        config.metric_window_minutes,
        config.metric_period_secs,
    );
    let inventory =
        HttpResourceInventory::new(ProviderClient::new(&config.inventory_url, token, timeout)?);

    let monitor = QuotaMonitor::new(
        Arc::new(catalog),
        Arc::new(metrics),
        config.allow_filter.clone(),
    )
    .with_usage_sources(builtin_sources(Arc::new(inventory)))
    .with_collector(UsageCollector::new(config.collection_concurrency));

    for alarm in &config.alarms {
        monitor.register_alarm(alarm.name.clone(), alarm.threshold_percent)?;
    }

    Ok(monitor)
}
