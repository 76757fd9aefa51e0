use std::sync::Arc;
use std::time::Duration;

use quota_watch_core::{QuotaMonitor, UsageSummary};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info};

/// Runs the initial catalog and usage refresh. Failures are logged and the
/// monitor keeps whatever state it had.
pub async fn refresh_all(monitor: &QuotaMonitor) {
    match monitor.refresh_catalog().await {
        Ok(summary) => info!(
            services = summary.services,
            quotas = summary.quotas,
            "quota catalog loaded"
        ),
        Err(err) => {
            error!(error = %err, code = err.code(), "initial catalog refresh failed");
            return;
        }
    }

    match monitor.refresh_usage().await {
        Ok(summary) => log_usage_refresh(&summary),
        Err(err) => error!(error = %err, code = err.code(), "initial usage refresh failed"),
    }
}

/// Refreshes usage every `period`, starting one period from now.
pub fn spawn_refresh_task(monitor: Arc<QuotaMonitor>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            match monitor.refresh_usage().await {
                Ok(summary) => log_usage_refresh(&summary),
                Err(err) => {
                    error!(error = %err, code = err.code(), "usage refresh failed");
                }
            }
        }
    })
}

pub fn spawn_catalog_refresh_task(
    monitor: Arc<QuotaMonitor>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            match monitor.refresh_catalog().await {
                Ok(summary) => info!(
                    services = summary.services,
                    quotas = summary.quotas,
                    "quota catalog refreshed"
                ),
                Err(err) => {
                    error!(error = %err, code = err.code(), "catalog refresh failed");
                }
            }
        }
    })
}

fn log_usage_refresh(summary: &UsageSummary) {
    info!(
        metric_quotas = summary.metric_quotas,
        api_quotas = summary.api_quotas,
        collisions = summary.collisions.len(),
        "quota usage refreshed"
    );
}
