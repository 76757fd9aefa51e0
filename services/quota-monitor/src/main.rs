use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use quota_watch_monitor::api::{self, ApiState};
use quota_watch_monitor::config::MonitorConfig;
use quota_watch_monitor::{build_monitor, refresh};

#[tokio::main]
async fn main() -> Result<()> {
    let config = MonitorConfig::from_env()?;
    init_tracing(&config.log_level)?;

    info!(
        listen = %config.listen_addr(),
        catalog_url = %config.catalog_url,
        metrics_url = %config.metrics_url,
        inventory_url = %config.inventory_url,
        alarms = config.alarms.len(),
        "starting quota-monitor service"
    );

    let monitor = Arc::new(build_monitor(&config)?);

    if config.refresh_on_startup {
        refresh::refresh_all(&monitor).await;
    }

    let _usage_task = config
        .refresh_interval()
        .map(|period| refresh::spawn_refresh_task(Arc::clone(&monitor), period));
    let _catalog_task = config
        .catalog_refresh_interval()
        .map(|period| refresh::spawn_catalog_refresh_task(Arc::clone(&monitor), period));

    let listen_addr = config.listen_addr();
    let state = Arc::new(ApiState::new(Arc::clone(&monitor), config));
    let router = api::create_router(state);

    let listener = TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("failed to bind {listen_addr}"))?;
    info!(addr = %listen_addr, "quota-monitor listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("quota-monitor service shutting down");
    Ok(())
}

fn init_tracing(default_level: &str) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    fmt().with_env_filter(filter).compact().try_init().map_err(|err| anyhow::anyhow!(err))?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
