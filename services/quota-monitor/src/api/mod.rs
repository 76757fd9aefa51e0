use std::sync::Arc;

use quota_watch_core::QuotaMonitor;

pub mod handlers;
pub mod router;
pub mod types;

pub use router::create_router;
pub use types::*;

use crate::config::MonitorConfig;

pub struct ApiState {
    pub monitor: Arc<QuotaMonitor>,
    pub config: Arc<MonitorConfig>,
}

impl ApiState {
    pub fn new(monitor: Arc<QuotaMonitor>, config: MonitorConfig) -> Self {
        Self {
            monitor,
            config: Arc::new(config),
        }
    }
}
