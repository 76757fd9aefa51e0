use anyhow::Error as AnyhowError;
use thiserror::Error;

use crate::alarm::AlarmError;
use crate::collector::CollectionError;
use crate::source::CatalogError;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("service '{0}' not found")]
    UnknownService(String),
    #[error("quota '{quota_code}' not found for service '{service_code}'")]
    UnknownQuota {
        service_code: String,
        quota_code: String,
    },
    #[error("quota catalog unavailable")]
    CatalogUnavailable(#[source] CatalogError),
    #[error("usage collection failed in '{collaborator}'")]
    CollectionFailed {
        collaborator: String,
        #[source]
        source: AnyhowError,
    },
    #[error("invalid alarm: {0}")]
    InvalidAlarm(#[from] AlarmError),
    #[error("monitor state lock poisoned")]
    StatePoisoned,
}

impl From<CollectionError> for MonitorError {
    fn from(err: CollectionError) -> Self {
        MonitorError::CollectionFailed {
            collaborator: err.collaborator,
            source: err.source,
        }
    }
}

impl MonitorError {
    /// Stable machine-readable identifier for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            MonitorError::UnknownService(_) => "unknown_service",
            MonitorError::UnknownQuota { .. } => "unknown_quota",
            MonitorError::CatalogUnavailable(_) => "catalog_unavailable",
            MonitorError::CollectionFailed { .. } => "collection_failed",
            MonitorError::InvalidAlarm(_) => "invalid_alarm",
            MonitorError::StatePoisoned => "state_poisoned",
        }
    }
}
