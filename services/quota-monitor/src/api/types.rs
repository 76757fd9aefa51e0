use chrono::{DateTime, Utc};
use quota_watch_core::{AlarmDefinition, Warning};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub refresh_interval_secs: u64,
    pub catalog_refresh_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmRequest {
    pub threshold_percent: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmsResponse {
    pub alarms: Vec<AlarmDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveAlarmResponse {
    pub removed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarningsResponse {
    pub evaluated_at: DateTime<Utc>,
    pub warnings: Vec<Warning>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub details: Option<serde_json::Value>,
}
