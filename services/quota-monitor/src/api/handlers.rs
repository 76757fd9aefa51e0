use std::error::Error as StdError;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use quota_watch_core::{
    AlarmDefinition, CatalogSummary, MonitorError, QuotaDescriptor, QuotaUsage,
    ServiceDescriptor, UsageSummary,
};
use tracing::{error, info, warn};

use super::types::{
    AlarmRequest, AlarmsResponse, ErrorResponse, HealthResponse, RemoveAlarmResponse,
    WarningsResponse,
};
use super::ApiState;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

pub async fn health_check(State(state): State<Arc<ApiState>>) -> ApiResult<HealthResponse> {
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        service: "quota-monitor".to_string(),
        refresh_interval_secs: state.config.refresh_interval_secs,
        catalog_refresh_interval_secs: state.config.catalog_refresh_interval_secs,
    }))
}

pub async fn list_services(
    State(state): State<Arc<ApiState>>,
) -> ApiResult<Vec<ServiceDescriptor>> {
    let services = state.monitor.list_services().map_err(monitor_error)?;
    Ok(Json(services))
}

pub async fn list_quotas(
    State(state): State<Arc<ApiState>>,
    Path(service_code): Path<String>,
) -> ApiResult<Vec<QuotaDescriptor>> {
    let quotas = state
        .monitor
        .list_quotas(&service_code)
        .map_err(monitor_error)?;
    Ok(Json(quotas))
}

pub async fn get_quota(
    State(state): State<Arc<ApiState>>,
    Path((service_code, quota_code)): Path<(String, String)>,
) -> ApiResult<QuotaDescriptor> {
    let quota = state
        .monitor
        .get_quota(&service_code, &quota_code)
        .map_err(monitor_error)?;
    Ok(Json(quota))
}

pub async fn usage_report(State(state): State<Arc<ApiState>>) -> ApiResult<Vec<QuotaUsage>> {
    let report = state.monitor.usage_report().map_err(monitor_error)?;
    Ok(Json(report))
}

pub async fn list_warnings(State(state): State<Arc<ApiState>>) -> ApiResult<WarningsResponse> {
    let warnings = state.monitor.evaluate_all().map_err(monitor_error)?;
    Ok(Json(WarningsResponse {
        evaluated_at: Utc::now(),
        warnings,
    }))
}

pub async fn list_alarms(State(state): State<Arc<ApiState>>) -> ApiResult<AlarmsResponse> {
    let alarms = state.monitor.alarms().map_err(monitor_error)?;
    Ok(Json(AlarmsResponse { alarms }))
}

pub async fn put_alarm(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
    Json(request): Json<AlarmRequest>,
) -> ApiResult<AlarmDefinition> {
    state
        .monitor
        .register_alarm(name.clone(), request.threshold_percent)
        .map_err(monitor_error)?;

    info!(
        alarm = %name,
        threshold_percent = request.threshold_percent,
        "alarm registered"
    );

    Ok(Json(AlarmDefinition::new(name, request.threshold_percent)))
}

pub async fn delete_alarm(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
) -> ApiResult<RemoveAlarmResponse> {
    let removed = state.monitor.remove_alarm(&name).map_err(monitor_error)?;
    if !removed {
        return Err(not_found("unknown_alarm", &format!("alarm '{name}' not found")));
    }

    info!(alarm = %name, "alarm removed");
    Ok(Json(RemoveAlarmResponse { removed }))
}

pub async fn refresh_catalog(State(state): State<Arc<ApiState>>) -> ApiResult<CatalogSummary> {
    let summary = state
        .monitor
        .refresh_catalog()
        .await
        .map_err(monitor_error)?;
    Ok(Json(summary))
}

pub async fn refresh_usage(State(state): State<Arc<ApiState>>) -> ApiResult<UsageSummary> {
    let summary = state.monitor.refresh_usage().await.map_err(monitor_error)?;
    Ok(Json(summary))
}

fn not_found(code: &str, message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: message.to_string(),
            code: code.to_string(),
            details: None,
        }),
    )
}

fn monitor_error(err: MonitorError) -> (StatusCode, Json<ErrorResponse>) {
    let causes = error_chain(&err);
    let status = match &err {
        MonitorError::UnknownService(_) | MonitorError::UnknownQuota { .. } => {
            StatusCode::NOT_FOUND
        }
        MonitorError::InvalidAlarm(_) => StatusCode::BAD_REQUEST,
        MonitorError::CatalogUnavailable(_) | MonitorError::CollectionFailed { .. } => {
            warn!(error = %err, causes = ?causes, "upstream provider failure");
            StatusCode::BAD_GATEWAY
        }
        MonitorError::StatePoisoned => {
            error!(error = %err, "quota monitor state unusable");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    let details = (!causes.is_empty()).then(|| serde_json::json!({ "causes": causes }));

    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            code: err.code().to_string(),
            details,
        }),
    )
}

fn error_chain(err: &MonitorError) -> Vec<String> {
    let mut causes = Vec::new();
    let mut source = err.source();
    while let Some(cause) = source {
        causes.push(cause.to_string());
        source = cause.source();
    }
    causes
}
