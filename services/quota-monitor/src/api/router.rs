use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware::{self, Next},
    response::Response,
    routing::{get, post, put},
    Router,
};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use uuid::Uuid;

use super::handlers;
use super::ApiState;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

// Manual refreshes walk every provider, so this is well above a single
// provider request timeout.
const HANDLER_TIMEOUT: Duration = Duration::from_secs(120);

pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/v1/services", get(handlers::list_services))
        .route("/v1/services/:service_code/quotas", get(handlers::list_quotas))
        .route(
            "/v1/services/:service_code/quotas/:quota_code",
            get(handlers::get_quota),
        )
        .route("/v1/usage", get(handlers::usage_report))
        .route("/v1/warnings", get(handlers::list_warnings))
        .route("/v1/alarms", get(handlers::list_alarms))
        .route(
            "/v1/alarms/:name",
            put(handlers::put_alarm).delete(handlers::delete_alarm),
        )
        .route("/v1/refresh/catalog", post(handlers::refresh_catalog))
        .route("/v1/refresh/usage", post(handlers::refresh_usage))
        .with_state(state)
        .layer(middleware::from_fn(set_request_id))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(HANDLER_TIMEOUT))
}

/// Propagates the caller's `x-request-id`, or assigns a fresh one, and echoes
/// it on the response.
async fn set_request_id(mut request: Request<Body>, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    request.extensions_mut().insert(request_id.clone());

    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        request
            .headers_mut()
            .insert(REQUEST_ID_HEADER.clone(), header_value);
    }

    let mut response = next.run(request).await;

    if !response.headers().contains_key(&REQUEST_ID_HEADER) {
        if let Ok(header_value) = HeaderValue::from_str(&request_id) {
            response
                .headers_mut()
                .insert(REQUEST_ID_HEADER.clone(), header_value);
        }
    }

    response
}
