use std::sync::Arc;

use anyhow::Result;
use quota_watch_core::{AllowFilter, UsageProvenance};
use quota_watch_monitor::api::{create_router, ApiState};
use quota_watch_monitor::build_monitor;
use quota_watch_monitor::config::{parse_alarms, MonitorConfig};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "integration-token";

async fn provider() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/services"))
        .and(query_param_is_missing("next_token"))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "services": [
                { "service_code": "ec2", "service_name": "Amazon Elastic Compute Cloud (Amazon EC2)" }
            ],
            "next_token": "page-2"
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/services"))
        .and(query_param("next_token", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "services": [
                { "service_code": "s3", "service_name": "Amazon Simple Storage Service (Amazon S3)" }
            ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/services/ec2/quotas/defaults"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "quotas": [
                {
                    "quota_code": "L-4FB7FF5D",
                    "quota_name": "Customer gateways per Region",
                    "adjustable": true,
                    "global_quota": false,
                    "value": 50.0
                },
                {
                    "quota_code": "L-1216C47A",
                    "quota_name": "Running On-Demand Standard instances",
                    "adjustable": true,
                    "global_quota": false,
                    "value": 20.0,
                    "usage_metric": {
                        "metric_namespace": "AWS/Usage",
                        "metric_name": "ResourceCount",
                        "metric_dimensions": {
                            "Class": "Standard/OnDemand",
                            "Resource": "vCPU",
                            "Service": "EC2",
                            "Type": "Resource"
                        },
                        "metric_statistic_recommendation": "Maximum"
                    }
                },
                {
                    "quota_code": "L-0263D0A3",
                    "quota_name": "EC2-VPC Elastic IPs",
                    "adjustable": true,
                    "global_quota": false,
                    "value": 5.0
                },
                {
                    "quota_code": "L-34B43A08",
                    "quota_name": "All Standard Spot Instance Requests",
                    "adjustable": true,
                    "global_quota": false,
                    "value": 640.0
                }
            ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/services/ec2/quotas/L-4FB7FF5D"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": 100.0 })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/metrics/statistics"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "datapoints": [
                { "timestamp": "2024-05-01T12:00:00Z", "maximum": 11.0 },
                { "timestamp": "2024-05-01T12:05:00Z", "maximum": 18.0 }
            ]
        })))
        .expect(1..)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/services/ec2/resources/customer-gateways"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                { "customer_gateway_id": "cgw-1" },
                { "customer_gateway_id": "cgw-2" },
                { "customer_gateway_id": "cgw-3" }
            ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/services/ec2/resources/addresses"))
        .and(query_param_is_missing("next_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                { "allocation_id": "eipalloc-1", "domain": "vpc" },
                { "allocation_id": "eipalloc-2", "domain": "vpc" },
                { "allocation_id": "eipalloc-3", "domain": "standard" }
            ],
            "next_token": "more"
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/services/ec2/resources/addresses"))
        .and(query_param("next_token", "more"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                { "allocation_id": "eipalloc-4", "domain": "vpc" },
                { "allocation_id": "eipalloc-5", "domain": "vpc" }
            ]
        })))
        .mount(&server)
        .await;

    server
}

fn config_for(server: &MockServer) -> MonitorConfig {
    let allow_filter: AllowFilter = serde_json::from_value(json!({
        "ec2": ["L-4FB7FF5D", "L-1216C47A", "L-0263D0A3"]
    }))
    .expect("valid allow filter");

    MonitorConfig {
        catalog_url: server.uri(),
        metrics_url: server.uri(),
        inventory_url: server.uri(),
        provider_token: Some(TOKEN.to_string()),
        allow_filter,
        alarms: parse_alarms("warn:80,critical:90").expect("valid alarms"),
        request_timeout_secs: 2,
        ..MonitorConfig::default()
    }
}

async fn start_api(config: MonitorConfig) -> Result<(JoinHandle<()>, String)> {
    let monitor = Arc::new(build_monitor(&config)?);
    monitor.refresh_catalog().await?;
    monitor.refresh_usage().await?;

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let base_url = format!("http://{}", listener.local_addr()?);
    let router = create_router(Arc::new(ApiState::new(monitor, config)));
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    Ok((handle, base_url))
}

async fn teardown(handle: JoinHandle<()>) {
    handle.abort();
    let _ = handle.await;
}

#[tokio::test(flavor = "multi_thread")]
async fn monitor_reconciles_http_providers() -> Result<()> {
    let server = provider().await;
    let monitor = build_monitor(&config_for(&server))?;

    let catalog = monitor.refresh_catalog().await?;
    assert_eq!(catalog.services, 1);
    assert_eq!(catalog.quotas, 3);

    let overridden = monitor.get_quota("ec2", "L-4FB7FF5D")?;
    assert_eq!(overridden.default_value, 50.0);
    assert_eq!(overridden.applied_value, 100.0);
    assert_eq!(monitor.get_quota("ec2", "L-0263D0A3")?.applied_value, 5.0);
    assert!(monitor.get_quota("ec2", "L-34B43A08").is_err());

    let usage = monitor.refresh_usage().await?;
    assert_eq!(usage.metric_quotas, 1);
    assert_eq!(usage.api_quotas, 2);
    assert!(usage.collisions.is_empty());

    let report = monitor.usage_report()?;
    let eips = report
        .iter()
        .find(|entry| entry.quota_code == "L-0263D0A3")
        .expect("elastic ip usage");
    assert_eq!(eips.usage, 4);
    assert_eq!(eips.source, UsageProvenance::Api);
    let instances = report
        .iter()
        .find(|entry| entry.quota_code == "L-1216C47A")
        .expect("instance usage");
    assert_eq!(instances.usage, 18);
    assert_eq!(instances.source, UsageProvenance::Metric);

    let warnings = monitor.evaluate_all()?;
    let summary: Vec<(&str, &str, u32)> = warnings
        .iter()
        .map(|warning| {
            (
                warning.quota_code.as_str(),
                warning.matched_alarm_name.as_str(),
                warning.matched_threshold,
            )
        })
        .collect();
    assert_eq!(
        summary,
        vec![("L-0263D0A3", "warn", 80), ("L-1216C47A", "critical", 90)]
    );

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn api_serves_catalog_usage_and_warnings() -> Result<()> {
    let server = provider().await;
    let (handle, base_url) = start_api(config_for(&server)).await?;
    let client = Client::new();

    let response = client.get(format!("{base_url}/health")).send().await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let services: Value = client
        .get(format!("{base_url}/v1/services"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(services.as_array().map(Vec::len), Some(1));
    assert_eq!(services[0]["code"], "ec2");

    let quota: Value = client
        .get(format!("{base_url}/v1/services/ec2/quotas/L-4FB7FF5D"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(quota["applied_value"], 100.0);

    let missing = client
        .get(format!("{base_url}/v1/services/s3/quotas"))
        .send()
        .await?;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    let body: Value = missing.json().await?;
    assert_eq!(body["code"], "unknown_service");

    let usage: Value = client
        .get(format!("{base_url}/v1/usage"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(usage.as_array().map(Vec::len), Some(3));

    let warnings: Value = client
        .get(format!("{base_url}/v1/warnings"))
        .send()
        .await?
        .json()
        .await?;
    assert!(warnings["evaluated_at"].is_string());
    assert_eq!(warnings["warnings"].as_array().map(Vec::len), Some(2));
    assert_eq!(warnings["warnings"][1]["matched_alarm_name"], "critical");

    let response = client
        .post(format!("{base_url}/v1/refresh/catalog"))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let catalog: Value = response.json().await?;
    assert_eq!(catalog, json!({ "services": 1, "quotas": 3 }));

    let response = client
        .post(format!("{base_url}/v1/refresh/usage"))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let usage: Value = response.json().await?;
    assert_eq!(usage["metric_quotas"], 1);
    assert_eq!(usage["api_quotas"], 2);
    assert_eq!(usage["collisions"], json!([]));

    teardown(handle).await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn api_manages_alarms() -> Result<()> {
    let server = provider().await;
    let (handle, base_url) = start_api(config_for(&server)).await?;
    let client = Client::new();

    // raising critical above 90% leaves the instance quota on warn
    let response = client
        .put(format!("{base_url}/v1/alarms/critical"))
        .json(&json!({ "threshold_percent": 95 }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let warnings: Value = client
        .get(format!("{base_url}/v1/warnings"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(warnings["warnings"][1]["matched_alarm_name"], "warn");

    let removed = client
        .delete(format!("{base_url}/v1/alarms/warn"))
        .send()
        .await?;
    assert_eq!(removed.status(), StatusCode::OK);

    let alarms: Value = client
        .get(format!("{base_url}/v1/alarms"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(alarms["alarms"], json!([{ "name": "critical", "threshold_percent": 95 }]));

    let warnings: Value = client
        .get(format!("{base_url}/v1/warnings"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(warnings["warnings"], json!([]));

    let unknown = client
        .delete(format!("{base_url}/v1/alarms/warn"))
        .send()
        .await?;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

    let blank = client
        .put(format!("{base_url}/v1/alarms/%20"))
        .json(&json!({ "threshold_percent": 10 }))
        .send()
        .await?;
    assert_eq!(blank.status(), StatusCode::BAD_REQUEST);
    let body: Value = blank.json().await?;
    assert_eq!(body["code"], "invalid_alarm");

    teardown(handle).await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn catalog_outage_maps_to_bad_gateway() -> Result<()> {
    let server = provider().await;
    let (handle, base_url) = start_api(config_for(&server)).await?;
    let client = Client::new();

    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/v1/services"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let response = client
        .post(format!("{base_url}/v1/refresh/catalog"))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body: Value = response.json().await?;
    assert_eq!(body["code"], "catalog_unavailable");

    // the previous catalog stays visible
    let services: Value = client
        .get(format!("{base_url}/v1/services"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(services.as_array().map(Vec::len), Some(1));

    teardown(handle).await;
    Ok(())
}
