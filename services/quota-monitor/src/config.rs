use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use quota_watch_core::{AlarmDefinition, AllowFilter, DEFAULT_COLLECTION_CONCURRENCY};

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub server_host: String,
    pub server_port: u16,
    pub catalog_url: String,
    pub metrics_url: String,
    pub inventory_url: String,
    pub provider_token: Option<String>,
    pub allow_filter: AllowFilter,
    pub alarms: Vec<AlarmDefinition>,
    pub refresh_on_startup: bool,
    pub refresh_interval_secs: u64,
    pub catalog_refresh_interval_secs: u64,
    pub collection_concurrency: usize,
    pub metric_window_minutes: u64,
    pub metric_period_secs: u64,
    pub request_timeout_secs: u64,
    pub log_level: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            server_port: 8184,
            catalog_url: "http://127.0.0.1:9000".to_string(),
            metrics_url: "http://127.0.0.1:9001".to_string(),
            inventory_url: "http://127.0.0.1:9002".to_string(),
            provider_token: None,
            allow_filter: AllowFilter::all(),
            alarms: Vec::new(),
            refresh_on_startup: true,
            refresh_interval_secs: 300,
            catalog_refresh_interval_secs: 3_600,
            collection_concurrency: DEFAULT_COLLECTION_CONCURRENCY,
            metric_window_minutes: 5,
            metric_period_secs: 300,
            request_timeout_secs: 10,
            log_level: "info".to_string(),
        }
    }
}

impl MonitorConfig {
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        if let Ok(host) = env::var("QUOTA_MONITOR_HOST") {
            cfg.server_host = host;
        }
        if let Ok(port) = env::var("QUOTA_MONITOR_PORT") {
            cfg.server_port = port
                .parse()
                .context("QUOTA_MONITOR_PORT must be a valid u16")?;
        }
        if let Ok(url) = env::var("QUOTA_CATALOG_URL") {
            cfg.catalog_url = url;
        }
        if let Ok(url) = env::var("METRICS_URL") {
            cfg.metrics_url = url;
        }
        if let Ok(url) = env::var("INVENTORY_URL") {
            cfg.inventory_url = url;
        }
        if let Ok(token) = env::var("PROVIDER_TOKEN") {
            if !token.trim().is_empty() {
                cfg.provider_token = Some(token);
            }
        }

        match (env::var("ALLOW_FILTER_PATH"), env::var("ALLOW_FILTER")) {
            (Ok(_), Ok(_)) => {
                anyhow::bail!("ALLOW_FILTER_PATH and ALLOW_FILTER cannot both be set")
            }
            (Ok(path), Err(_)) => {
                cfg.allow_filter = load_allow_filter(Path::new(&path))?;
            }
            (Err(_), Ok(inline)) => {
                cfg.allow_filter = parse_allow_filter(&inline)
                    .context("ALLOW_FILTER must be a JSON object or null")?;
            }
            (Err(_), Err(_)) => {}
        }

        if let Ok(alarms) = env::var("ALARMS") {
            cfg.alarms =
                parse_alarms(&alarms).with_context(|| format!("ALARMS is invalid: {alarms}"))?;
        }
        if let Ok(flag) = env::var("REFRESH_ON_STARTUP") {
            cfg.refresh_on_startup = parse_bool(&flag)
                .with_context(|| format!("REFRESH_ON_STARTUP is invalid: {flag}"))?;
        }
        if let Ok(interval) = env::var("REFRESH_INTERVAL_SECS") {
            cfg.refresh_interval_secs = interval
                .parse()
                .context("REFRESH_INTERVAL_SECS must be a non-negative integer")?;
        }
        if let Ok(interval) = env::var("CATALOG_REFRESH_INTERVAL_SECS") {
            cfg.catalog_refresh_interval_secs = interval
                .parse()
                .context("CATALOG_REFRESH_INTERVAL_SECS must be a non-negative integer")?;
        }
        if let Ok(concurrency) = env::var("COLLECTION_CONCURRENCY") {
            cfg.collection_concurrency = concurrency
                .parse()
                .context("COLLECTION_CONCURRENCY must be a positive integer")?;
        }
        if let Ok(window) = env::var("METRIC_WINDOW_MINUTES") {
            cfg.metric_window_minutes = window
                .parse()
                .context("METRIC_WINDOW_MINUTES must be a positive integer")?;
        }
        if let Ok(period) = env::var("METRIC_PERIOD_SECS") {
            cfg.metric_period_secs = period
                .parse()
                .context("METRIC_PERIOD_SECS must be a positive integer")?;
        }
        if let Ok(timeout) = env::var("REQUEST_TIMEOUT_SECS") {
            cfg.request_timeout_secs = timeout
                .parse()
                .context("REQUEST_TIMEOUT_SECS must be a positive integer")?;
        }
        if let Ok(level) = env::var("LOG_LEVEL") {
            cfg.log_level = level;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, url) in [
            ("QUOTA_CATALOG_URL", &self.catalog_url),
            ("METRICS_URL", &self.metrics_url),
            ("INVENTORY_URL", &self.inventory_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                anyhow::bail!("{name} must be an http(s) URL, got '{url}'");
            }
        }

        if self.collection_concurrency == 0 {
            anyhow::bail!("COLLECTION_CONCURRENCY must be greater than zero");
        }
        if self.metric_window_minutes == 0 {
            anyhow::bail!("METRIC_WINDOW_MINUTES must be greater than zero");
        }
        if self.metric_period_secs == 0 {
            anyhow::bail!("METRIC_PERIOD_SECS must be greater than zero");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("REQUEST_TIMEOUT_SECS must be greater than zero");
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// `None` when periodic usage refresh is disabled.
    pub fn refresh_interval(&self) -> Option<Duration> {
        (self.refresh_interval_secs > 0).then(|| Duration::from_secs(self.refresh_interval_secs))
    }

    pub fn catalog_refresh_interval(&self) -> Option<Duration> {
        (self.catalog_refresh_interval_secs > 0)
            .then(|| Duration::from_secs(self.catalog_refresh_interval_secs))
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

pub fn load_allow_filter(path: &Path) -> Result<AllowFilter> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("unable to read allow filter {}", path.display()))?;
    parse_allow_filter(&raw)
        .with_context(|| format!("allow filter {} is not valid JSON", path.display()))
}

fn parse_allow_filter(raw: &str) -> Result<AllowFilter> {
    Ok(serde_json::from_str(raw)?)
}

/// Parses `name:percent` pairs separated by commas.
pub fn parse_alarms(value: &str) -> Result<Vec<AlarmDefinition>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (name, threshold) = entry
                .rsplit_once(':')
                .with_context(|| format!("alarm '{entry}' must look like name:percent"))?;
            let name = name.trim();
            if name.is_empty() {
                anyhow::bail!("alarm '{entry}' has an empty name");
            }
            let threshold = threshold
                .trim()
                .parse()
                .with_context(|| format!("alarm '{entry}' has an invalid percentage"))?;
            Ok(AlarmDefinition::new(name, threshold))
        })
        .collect()
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => Ok(true),
        "false" | "0" | "no" | "n" => Ok(false),
        _ => anyhow::bail!("invalid boolean value {value}"),
    }
}
