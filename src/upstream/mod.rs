use crate::constants;
use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use std::env;
use std::time::Duration;
use tracing::{info, warn};

use crate::models::adjustment::AdjustmentError;

pub mod inventory_api;

pub use inventory_api::InventoryApi;

/// Pharmacy API configuration
#[derive(Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "configured"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl UpstreamConfig {
    /// Load upstream configuration from environment variables
    pub fn from_env() -> Self {
        let base_url = env::var("UPSTREAM_API_URL")
            .unwrap_or_else(|_| constants::DEFAULT_UPSTREAM_URL.to_string());
        let api_key = env::var("UPSTREAM_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
        let timeout_secs = env::var("UPSTREAM_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(constants::DEFAULT_UPSTREAM_TIMEOUT_SECS);

        if api_key.is_none() {
            warn!("⚠️  UPSTREAM_API_KEY not set - requests to the pharmacy API are unauthenticated");
        }

        Self {
            base_url: normalize_base_url(&base_url),
            api_key,
            timeout_secs,
        }
    }
}

/// Shared HTTP client for the pharmacy API
#[derive(Clone, Debug)]
pub struct UpstreamClient {
    http: Client,
    config: UpstreamConfig,
}

impl UpstreamClient {
    pub fn new(config: UpstreamConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client for pharmacy API")?;

        info!(
            "✅ Pharmacy API client initialized - URL: {}, timeout: {}s",
            config.base_url, config.timeout_secs
        );

        Ok(Self { http, config })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Request builder with the base URL and API key applied
    pub fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.config.base_url, path);
        let builder = self.http.request(method, url);
        match &self.config.api_key {
            Some(key) => builder.header(constants::UPSTREAM_API_KEY_HEADER, key),
            None => builder,
        }
    }

    /// Send a request and decode a JSON body; empty bodies become `null`
    pub async fn send_json(&self, builder: RequestBuilder) -> Result<Value, AdjustmentError> {
        let response = builder
            .send()
            .await
            .map_err(|e| AdjustmentError::Upstream(friendly_error(&self.config.base_url, &e)))?;

        let status = response.status();
        let body_text = response
            .text()
            .await
            .map_err(|e| AdjustmentError::Upstream(friendly_error(&self.config.base_url, &e)))?;

        if !status.is_success() {
            return Err(AdjustmentError::UpstreamStatus {
                status: status.as_u16(),
                message: error_detail(status, &body_text),
            });
        }

        if body_text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body_text)
            .map_err(|e| AdjustmentError::Upstream(format!("Invalid JSON from pharmacy API: {e}")))
    }
}

/// Strip trailing slashes and a trailing `/api`, and default the scheme
pub fn normalize_base_url(url: &str) -> String {
    let mut url = url.trim().to_string();

    if !url.starts_with("http://") && !url.starts_with("https://") {
        url = format!("http://{url}");
    }
    while url.ends_with('/') {
        url.pop();
    }
    if let Some(stripped) = url.strip_suffix("/api") {
        url = stripped.to_string();
    }
    while url.ends_with('/') {
        url.pop();
    }

    url
}

fn friendly_error(url: &str, err: &reqwest::Error) -> String {
    if err.is_connect() {
        return format!("Cannot reach pharmacy API at {url}");
    }
    if err.is_timeout() {
        return format!("Connection to {url} timed out");
    }
    if err.is_decode() {
        return format!("Unreadable response from {url}");
    }
    format!("Network error communicating with {url}: {err}")
}

fn status_error(status: StatusCode) -> String {
    match status.as_u16() {
        401 => "Pharmacy API key is invalid or expired".to_string(),
        403 => "Not authorized for the pharmacy API".to_string(),
        404 => "Pharmacy API endpoint not found".to_string(),
        s if s >= 500 => format!("Pharmacy API server error (HTTP {s})"),
        s => format!("Unexpected response from pharmacy API (HTTP {s})"),
    }
}

/// Prefer the upstream's own `error`/`message` field when it sent JSON
fn error_detail(status: StatusCode, body_text: &str) -> String {
    serde_json::from_str::<Value>(body_text)
        .ok()
        .and_then(|json| {
            json.get("error")
                .or_else(|| json.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| status_error(status))
}
