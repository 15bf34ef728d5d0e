//! HTTP client for the SMM panel that fulfils view orders.
//!
//! The panel speaks a form-encoded `POST` protocol: every request carries the
//! API key and an `action`, and answers with a small JSON object holding either
//! the requested field or an `error` message.

use crate::config::{ApiConfig, RetryPolicy};
use crate::domain::order::{ExternalOrderStatus, Order};
use crate::domain::ports::OrderApi;
use crate::error::{Result, ShopError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::future::Future;
use tracing::{debug, error, info, warn};

pub const TIMEOUT_MESSAGE: &str = "API request timed out. Please try again later.";
pub const CONNECTION_MESSAGE: &str = "Connection error. Please check your network and try again.";

/// [`OrderApi`] over the panel's HTTP endpoint, with bounded retries.
#[derive(Clone)]
pub struct SmmApiClient {
    client: Client,
    config: ApiConfig,
}

impl SmmApiClient {
    pub fn new(config: ApiConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.retry.request_timeout)
            .build()
            .map_err(|e| ShopError::Config(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    fn add_form(&self, order: &Order) -> Vec<(&'static str, String)> {
        let mut form = vec![
            ("key", self.config.api_key.clone()),
            ("action", "add".to_string()),
            ("service", self.config.service_id.to_string()),
            ("link", order.target_link.clone()),
            ("quantity", order.quantity.to_string()),
        ];
        if let Some((runs, interval)) = order.delivery.drip_feed() {
            form.push(("runs", runs.to_string()));
            form.push(("interval", interval.to_string()));
        }
        form
    }

    /// One POST; returns the decoded body or the message to report.
    async fn post(&self, form: &[(&'static str, String)], failure: &str) -> std::result::Result<Value, String> {
        let response = self
            .client
            .post(&self.config.base_url)
            .form(form)
            .send()
            .await
            .map_err(describe_transport_error)?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), body = %body, "non-200 response from API");
            return Err(format!("{} with status code: {}", failure, status.as_u16()));
        }
        response.json::<Value>().await.map_err(describe_transport_error)
    }

    async fn submit_once(&self, form: &[(&'static str, String)]) -> std::result::Result<String, String> {
        let body = self.post(form, "API request failed").await?;
        if let Some(id) = body.get("order").and_then(scalar_text) {
            return Ok(id);
        }
        Err(api_error(&body))
    }

    async fn status_once(&self, external_id: &str) -> std::result::Result<ExternalOrderStatus, String> {
        let form = [
            ("key", self.config.api_key.clone()),
            ("action", "status".to_string()),
            ("order", external_id.to_string()),
        ];
        let body = self.post(&form, "Status check failed").await?;
        let Some(status) = body.get("status").and_then(scalar_text) else {
            return Err(api_error(&body));
        };
        Ok(ExternalOrderStatus {
            status,
            charge: body.get("charge").and_then(scalar_text),
            start_count: body.get("start_count").and_then(scalar_text),
            remains: body.get("remains").and_then(scalar_text),
        })
    }
}

#[async_trait]
impl OrderApi for SmmApiClient {
    async fn submit(&self, order: &Order) -> Result<String> {
        let form = self.add_form(order);
        info!(
            order_id = %order.id,
            link = %order.target_link,
            quantity = order.quantity,
            drip_feed = order.delivery.drip_feed().is_some(),
            "submitting order to API"
        );
        with_retry(&self.config.retry, "submit", |_| self.submit_once(&form)).await
    }

    async fn check_status(&self, external_id: &str) -> Result<ExternalOrderStatus> {
        info!(external_order_id = external_id, "checking order status");
        with_retry(&self.config.retry, "status", |_| self.status_once(external_id)).await
    }
}

/// Runs `attempt` up to `policy.max_attempts` times, sleeping `policy.delay`
/// between failures. The last error message is returned verbatim.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, op: &str, mut attempt: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = std::result::Result<T, String>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_error = String::new();
    for n in 1..=attempts {
        match attempt(n).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if n < attempts {
                    warn!(op, attempt = n, error = %e, delay_ms = policy.delay.as_millis() as u64, "API attempt failed, retrying");
                    tokio::time::sleep(policy.delay).await;
                } else {
                    error!(op, attempt = n, error = %e, "API attempts exhausted");
                }
                last_error = e;
            }
        }
    }
    Err(ShopError::ExternalApi(last_error))
}

fn describe_transport_error(e: reqwest::Error) -> String {
    if e.is_timeout() {
        TIMEOUT_MESSAGE.to_string()
    } else if e.is_connect() {
        CONNECTION_MESSAGE.to_string()
    } else {
        e.to_string()
    }
}

fn api_error(body: &Value) -> String {
    match body.get("error") {
        Some(error) => scalar_text(error).unwrap_or_else(|| error.to_string()),
        None => format!("Unexpected API response format: {}", body),
    }
}

/// Ids and counters come back as either JSON numbers or strings.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
