use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use tracing::{info, warn};

use crate::error::{Result, TaskFlowError};
use crate::model::TaskRun;

pub const SIGNATURE_HEADER: &str = "x-taskflow-signature";
pub const TIMESTAMP_HEADER: &str = "x-taskflow-timestamp";

type HmacSha256 = Hmac<Sha256>;

/// Transport for webhook deliveries.
#[async_trait]
pub trait WebhookSender: Send + Sync {
    async fn post(&self, url: &str, body: String, headers: Vec<(String, String)>) -> Result<()>;
}

/// Hex HMAC-SHA256 over `"{timestamp}.{payload}"`.
pub fn sign_payload(api_key: &str, timestamp: i64, payload: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(api_key.as_bytes())
        .map_err(|e| TaskFlowError::Webhook(e.to_string()))?;
    mac.update(format!("{timestamp}.{payload}").as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Delivers terminal TaskRun payloads. Failures are logged, never retried.
#[derive(Clone)]
pub struct WebhookNotifier {
    sender: Arc<dyn WebhookSender>,
    api_key: Option<String>,
}

impl WebhookNotifier {
    pub fn new(sender: Arc<dyn WebhookSender>, api_key: Option<String>) -> Self {
        Self { sender, api_key }
    }

    pub async fn notify(&self, run: &TaskRun) {
        let Some(url) = run.webhook_callback_url.as_deref() else {
            return;
        };
        if let Err(error) = self.deliver(url, run).await {
            warn!(task_run_id = %run.id, url = %url, error = %error, "webhook delivery failed");
        }
    }

    async fn deliver(&self, url: &str, run: &TaskRun) -> Result<()> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| TaskFlowError::Webhook("no api key configured for signing".into()))?;
        let payload: Value = serde_json::to_value(run)?;
        let body = serde_json::to_string(&payload)?;
        let timestamp = Utc::now().timestamp();
        let signature = sign_payload(api_key, timestamp, &body)?;
        let headers = vec![
            ("content-type".to_string(), "application/json".to_string()),
            (TIMESTAMP_HEADER.to_string(), timestamp.to_string()),
            (SIGNATURE_HEADER.to_string(), signature),
        ];
        self.sender.post(url, body, headers).await?;
        info!(task_run_id = %run.id, status = %run.status, "webhook delivered");
        Ok(())
    }
}

#[cfg(feature = "webhook-http")]
pub struct HttpWebhookSender {
    client: reqwest::Client,
}

#[cfg(feature = "webhook-http")]
impl HttpWebhookSender {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[cfg(feature = "webhook-http")]
impl Default for HttpWebhookSender {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "webhook-http")]
#[async_trait]
impl WebhookSender for HttpWebhookSender {
    async fn post(&self, url: &str, body: String, headers: Vec<(String, String)>) -> Result<()> {
        let mut request = self.client.post(url).body(body);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        let response = request
            .send()
            .await
            .map_err(|e| TaskFlowError::Webhook(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(TaskFlowError::Webhook(format!(
                "webhook endpoint answered {status}"
            )));
        }
        Ok(())
    }
}
