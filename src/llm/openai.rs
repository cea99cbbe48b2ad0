use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};
use tracing::instrument;

use super::client::{parse_json_content, LlmClient};
use super::types::{LlmRequest, LlmResponse};
use crate::config::EnvConfig;
use crate::error::{Result, TaskFlowError};

/// OpenAI-compatible chat-completions client answering in JSON mode.
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    /// `api_key` may be literal, `${VAR}`, or empty to read `OPENAI_API_KEY`.
    pub fn new(api_key: &str, model: impl Into<String>) -> Result<Self> {
        Self::with_base_url("https://api.openai.com/v1", api_key, model)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        api_key: &str,
        model: impl Into<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| TaskFlowError::Config(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: EnvConfig::get_api_key(api_key, "OPENAI_API_KEY")?,
            model: model.into(),
        })
    }

    fn user_content(request: &LlmRequest) -> Value {
        let mut parts = vec![json!({"type": "text", "text": request.prompt})];
        for shot in &request.screenshots {
            let encoded = base64::engine::general_purpose::STANDARD.encode(shot);
            parts.push(json!({
                "type": "image_url",
                "image_url": {"url": format!("data:image/png;base64,{encoded}")}
            }));
        }
        Value::Array(parts)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    #[instrument(skip(self, request), fields(prompt = %request.tracking.prompt_name))]
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": Self::user_content(&request)}],
            "temperature": request.temperature,
            "response_format": {"type": "json_object"},
        });

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| TaskFlowError::Llm(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TaskFlowError::Llm(format!(
                "chat completion failed with status {status}"
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| TaskFlowError::Llm(e.to_string()))?;
        let content = payload["choices"]
            .get(0)
            .and_then(|choice| choice["message"]["content"].as_str())
            .ok_or_else(|| TaskFlowError::Llm("missing message content".into()))?;

        Ok(LlmResponse {
            content: parse_json_content(content)?,
            metadata: payload.get("usage").cloned(),
        })
    }
}
