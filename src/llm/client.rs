use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::types::{LlmRequest, LlmResponse};
use crate::error::{Result, TaskFlowError};

/// Reasoning-model collaborator. Retry, backoff and provider rate limits
/// live behind this trait, not in the planner.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse>;
}

pub type DynLlmClient = Arc<dyn LlmClient>;

/// Pulls the JSON object out of a chat answer, tolerating code fences and
/// surrounding prose.
pub fn parse_json_content(text: &str) -> Result<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }
    let start = trimmed.find('{');
    let end = trimmed.rfind('}');
    match (start, end) {
        (Some(start), Some(end)) if start < end => serde_json::from_str(&trimmed[start..=end])
            .map_err(|e| TaskFlowError::Llm(format!("answer is not valid JSON: {e}"))),
        _ => Err(TaskFlowError::Llm(format!(
            "answer contains no JSON object: {}",
            trimmed.chars().take(120).collect::<String>()
        ))),
    }
}
