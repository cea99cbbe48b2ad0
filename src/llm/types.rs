use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Correlates a model call with the run and thought it belongs to.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct LlmTracking {
    pub prompt_name: String,
    pub task_run_id: String,
    #[serde(default)]
    pub thought_id: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmRequest {
    pub prompt: String,
    #[serde(default, skip_serializing)]
    pub screenshots: Vec<Vec<u8>>,
    pub tracking: LlmTracking,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>, tracking: LlmTracking) -> Self {
        Self {
            prompt: prompt.into(),
            screenshots: Vec::new(),
            tracking,
            temperature: default_temperature(),
        }
    }

    pub fn with_screenshots(mut self, screenshots: Vec<Vec<u8>>) -> Self {
        self.screenshots = screenshots;
        self
    }

    pub fn prompt_name(&self) -> &str {
        &self.tracking.prompt_name
    }
}

fn default_temperature() -> f32 {
    0.0
}

/// Parsed JSON answer; keys are contract, formatting is the client's job.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: Value,
    #[serde(default)]
    pub metadata: Option<Value>,
}
