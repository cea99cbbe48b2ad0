use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, TaskFlowError};

/// Block kinds the planner can ask for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    GotoUrl,
    Navigate,
    Extract,
    Loop,
}

impl TaskType {
    /// `None` for anything the planner does not support.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "goto_url" => Some(TaskType::GotoUrl),
            "navigate" => Some(TaskType::Navigate),
            "extract" => Some(TaskType::Extract),
            "loop" => Some(TaskType::Loop),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::GotoUrl => "goto_url",
            TaskType::Navigate => "navigate",
            TaskType::Extract => "extract",
            TaskType::Loop => "loop",
        }
    }
}

/// Answer to the per-iteration planning prompt.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PlannerDecision {
    #[serde(default)]
    pub user_goal_achieved: bool,
    #[serde(default)]
    pub observation: Option<String>,
    #[serde(default)]
    pub thoughts: Option<String>,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub task_type: Option<String>,
}

impl PlannerDecision {
    pub fn plan_text(&self) -> Option<&str> {
        self.plan.as_deref().map(str::trim).filter(|plan| !plan.is_empty())
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ExtractionTask {
    pub data_extraction_goal: String,
    #[serde(default)]
    pub schema: Option<Value>,
}

/// Loop body drafted by the model.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct InnerTaskDraft {
    #[serde(default)]
    pub thoughts: Option<String>,
    #[serde(default)]
    pub navigation_goal: Option<String>,
    #[serde(default)]
    pub data_extraction_goal: Option<String>,
    #[serde(default)]
    pub data_schema: Option<Value>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct CompletionVerdict {
    #[serde(default)]
    pub page_info: Option<String>,
    #[serde(default)]
    pub thoughts: Option<String>,
    #[serde(default)]
    pub user_goal_achieved: bool,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RunSummary {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub output: Option<Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RunMetadata {
    #[serde(default)]
    pub thoughts: Option<String>,
    pub url: String,
    #[serde(default)]
    pub workflow_title: Option<String>,
}

/// Output of the loop discovery block after strict validation.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct LoopDiscovery {
    pub loop_values: Vec<Value>,
    pub is_loop_value_link: bool,
}

/// Decodes a model answer into `T`, naming the prompt on failure.
pub fn decode<T: for<'de> Deserialize<'de>>(prompt_name: &str, content: Value) -> Result<T> {
    serde_json::from_value(content).map_err(|e| {
        TaskFlowError::Llm(format!("unexpected answer shape for `{prompt_name}`: {e}"))
    })
}
