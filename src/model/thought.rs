use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ThoughtType {
    Plan,
    Metadata,
    UserGoalCheck,
    InternalPlan,
    Failure,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ThoughtScenario {
    GeneratePlan,
    GenerateMetadata,
    ExtractLoopValues,
    GenerateTaskInLoop,
    GenerateGeneralTask,
    UserGoalCheck,
    Summarization,
}

/// Which planning-loop flavor produced a thought.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "flavor", content = "id", rename_all = "snake_case")]
pub enum ThoughtOwner {
    TaskV2(String),
    ObserverCruise(String),
}

impl ThoughtOwner {
    pub fn run_id(&self) -> &str {
        match self {
            ThoughtOwner::TaskV2(id) | ThoughtOwner::ObserverCruise(id) => id,
        }
    }
}

/// Fields known before the reasoning model answers.
#[derive(Clone, Debug)]
pub struct ThoughtDraft {
    pub thought_type: ThoughtType,
    pub scenario: ThoughtScenario,
    pub user_input: Option<String>,
    pub workflow_run_id: Option<String>,
}

impl ThoughtDraft {
    pub fn new(thought_type: ThoughtType, scenario: ThoughtScenario) -> Self {
        Self {
            thought_type,
            scenario,
            user_input: None,
            workflow_run_id: None,
        }
    }

    pub fn with_user_input(mut self, input: impl Into<String>) -> Self {
        self.user_input = Some(input.into());
        self
    }

    pub fn with_workflow_run(mut self, workflow_run_id: impl Into<String>) -> Self {
        self.workflow_run_id = Some(workflow_run_id.into());
        self
    }
}

/// Audit record of one planning step.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Thought {
    pub id: String,
    pub owner: ThoughtOwner,
    pub thought_type: ThoughtType,
    pub scenario: ThoughtScenario,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_label: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Thought {
    pub fn from_draft(owner: ThoughtOwner, draft: ThoughtDraft) -> Self {
        Self {
            id: super::new_id("th"),
            owner,
            thought_type: draft.thought_type,
            scenario: draft.scenario,
            user_input: draft.user_input,
            observation: None,
            thought: None,
            answer: None,
            task_type: None,
            output: None,
            workflow_run_id: draft.workflow_run_id,
            block_label: None,
            created_at: Utc::now(),
        }
    }
}
