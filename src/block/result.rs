use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, TaskFlowError};
use crate::model::RunStatus;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BlockStatus {
    Created,
    Running,
    Completed,
    Failed,
    Terminated,
    Canceled,
}

impl BlockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockStatus::Created => "created",
            BlockStatus::Running => "running",
            BlockStatus::Completed => "completed",
            BlockStatus::Failed => "failed",
            BlockStatus::Terminated => "terminated",
            BlockStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, BlockStatus::Created | BlockStatus::Running)
    }

    /// `created → running → {completed | failed | terminated | canceled}`;
    /// a block may also fail or be canceled before it starts running.
    pub fn advance(&mut self, next: BlockStatus) -> Result<()> {
        let allowed = match (*self, next) {
            (BlockStatus::Created, BlockStatus::Running) => true,
            (BlockStatus::Created, BlockStatus::Failed | BlockStatus::Canceled) => true,
            (BlockStatus::Running, next) => next.is_terminal(),
            _ => false,
        };
        if !allowed {
            return Err(TaskFlowError::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            });
        }
        *self = next;
        Ok(())
    }

    /// Status a loop-body WorkflowRun ends with.
    pub fn as_run_status(&self) -> RunStatus {
        match self {
            BlockStatus::Completed => RunStatus::Completed,
            BlockStatus::Terminated => RunStatus::Terminated,
            BlockStatus::Canceled => RunStatus::Canceled,
            BlockStatus::Created | BlockStatus::Running | BlockStatus::Failed => RunStatus::Failed,
        }
    }
}

impl fmt::Display for BlockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of executing one block.
///
/// `output` is scalar/object for leaf blocks and a list of per-iteration
/// lists for a for-loop.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BlockResult {
    pub label: String,
    pub status: BlockStatus,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Browser-interaction steps spent.
    #[serde(default)]
    pub steps: u32,
}

impl BlockResult {
    fn new(label: impl Into<String>, status: BlockStatus, steps: u32) -> Self {
        Self {
            label: label.into(),
            success: status == BlockStatus::Completed,
            status,
            failure_reason: None,
            output: None,
            steps,
        }
    }

    pub fn completed(label: impl Into<String>, output: Option<Value>, steps: u32) -> Self {
        let mut result = Self::new(label, BlockStatus::Completed, steps);
        result.output = output;
        result
    }

    pub fn failed(label: impl Into<String>, reason: impl Into<String>, steps: u32) -> Self {
        let mut result = Self::new(label, BlockStatus::Failed, steps);
        result.failure_reason = Some(reason.into());
        result
    }

    pub fn terminated(label: impl Into<String>, reason: impl Into<String>, steps: u32) -> Self {
        let mut result = Self::new(label, BlockStatus::Terminated, steps);
        result.failure_reason = Some(reason.into());
        result
    }

    pub fn canceled(label: impl Into<String>, steps: u32) -> Self {
        Self::new(label, BlockStatus::Canceled, steps)
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }
}
