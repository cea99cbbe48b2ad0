use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, TaskFlowError};

use super::status::RunStatus;

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct TotpConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
}

impl TotpConfig {
    pub fn is_empty(&self) -> bool {
        self.verification_url.is_none() && self.identifier.is_none()
    }
}

/// Caller-supplied request that becomes a queued TaskRun.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TaskRequest {
    pub organization_id: String,
    pub prompt: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub totp: TotpConfig,
    #[serde(default)]
    pub proxy_location: Option<String>,
    #[serde(default)]
    pub webhook_callback_url: Option<String>,
    #[serde(default)]
    pub extracted_information_schema: Option<Value>,
    #[serde(default)]
    pub max_steps_override: Option<u32>,
}

/// One autonomous-goal execution.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TaskRun {
    pub id: String,
    pub organization_id: String,
    pub prompt: String,
    pub url: Option<String>,
    pub status: RunStatus,
    pub workflow_id: String,
    pub workflow_run_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_title: Option<String>,
    #[serde(default, skip_serializing_if = "TotpConfig::is_empty")]
    pub totp: TotpConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_callback_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_information_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_steps_override: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl TaskRun {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Moves the run forward. Terminal runs reject every further write.
    pub fn transition(&mut self, next: RunStatus) -> Result<()> {
        if self.status == next && !next.is_terminal() {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err(TaskFlowError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.modified_at = Utc::now();
        Ok(())
    }

    pub fn fail_with(&mut self, next: RunStatus, reason: impl Into<String>) -> Result<()> {
        self.transition(next)?;
        self.failure_reason = Some(reason.into());
        Ok(())
    }

    /// Effective step budget for this run.
    pub fn max_steps(&self, default: u32) -> u32 {
        self.max_steps_override.unwrap_or(default)
    }
}
