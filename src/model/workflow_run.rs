use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TaskFlowError};

use super::status::RunStatus;

/// Executing instantiation of a (possibly still growing) workflow definition.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WorkflowRun {
    pub id: String,
    pub workflow_id: String,
    pub organization_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_workflow_run_id: Option<String>,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_callback_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl WorkflowRun {
    pub fn new(
        id: impl Into<String>,
        workflow_id: impl Into<String>,
        organization_id: impl Into<String>,
        status: RunStatus,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            workflow_id: workflow_id.into(),
            organization_id: organization_id.into(),
            parent_workflow_run_id: None,
            status,
            failure_reason: None,
            proxy_location: None,
            webhook_callback_url: None,
            created_at: now,
            modified_at: now,
        }
    }

    /// Child run used for one loop-body invocation.
    pub fn child_of(parent: &WorkflowRun) -> Self {
        let mut child = Self::new(
            super::new_id("wr"),
            parent.workflow_id.clone(),
            parent.organization_id.clone(),
            RunStatus::Running,
        );
        child.parent_workflow_run_id = Some(parent.id.clone());
        child.proxy_location = parent.proxy_location.clone();
        child
    }

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
}
