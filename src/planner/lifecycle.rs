use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{Result, TaskFlowError};
use crate::model::{RunStatus, TaskRun, WorkflowRun};
use crate::services::{Persistence, WebhookNotifier};

use super::channel::RunChannel;

/// Status writes for a TaskRun and its top-level WorkflowRun.
pub struct RunLifecycle<C: RunChannel> {
    channel: Arc<C>,
    persistence: Arc<dyn Persistence>,
    webhook: Option<WebhookNotifier>,
}

impl<C: RunChannel> RunLifecycle<C> {
    pub fn new(
        channel: Arc<C>,
        persistence: Arc<dyn Persistence>,
        webhook: Option<WebhookNotifier>,
    ) -> Self {
        Self {
            channel,
            persistence,
            webhook,
        }
    }

    pub async fn workflow_run(&self, id: &str) -> Result<WorkflowRun> {
        self.persistence
            .get_workflow_run(id)
            .await?
            .ok_or_else(|| TaskFlowError::NotFound {
                kind: "workflow run",
                id: id.to_string(),
            })
    }

    /// Moves both runs from queued to running.
    pub async fn start(&self, task_run: &mut TaskRun) -> Result<WorkflowRun> {
        let mut workflow_run = self.workflow_run(&task_run.workflow_run_id).await?;
        workflow_run.transition(RunStatus::Running)?;
        self.persistence.save_workflow_run(&workflow_run).await?;
        task_run.transition(RunStatus::Running)?;
        self.channel.write_status(task_run).await?;
        info!(
            task_run_id = %task_run.id,
            workflow_run_id = %workflow_run.id,
            flavor = self.channel.flavor(),
            "run started"
        );
        Ok(workflow_run)
    }

    /// Writes a terminal status once. A TaskRun that is already terminal is
    /// left alone; its WorkflowRun is brought in line with it.
    pub async fn finish(
        &self,
        task_run: &mut TaskRun,
        status: RunStatus,
        reason: Option<String>,
    ) -> Result<()> {
        let wrote_task_run = if task_run.is_terminal() {
            false
        } else {
            task_run.transition(status)?;
            if reason.is_some() {
                task_run.failure_reason = reason.clone();
            }
            self.channel.write_status(task_run).await?;
            true
        };

        let mut workflow_run = self.workflow_run(&task_run.workflow_run_id).await?;
        if !workflow_run.status.is_terminal() {
            workflow_run.transition(task_run.status)?;
            workflow_run.failure_reason = task_run.failure_reason.clone();
            self.persistence.save_workflow_run(&workflow_run).await?;
        }

        if wrote_task_run {
            match task_run.status {
                RunStatus::Completed => info!(task_run_id = %task_run.id, "run completed"),
                status => warn!(
                    task_run_id = %task_run.id,
                    status = %status,
                    reason = ?task_run.failure_reason,
                    "run ended"
                ),
            }
            if let Some(webhook) = &self.webhook {
                webhook.notify(task_run).await;
            }
        }
        Ok(())
    }
}
