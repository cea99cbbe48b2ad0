use std::sync::Arc;

use tracing::info;

use crate::error::{Result, TaskFlowError};
use crate::llm::{prompts, DynLlmClient, LlmRequest, LlmTracking, PromptBuilder};
use crate::model::{
    new_id, RunStatus, TaskRequest, TaskRun, ThoughtDraft, ThoughtScenario, ThoughtType,
    WorkflowRun,
};
use crate::services::Persistence;
use crate::utils::ConfigValidator;

use super::channel::RunChannel;
use super::decision::{decode, RunMetadata};

/// Turns a request into a queued TaskRun and its queued WorkflowRun.
///
/// A missing url is asked of the reasoning model. Setup problems come back
/// as `TaskFlowError::Setup` and nothing is written.
pub async fn initialize_task_run<C: RunChannel>(
    request: TaskRequest,
    llm: &DynLlmClient,
    persistence: &Arc<dyn Persistence>,
    channel: &C,
) -> Result<TaskRun> {
    ConfigValidator::validate_prompt(&request.prompt)
        .map_err(|e| TaskFlowError::Setup(e.to_string()))?;

    let task_run_id = new_id("tsk");
    let mut metadata = None;
    let url = match request.url.as_deref().filter(|url| !url.trim().is_empty()) {
        Some(url) => url.trim().to_string(),
        None => {
            let response = llm
                .complete(LlmRequest::new(
                    PromptBuilder::metadata(&request.prompt),
                    LlmTracking {
                        prompt_name: prompts::GENERATE_METADATA.to_string(),
                        task_run_id: task_run_id.clone(),
                        thought_id: None,
                    },
                ))
                .await
                .map_err(|e| TaskFlowError::Setup(format!("could not resolve a starting url: {e}")))?;
            let decoded: RunMetadata = decode(prompts::GENERATE_METADATA, response.content.clone())
                .map_err(|e| TaskFlowError::Setup(e.to_string()))?;
            let url = decoded.url.trim().to_string();
            metadata = Some((decoded, response.content));
            url
        }
    };
    let url = ConfigValidator::validate_url(&url)
        .map_err(|e| TaskFlowError::Setup(e.to_string()))?
        .to_string();

    let workflow_id = new_id("wf");
    let mut workflow_run = WorkflowRun::new(
        new_id("wr"),
        &workflow_id,
        &request.organization_id,
        RunStatus::Queued,
    );
    workflow_run.proxy_location = request.proxy_location.clone();
    workflow_run.webhook_callback_url = request.webhook_callback_url.clone();

    let now = chrono::Utc::now();
    let task_run = TaskRun {
        id: task_run_id,
        organization_id: request.organization_id,
        prompt: request.prompt,
        url: Some(url),
        status: RunStatus::Queued,
        workflow_id,
        workflow_run_id: workflow_run.id.clone(),
        workflow_title: metadata
            .as_ref()
            .and_then(|(decoded, _)| decoded.workflow_title.clone()),
        totp: request.totp,
        proxy_location: request.proxy_location,
        webhook_callback_url: request.webhook_callback_url,
        extracted_information_schema: request.extracted_information_schema,
        max_steps_override: request.max_steps_override,
        summary: None,
        output: None,
        failure_reason: None,
        created_at: now,
        modified_at: now,
    };

    persistence.save_workflow_run(&workflow_run).await?;
    persistence.save_task_run(&task_run).await?;

    if let Some((decoded, content)) = metadata {
        let mut thought = channel
            .record_thought(
                &task_run.id,
                ThoughtDraft::new(ThoughtType::Metadata, ThoughtScenario::GenerateMetadata)
                    .with_user_input(task_run.prompt.clone())
                    .with_workflow_run(&task_run.workflow_run_id),
            )
            .await?;
        thought.thought = decoded.thoughts;
        thought.answer = task_run.url.clone();
        thought.output = Some(content);
        channel.update_thought(&thought).await?;
    }

    info!(
        task_run_id = %task_run.id,
        workflow_run_id = %task_run.workflow_run_id,
        url = ?task_run.url,
        "task run initialized"
    );
    Ok(task_run)
}
