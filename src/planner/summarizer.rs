use std::sync::Arc;

use tracing::{info, warn};

use crate::error::Result;
use crate::llm::{prompts, DynLlmClient, LlmRequest, LlmTracking, PromptBuilder};
use crate::model::{RunStatus, TaskRun, ThoughtDraft, ThoughtScenario, ThoughtType};
use crate::services::PageObserver;
use crate::state::RunContext;

use super::channel::RunChannel;
use super::decision::{decode, RunSummary};
use super::history::TaskHistory;
use super::lifecycle::RunLifecycle;

/// Final goal confirmation: description and output, then `completed`.
pub struct CompletionSummarizer<C: RunChannel> {
    llm: DynLlmClient,
    observer: Arc<dyn PageObserver>,
    channel: Arc<C>,
    lifecycle: Arc<RunLifecycle<C>>,
}

impl<C: RunChannel> CompletionSummarizer<C> {
    pub fn new(
        llm: DynLlmClient,
        observer: Arc<dyn PageObserver>,
        channel: Arc<C>,
        lifecycle: Arc<RunLifecycle<C>>,
    ) -> Self {
        Self {
            llm,
            observer,
            channel,
            lifecycle,
        }
    }

    pub async fn summarize(
        &self,
        task_run: &mut TaskRun,
        history: &TaskHistory,
        ctx: &RunContext,
    ) -> Result<()> {
        let browser = ctx.browser();
        let (current_url, screenshots) = match self.observer.observe(browser.as_ref(), None).await {
            Ok(observation) => (observation.current_url, observation.screenshots),
            Err(error) => {
                warn!(task_run_id = %task_run.id, error = %error, "summary observation failed, continuing without screenshots");
                (browser.current_url().await.unwrap_or_default(), Vec::new())
            }
        };

        let mut thought = self
            .channel
            .record_thought(
                &task_run.id,
                ThoughtDraft::new(ThoughtType::InternalPlan, ThoughtScenario::Summarization)
                    .with_user_input(task_run.prompt.clone())
                    .with_workflow_run(&task_run.workflow_run_id),
            )
            .await?;

        let prompt = PromptBuilder::summary(
            &task_run.prompt,
            &current_url,
            &history.to_value(),
            task_run.extracted_information_schema.as_ref(),
        );
        let response = self
            .llm
            .complete(
                LlmRequest::new(
                    prompt,
                    LlmTracking {
                        prompt_name: prompts::SUMMARY.to_string(),
                        task_run_id: task_run.id.clone(),
                        thought_id: Some(thought.id.clone()),
                    },
                )
                .with_screenshots(screenshots),
            )
            .await?;
        let summary: RunSummary = decode(prompts::SUMMARY, response.content.clone())?;

        thought.thought = summary.description.clone();
        thought.output = Some(response.content);
        self.channel.update_thought(&thought).await?;

        task_run.summary = summary.description;
        task_run.output = summary.output;
        self.lifecycle
            .finish(task_run, RunStatus::Completed, None)
            .await?;

        info!(
            task_run_id = %task_run.id,
            duration_secs = ctx.started_at().elapsed().as_secs_f64(),
            iterations = history.len(),
            "run summarized"
        );
        Ok(())
    }
}
