use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::block::{
    handle_block_result, BlockRunner, DefinitionFragment, Outcome, RunFailure,
    WorkflowDefinitionBuilder,
};
use crate::config::PlannerConfig;
use crate::error::{Result, TaskFlowError};
use crate::llm::{prompts, DynLlmClient, LlmRequest, LlmTracking, PromptBuilder};
use crate::model::{RunStatus, TaskRun, Thought, ThoughtDraft, ThoughtScenario, ThoughtType};
use crate::services::{
    ArtifactStore, BlockExecutor, BrowserProvider, Observation, PageObserver, Persistence,
    WebhookNotifier,
};
use crate::state::RunContext;

use super::channel::{ObserverChannel, RunChannel, TaskV2Channel};
use super::decision::{decode, CompletionVerdict, PlannerDecision, TaskType};
use super::history::{TaskHistory, TaskHistoryRecord};
use super::lifecycle::RunLifecycle;
use super::summarizer::CompletionSummarizer;
use super::synthesizer::{BlockSynthesizer, SynthesisRequest};

/// Collaborators a planning loop talks to.
#[derive(Clone)]
pub struct PlannerServices {
    pub llm: DynLlmClient,
    pub observer: Arc<dyn PageObserver>,
    pub executor: Arc<dyn BlockExecutor>,
    pub persistence: Arc<dyn Persistence>,
    pub browsers: Arc<dyn BrowserProvider>,
    pub webhook: Option<WebhookNotifier>,
    pub artifacts: Option<Arc<dyn ArtifactStore>>,
}

/// Mutable per-run state threaded through the iterations.
struct LoopState {
    task_run: TaskRun,
    history: TaskHistory,
    definition: WorkflowDefinitionBuilder,
}

/// Observe, plan, build, execute, record; until the run is terminal.
pub struct PlanningLoop<C: RunChannel> {
    services: PlannerServices,
    config: PlannerConfig,
    channel: Arc<C>,
    runner: BlockRunner,
    synthesizer: BlockSynthesizer<C>,
    summarizer: CompletionSummarizer<C>,
    lifecycle: Arc<RunLifecycle<C>>,
}

impl PlanningLoop<TaskV2Channel> {
    pub fn task_v2(services: PlannerServices, config: PlannerConfig) -> Self {
        let channel = Arc::new(TaskV2Channel::new(Arc::clone(&services.persistence)));
        Self::new(services, config, channel)
    }
}

impl PlanningLoop<ObserverChannel> {
    pub fn observer(services: PlannerServices, config: PlannerConfig) -> Self {
        let channel = Arc::new(ObserverChannel::new(Arc::clone(&services.persistence)));
        Self::new(services, config, channel)
    }
}

impl<C: RunChannel> PlanningLoop<C> {
    pub fn new(services: PlannerServices, config: PlannerConfig, channel: Arc<C>) -> Self {
        let runner = BlockRunner::new(
            Arc::clone(&services.executor),
            Arc::clone(&services.persistence),
        );
        let lifecycle = Arc::new(RunLifecycle::new(
            Arc::clone(&channel),
            Arc::clone(&services.persistence),
            services.webhook.clone(),
        ));
        let synthesizer = BlockSynthesizer::new(
            Arc::clone(&services.llm),
            runner.clone(),
            Arc::clone(&channel),
        );
        let summarizer = CompletionSummarizer::new(
            Arc::clone(&services.llm),
            Arc::clone(&services.observer),
            Arc::clone(&channel),
            Arc::clone(&lifecycle),
        );
        Self {
            services,
            config,
            channel,
            runner,
            synthesizer,
            summarizer,
            lifecycle,
        }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Drives a queued TaskRun to a terminal status and returns it.
    ///
    /// Precondition violations are returned as `Setup` errors and leave the
    /// run untouched. Everything after the run starts ends in a terminal
    /// status instead of an error.
    #[instrument(skip(self), fields(flavor = self.channel.flavor()))]
    pub async fn run(&self, task_run_id: &str) -> Result<TaskRun> {
        let mut task_run = self
            .services
            .persistence
            .get_task_run(task_run_id)
            .await?
            .ok_or_else(|| TaskFlowError::NotFound {
                kind: "task run",
                id: task_run_id.to_string(),
            })?;
        self.check_preconditions(&task_run).await?;

        let workflow_run = self.lifecycle.start(&mut task_run).await?;
        let browser = match self.services.browsers.open(&workflow_run).await {
            Ok(browser) => browser,
            Err(error) => {
                error!(task_run_id = %task_run.id, error = %error, "failed to open browser");
                let failure = RunFailure::from_error(&error);
                self.finish_quietly(&mut task_run, failure.status, failure.reason)
                    .await;
                return Ok(task_run);
            }
        };

        let ctx = RunContext::new(
            &task_run.id,
            &task_run.organization_id,
            &workflow_run.id,
            browser,
            task_run.max_steps(self.config.max_steps),
        );
        let title = task_run
            .workflow_title
            .clone()
            .unwrap_or_else(|| task_run.prompt.chars().take(80).collect());
        let mut state = LoopState {
            definition: WorkflowDefinitionBuilder::new(&task_run.workflow_id, title),
            history: TaskHistory::default(),
            task_run,
        };

        match self.iterate(&mut state, &ctx).await {
            Ok(Outcome::Success(())) => {}
            Ok(Outcome::TerminalFailure(failure)) => {
                self.finish_quietly(&mut state.task_run, failure.status, failure.reason)
                    .await;
            }
            Ok(Outcome::Canceled) => {
                info!(task_run_id = %state.task_run.id, "run canceled");
                self.finish_quietly(&mut state.task_run, RunStatus::Canceled, "canceled".into())
                    .await;
            }
            Ok(Outcome::RetryableFailure(reason)) => {
                self.finish_quietly(&mut state.task_run, RunStatus::Failed, reason)
                    .await;
            }
            Err(TaskFlowError::Terminated(reason)) => {
                warn!(task_run_id = %state.task_run.id, reason = %reason, "run terminated");
                let failure = RunFailure::terminated(reason);
                self.finish_quietly(&mut state.task_run, failure.status, failure.reason)
                    .await;
            }
            Err(error) => {
                error!(task_run_id = %state.task_run.id, error = %error, "run failed with an operational error");
                let failure = RunFailure::from_error(&error);
                self.finish_quietly(&mut state.task_run, failure.status, failure.reason)
                    .await;
            }
        }

        self.cleanup(&ctx).await;
        Ok(state.task_run)
    }

    async fn check_preconditions(&self, task_run: &TaskRun) -> Result<()> {
        if task_run.status != RunStatus::Queued {
            return Err(TaskFlowError::Setup(format!(
                "task run `{}` is {}, expected queued",
                task_run.id, task_run.status
            )));
        }
        if task_run.prompt.trim().is_empty() {
            return Err(TaskFlowError::Setup(format!(
                "task run `{}` has no prompt",
                task_run.id
            )));
        }
        if task_run.url.as_deref().map_or(true, |url| url.trim().is_empty()) {
            return Err(TaskFlowError::Setup(format!(
                "task run `{}` has no url",
                task_run.id
            )));
        }
        let workflow_run = self.lifecycle.workflow_run(&task_run.workflow_run_id).await?;
        if workflow_run.status != RunStatus::Queued {
            return Err(TaskFlowError::Setup(format!(
                "workflow run `{}` is {}, expected queued",
                workflow_run.id, workflow_run.status
            )));
        }
        Ok(())
    }

    async fn iterate(&self, state: &mut LoopState, ctx: &RunContext) -> Result<Outcome<()>> {
        let max_iterations = self.config.max_iterations;
        let target_url = state.task_run.url.clone().unwrap_or_default();

        for iteration in 0..max_iterations {
            if let Some(stop) = self.check_executable(state, ctx).await? {
                return Ok(stop);
            }

            let current_url = ctx.browser().current_url().await?;
            debug!(
                task_run_id = %state.task_run.id,
                iteration,
                current_url = %current_url,
                "iteration started"
            );

            let mut decision_thought: Option<Thought> = None;
            let (task_type, plan) = if iteration == 0 && !same_page(&current_url, &target_url) {
                info!(
                    task_run_id = %state.task_run.id,
                    target_url = %target_url,
                    "browser is not on the target url, forcing goto_url"
                );
                (TaskType::GotoUrl, format!("Go to {target_url}"))
            } else {
                let observation = match self.observe(state, ctx, &current_url, iteration).await {
                    Ok(observation) => observation,
                    Err(error @ TaskFlowError::Terminated(_)) => return Err(error),
                    Err(error) => {
                        warn!(
                            task_run_id = %state.task_run.id,
                            iteration,
                            error = %error,
                            "observation failed, retrying next iteration"
                        );
                        continue;
                    }
                };

                let (decision, thought) = self.decide(state, &observation).await?;
                if decision.user_goal_achieved {
                    info!(task_run_id = %state.task_run.id, iteration, "user goal achieved");
                    self.summarizer
                        .summarize(&mut state.task_run, &state.history, ctx)
                        .await?;
                    return Ok(Outcome::Success(()));
                }
                let Some(plan) = decision.plan_text().map(str::to_string) else {
                    info!(task_run_id = %state.task_run.id, iteration, "empty plan, skipping iteration");
                    continue;
                };
                let raw_type = decision.task_type.clone().unwrap_or_default();
                let Some(task_type) =
                    TaskType::parse(&raw_type).filter(|task_type| *task_type != TaskType::GotoUrl)
                else {
                    return Ok(Outcome::TerminalFailure(RunFailure::failed(format!(
                        "unsupported task type `{raw_type}`"
                    ))));
                };
                decision_thought = Some(thought);
                (task_type, plan)
            };

            let mut executed = DefinitionFragment::default();
            let synthesis = self
                .synthesizer
                .synthesize(
                    SynthesisRequest {
                        task_run: &state.task_run,
                        task_type,
                        plan: &plan,
                        iteration,
                        current_url: &current_url,
                        is_first_block: state.definition.blocks().is_empty(),
                    },
                    ctx,
                    &mut executed,
                )
                .await;
            if !executed.is_empty() {
                state.definition.append(executed);
                if !matches!(synthesis, Ok(Outcome::Success(_))) {
                    // blocks already ran; the definition must still show them
                    if let Err(error) = self.save_definition(state).await {
                        warn!(task_run_id = %state.task_run.id, error = %error, "failed to save definition");
                    }
                }
            }
            let synthesized = match synthesis? {
                Outcome::Success(synthesized) => synthesized,
                Outcome::TerminalFailure(failure) => return Ok(Outcome::TerminalFailure(failure)),
                Outcome::Canceled => return Ok(Outcome::Canceled),
                Outcome::RetryableFailure(reason) => {
                    warn!(task_run_id = %state.task_run.id, iteration, reason = %reason, "block synthesis failed");
                    continue;
                }
            };

            if let Some(mut thought) = decision_thought {
                thought.block_label = Some(synthesized.block.label.clone());
                self.channel.update_thought(&thought).await?;
            }

            let result = self.runner.run(&synthesized.block, ctx).await?;
            let is_last_iteration = iteration + 1 == max_iterations;
            let handled = handle_block_result(&synthesized.block, &result, is_last_iteration);

            let mut record = TaskHistoryRecord::from_result(task_type, plan, &result);
            if let Some(values) = synthesized.loop_values {
                record = record.with_loop_values(values);
            }
            state.history.push(record);

            state.definition.append(synthesized.fragment);
            self.save_definition(state).await?;

            if let Outcome::Canceled = handled {
                return Ok(Outcome::Canceled);
            }

            let budget = ctx.steps();
            if handled.is_success() && (is_last_iteration || budget.is_exhausted()) {
                if self.check_completion(state, ctx).await? {
                    self.summarizer
                        .summarize(&mut state.task_run, &state.history, ctx)
                        .await?;
                    return Ok(Outcome::Success(()));
                }
            }

            if budget.is_exhausted() {
                return Ok(Outcome::TerminalFailure(RunFailure::failed(format!(
                    "reached the maximum of {} steps; increase max steps to let the task finish",
                    budget.max
                ))));
            }
        }

        Ok(Outcome::TerminalFailure(RunFailure::failed(format!(
            "max iterations reached ({max_iterations}) without achieving the goal"
        ))))
    }

    /// Re-reads the stored run; stops on external cancellation or timeout.
    async fn check_executable(
        &self,
        state: &mut LoopState,
        ctx: &RunContext,
    ) -> Result<Option<Outcome<()>>> {
        if let Some(stored) = self
            .services
            .persistence
            .get_task_run(&state.task_run.id)
            .await?
        {
            if stored.is_terminal() {
                let status = stored.status;
                state.task_run = stored;
                return Ok(Some(if status == RunStatus::Canceled {
                    Outcome::Canceled
                } else {
                    Outcome::TerminalFailure(RunFailure {
                        status,
                        reason: "run ended outside the planning loop".into(),
                    })
                }));
            }
        }

        if let Some(limit) = self.config.run_timeout {
            if ctx.started_at().elapsed() >= limit {
                return Ok(Some(Outcome::TerminalFailure(RunFailure::timed_out(format!(
                    "run exceeded its time limit of {}s",
                    limit.as_secs()
                )))));
            }
        }
        Ok(None)
    }

    async fn observe(
        &self,
        state: &LoopState,
        ctx: &RunContext,
        current_url: &str,
        iteration: u32,
    ) -> Result<Observation> {
        let browser = ctx.browser();
        let observation = self
            .services
            .observer
            .observe(browser.as_ref(), Some(current_url))
            .await?;

        if let Some(store) = &self.services.artifacts {
            for (index, shot) in observation.screenshots.iter().enumerate() {
                let store = Arc::clone(store);
                let key = format!(
                    "{}/iteration_{iteration}/screenshot_{index}.png",
                    state.task_run.id
                );
                let bytes = shot.clone();
                ctx.uploads().track(key.clone(), async move {
                    store.upload(&key, bytes).await
                });
            }
        }
        Ok(observation)
    }

    async fn decide(
        &self,
        state: &LoopState,
        observation: &Observation,
    ) -> Result<(PlannerDecision, Thought)> {
        let task_run = &state.task_run;
        let mut thought = self
            .channel
            .record_thought(
                &task_run.id,
                ThoughtDraft::new(ThoughtType::Plan, ThoughtScenario::GeneratePlan)
                    .with_user_input(task_run.prompt.clone())
                    .with_workflow_run(&task_run.workflow_run_id),
            )
            .await?;

        let prompt = PromptBuilder::plan(
            &task_run.prompt,
            &observation.current_url,
            &observation.element_tree_html,
            &state.history.to_value(),
        );
        let response = self
            .services
            .llm
            .complete(
                LlmRequest::new(prompt, tracking(prompts::TASK_V2, task_run, &thought.id))
                    .with_screenshots(observation.screenshots.clone()),
            )
            .await?;
        let decision: PlannerDecision = decode(prompts::TASK_V2, response.content.clone())?;

        thought.observation = decision.observation.clone();
        thought.thought = decision.thoughts.clone();
        thought.answer = decision.plan.clone();
        thought.task_type = decision.task_type.clone();
        thought.output = Some(response.content);
        self.channel.update_thought(&thought).await?;

        Ok((decision, thought))
    }

    /// Asks whether the goal is met given the full history.
    async fn check_completion(&self, state: &LoopState, ctx: &RunContext) -> Result<bool> {
        let task_run = &state.task_run;
        let browser = ctx.browser();
        let observation = match self.services.observer.observe(browser.as_ref(), None).await {
            Ok(observation) => observation,
            Err(error) => {
                warn!(task_run_id = %task_run.id, error = %error, "completion check observation failed");
                return Ok(false);
            }
        };

        let mut thought = self
            .channel
            .record_thought(
                &task_run.id,
                ThoughtDraft::new(ThoughtType::UserGoalCheck, ThoughtScenario::UserGoalCheck)
                    .with_user_input(task_run.prompt.clone())
                    .with_workflow_run(&task_run.workflow_run_id),
            )
            .await?;
        let prompt = PromptBuilder::check_completion(
            &task_run.prompt,
            &observation.current_url,
            &observation.element_tree_html,
            &state.history.to_value(),
        );
        let response = self
            .services
            .llm
            .complete(
                LlmRequest::new(prompt, tracking(prompts::CHECK_COMPLETION, task_run, &thought.id))
                    .with_screenshots(observation.screenshots),
            )
            .await?;
        let verdict: CompletionVerdict = decode(prompts::CHECK_COMPLETION, response.content.clone())?;

        thought.observation = verdict.page_info.clone();
        thought.thought = verdict.thoughts.clone();
        thought.output = Some(response.content);
        self.channel.update_thought(&thought).await?;

        info!(
            task_run_id = %task_run.id,
            achieved = verdict.user_goal_achieved,
            "completion check"
        );
        Ok(verdict.user_goal_achieved)
    }

    /// Persists the whole accreted definition after checking its chains.
    async fn save_definition(&self, state: &LoopState) -> Result<()> {
        state.definition.definition().validate()?;
        self.services
            .persistence
            .save_workflow_definition(&state.task_run.workflow_id, state.definition.definition())
            .await
    }

    async fn finish_quietly(&self, task_run: &mut TaskRun, status: RunStatus, reason: String) {
        if let Err(error) = self.lifecycle.finish(task_run, status, Some(reason)).await {
            error!(task_run_id = %task_run.id, error = %error, "failed to record terminal status");
        }
    }

    /// Runs on every path once the browser is open.
    async fn cleanup(&self, ctx: &RunContext) {
        let report = ctx.uploads().drain(self.config.upload_drain_timeout).await;
        if let Err(error) = ctx.browser().close().await {
            warn!(task_run_id = %ctx.task_run_id(), error = %error, "failed to close browser");
        }
        let steps = ctx.steps();
        ctx.reset();
        info!(
            task_run_id = %ctx.task_run_id(),
            uploads_completed = report.completed,
            uploads_abandoned = report.abandoned,
            steps_used = steps.used,
            "run cleaned up"
        );
    }
}

fn tracking(prompt_name: &str, task_run: &TaskRun, thought_id: &str) -> LlmTracking {
    LlmTracking {
        prompt_name: prompt_name.to_string(),
        task_run_id: task_run.id.clone(),
        thought_id: Some(thought_id.to_string()),
    }
}

/// Compares URLs ignoring a trailing slash and the fragment.
fn same_page(current: &str, target: &str) -> bool {
    match (Url::parse(current), Url::parse(target)) {
        (Ok(mut a), Ok(mut b)) => {
            a.set_fragment(None);
            b.set_fragment(None);
            a.as_str().trim_end_matches('/') == b.as_str().trim_end_matches('/')
        }
        _ => current.trim_end_matches('/') == target.trim_end_matches('/'),
    }
}

#[cfg(test)]
mod tests {
    use super::same_page;

    #[test]
    fn same_page_ignores_trailing_slash_and_fragment() {
        assert!(same_page("https://a.example.com/", "https://a.example.com"));
        assert!(same_page("https://a.example.com/x#top", "https://a.example.com/x"));
        assert!(!same_page("about:blank", "https://a.example.com"));
        assert!(!same_page("https://a.example.com/x", "https://a.example.com/y"));
    }
}
