use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::block::{
    Block, BlockRunner, BlockStatus, BlockUrl, DefinitionFragment, Outcome, RunFailure,
};
use crate::error::Result;
use crate::llm::{prompts, DynLlmClient, LlmRequest, LlmTracking, PromptBuilder};
use crate::model::{TaskRun, ThoughtDraft, ThoughtScenario, ThoughtType};
use crate::schema::{self, Schema};
use crate::state::{Parameter, RunContext};

use super::channel::RunChannel;
use super::decision::{decode, ExtractionTask, InnerTaskDraft, LoopDiscovery, TaskType};

/// What the planner asked for, plus the page it was looking at.
pub struct SynthesisRequest<'a> {
    pub task_run: &'a TaskRun,
    pub task_type: TaskType,
    pub plan: &'a str,
    /// Suffix for block labels and parameter keys.
    pub iteration: u32,
    pub current_url: &'a str,
    /// No block has been produced for this run yet.
    pub is_first_block: bool,
}

/// A block ready to execute, with the definition pieces it contributes.
#[derive(Debug)]
pub struct Synthesized {
    pub block: Block,
    pub fragment: DefinitionFragment,
    /// Values found by loop discovery.
    pub loop_values: Option<Vec<Value>>,
}

/// Builds concrete blocks from planner decisions.
pub struct BlockSynthesizer<C: RunChannel> {
    llm: DynLlmClient,
    runner: BlockRunner,
    channel: Arc<C>,
}

impl<C: RunChannel> BlockSynthesizer<C> {
    pub fn new(llm: DynLlmClient, runner: BlockRunner, channel: Arc<C>) -> Self {
        Self {
            llm,
            runner,
            channel,
        }
    }

    /// Builds the block for `request`. Blocks that already had to run while
    /// synthesizing (loop discovery) go to `executed`, whatever the outcome.
    pub async fn synthesize(
        &self,
        request: SynthesisRequest<'_>,
        ctx: &RunContext,
        executed: &mut DefinitionFragment,
    ) -> Result<Outcome<Synthesized>> {
        info!(
            task_run_id = %request.task_run.id,
            iteration = request.iteration,
            task_type = request.task_type.as_str(),
            "synthesizing block"
        );
        match request.task_type {
            TaskType::GotoUrl => {
                let url = request.task_run.url.clone().unwrap_or_default();
                self.goto_url(request.iteration, &url, ctx).map(Outcome::Success)
            }
            TaskType::Navigate => self.navigate(&request, ctx).map(Outcome::Success),
            TaskType::Extract => self.extract(&request, ctx).await.map(Outcome::Success),
            TaskType::Loop => self.loop_block(&request, ctx, executed).await,
        }
    }

    pub fn goto_url(&self, iteration: u32, url: &str, ctx: &RunContext) -> Result<Synthesized> {
        let block = Block::goto_url(format!("goto_url_{iteration}"), url);
        single(block, ctx)
    }

    fn navigate(&self, request: &SynthesisRequest<'_>, ctx: &RunContext) -> Result<Synthesized> {
        let goal = format!(
            "{}\n\nThis step is part of the user's overall goal: {}",
            request.plan, request.task_run.prompt
        );
        let block = Block::navigation(
            format!("navigate_{}", request.iteration),
            None,
            goal,
            request.task_run.totp.clone(),
        );
        single(block, ctx)
    }

    async fn extract(
        &self,
        request: &SynthesisRequest<'_>,
        ctx: &RunContext,
    ) -> Result<Synthesized> {
        let mut thought = self
            .channel
            .record_thought(
                &request.task_run.id,
                ThoughtDraft::new(ThoughtType::InternalPlan, ThoughtScenario::GenerateGeneralTask)
                    .with_user_input(request.plan)
                    .with_workflow_run(&request.task_run.workflow_run_id),
            )
            .await?;

        let prompt = PromptBuilder::extraction_task(
            &request.task_run.prompt,
            request.plan,
            request.current_url,
        );
        let response = self
            .llm
            .complete(LlmRequest::new(
                prompt,
                tracking(prompts::GENERATE_EXTRACTION_TASK, request.task_run, &thought.id),
            ))
            .await?;
        let task: ExtractionTask =
            decode(prompts::GENERATE_EXTRACTION_TASK, response.content.clone())?;

        thought.output = Some(response.content);
        thought.answer = Some(task.data_extraction_goal.clone());
        thought.task_type = Some(TaskType::Extract.as_str().to_string());
        self.channel.update_thought(&thought).await?;

        let url = request
            .is_first_block
            .then(|| BlockUrl::Fixed(request.current_url.to_string()));
        let block = Block::extraction(
            format!("extract_{}", request.iteration),
            url,
            task.data_extraction_goal,
            task.schema,
        );
        single(block, ctx)
    }

    async fn loop_block(
        &self,
        request: &SynthesisRequest<'_>,
        ctx: &RunContext,
        executed: &mut DefinitionFragment,
    ) -> Result<Outcome<Synthesized>> {
        let i = request.iteration;
        let task_run = request.task_run;

        // Discovery: extract the values to iterate over, right now.
        let discovery_block = Block::extraction(
            format!("extract_loop_values_{i}"),
            request
                .is_first_block
                .then(|| BlockUrl::Fixed(request.current_url.to_string())),
            PromptBuilder::loop_values_goal(&task_run.prompt, request.plan),
            Some(loop_values_json_schema()),
        );
        let discovery_output = discovery_block.output_parameter();
        ctx.register_parameter(discovery_output.clone())?;

        executed.extend(DefinitionFragment {
            parameters: vec![discovery_output.clone()],
            blocks: vec![discovery_block.clone()],
        });
        let result = self.runner.run(&discovery_block, ctx).await?;
        if result.status != BlockStatus::Completed {
            let reason = format!(
                "failed to extract loop values: {}",
                result
                    .failure_reason
                    .unwrap_or_else(|| format!("discovery block {}", result.status))
            );
            warn!(task_run_id = %task_run.id, reason = %reason, "loop discovery failed");
            return Ok(Outcome::TerminalFailure(RunFailure::failed(reason)));
        }

        let raw = discovery_payload(result.output);
        let discovery = match validate_discovery(&raw) {
            Ok(discovery) => discovery,
            Err(reason) => {
                warn!(task_run_id = %task_run.id, reason = %reason, "invalid loop discovery output");
                return Ok(Outcome::TerminalFailure(RunFailure::failed(format!(
                    "invalid loop values: {reason}"
                ))));
            }
        };
        ctx.set_parameter_value(&discovery_output.key, raw.clone())?;

        let mut discovery_thought = self
            .channel
            .record_thought(
                &task_run.id,
                ThoughtDraft::new(ThoughtType::InternalPlan, ThoughtScenario::ExtractLoopValues)
                    .with_user_input(request.plan)
                    .with_workflow_run(&task_run.workflow_run_id),
            )
            .await?;
        discovery_thought.output = Some(raw);
        discovery_thought.block_label = Some(discovery_block.label.clone());
        self.channel.update_thought(&discovery_thought).await?;

        // Wiring: discovery output -> loop source -> per-iteration value.
        let loop_values_key = format!("loop_values_{i}");
        let loop_value_key = format!("loop_value_{i}");
        let loop_source = Parameter::context(&loop_values_key, &discovery_output.key)
            .with_field("loop_values")
            .with_description("Values the loop iterates over");
        let loop_value = Parameter::context(&loop_value_key, &loop_values_key)
            .with_description(if discovery.is_loop_value_link {
                "Link visited by one loop iteration"
            } else {
                "Item handled by one loop iteration"
            });
        ctx.register_parameter(loop_source.clone())?;
        ctx.register_parameter(loop_value.clone())?;

        // Inner task, drafted by the model around the per-iteration value.
        let mut inner_thought = self
            .channel
            .record_thought(
                &task_run.id,
                ThoughtDraft::new(ThoughtType::InternalPlan, ThoughtScenario::GenerateTaskInLoop)
                    .with_user_input(request.plan)
                    .with_workflow_run(&task_run.workflow_run_id),
            )
            .await?;
        let prompt = PromptBuilder::task_block(
            &task_run.prompt,
            request.plan,
            request.current_url,
            &loop_value_key,
            discovery.is_loop_value_link,
        );
        let response = self
            .llm
            .complete(LlmRequest::new(
                prompt,
                tracking(prompts::GENERATE_TASK_BLOCK, task_run, &inner_thought.id),
            ))
            .await?;
        let draft: InnerTaskDraft = decode(prompts::GENERATE_TASK_BLOCK, response.content.clone())?;
        inner_thought.thought = draft.thoughts.clone();
        inner_thought.output = Some(response.content);
        self.channel.update_thought(&inner_thought).await?;

        let inner_url = if discovery.is_loop_value_link {
            BlockUrl::Parameter(loop_value_key.clone())
        } else {
            BlockUrl::Fixed(request.current_url.to_string())
        };
        let inner = Block::task(
            format!("task_in_loop_{i}"),
            Some(inner_url),
            draft.navigation_goal,
            draft.data_extraction_goal,
            draft.data_schema,
            task_run.totp.clone(),
        )
        .with_parameters(vec![loop_value_key])
        .with_continue_on_failure(true);
        let inner_output = inner.output_parameter();

        let loop_block = Block::for_loop(format!("loop_{i}"), &loop_values_key, inner);
        let loop_output = loop_block.output_parameter();
        ctx.register_parameter(inner_output.clone())?;
        ctx.register_parameter(loop_output.clone())?;

        info!(
            task_run_id = %task_run.id,
            block_label = %loop_block.label,
            values = discovery.loop_values.len(),
            is_link = discovery.is_loop_value_link,
            "loop block synthesized"
        );

        Ok(Outcome::Success(Synthesized {
            fragment: DefinitionFragment {
                parameters: vec![loop_source, loop_value, inner_output, loop_output],
                blocks: vec![loop_block.clone()],
            },
            block: loop_block,
            loop_values: Some(discovery.loop_values),
        }))
    }
}

fn single(block: Block, ctx: &RunContext) -> Result<Synthesized> {
    let output = block.output_parameter();
    ctx.register_parameter(output.clone())?;
    Ok(Synthesized {
        fragment: DefinitionFragment {
            parameters: vec![output],
            blocks: vec![block.clone()],
        },
        block,
        loop_values: None,
    })
}

fn tracking(prompt_name: &str, task_run: &TaskRun, thought_id: &str) -> LlmTracking {
    LlmTracking {
        prompt_name: prompt_name.to_string(),
        task_run_id: task_run.id.clone(),
        thought_id: Some(thought_id.to_string()),
    }
}

fn discovery_schema() -> Schema {
    Schema::strict_object([
        ("loop_values", Schema::array(Schema::any())),
        ("is_loop_value_link", Schema::boolean()),
    ])
}

/// Schema handed to the extraction executor for the discovery block.
fn loop_values_json_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "loop_values": {
                "type": "array",
                "description": "Values to iterate over, one per loop iteration",
                "items": {}
            },
            "is_loop_value_link": {
                "type": "boolean",
                "description": "True when every loop value is a link to visit"
            }
        },
        "required": ["loop_values", "is_loop_value_link"],
        "additionalProperties": false
    })
}

/// Executors may wrap extracted data in `extracted_information`.
fn discovery_payload(output: Option<Value>) -> Value {
    match output {
        Some(Value::Object(mut map)) if map.contains_key("extracted_information") => map
            .remove("extracted_information")
            .unwrap_or(Value::Null),
        Some(value) => value,
        None => Value::Null,
    }
}

/// Both fields present and well typed; no defaulting.
pub fn validate_discovery(raw: &Value) -> std::result::Result<LoopDiscovery, String> {
    schema::validate(&discovery_schema(), raw).map_err(|e| e.to_string())?;
    serde_json::from_value(raw.clone()).map_err(|e| e.to_string())
}
