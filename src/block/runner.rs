use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Result, TaskFlowError};
use crate::model::WorkflowRun;
use crate::services::{BlockExecutor, BlockInvocation, Persistence};
use crate::state::RunContext;

use super::model::{Block, BlockKind, BlockUrl};
use super::outcome::RunFailure;
use super::result::{BlockResult, BlockStatus};

/// Executes blocks for one run: leaf blocks go to the browser executor,
/// for-loops are expanded here into one child WorkflowRun per value.
#[derive(Clone)]
pub struct BlockRunner {
    executor: Arc<dyn BlockExecutor>,
    persistence: Arc<dyn Persistence>,
}

impl BlockRunner {
    pub fn new(executor: Arc<dyn BlockExecutor>, persistence: Arc<dyn Persistence>) -> Self {
        Self {
            executor,
            persistence,
        }
    }

    /// Runs `block` and stores its output in the block's output parameter.
    pub async fn run(&self, block: &Block, ctx: &RunContext) -> Result<BlockResult> {
        let result = match &block.kind {
            BlockKind::ForLoop {
                loop_over,
                loop_block,
            } => self.run_loop(block, loop_over, loop_block, ctx).await?,
            _ => self.run_leaf(block, ctx, ctx.workflow_run_id()).await?,
        };
        self.store_output(block, &result, ctx)?;
        Ok(result)
    }

    fn store_output(&self, block: &Block, result: &BlockResult, ctx: &RunContext) -> Result<()> {
        if let Some(output) = &result.output {
            if ctx.parameter(&block.output_parameter).is_some() {
                ctx.set_parameter_value(&block.output_parameter, output.clone())?;
            } else {
                debug!(block_label = %block.label, "output parameter not registered, skipping");
            }
        }
        Ok(())
    }

    async fn run_leaf(
        &self,
        block: &Block,
        ctx: &RunContext,
        workflow_run_id: &str,
    ) -> Result<BlockResult> {
        let mut status = BlockStatus::Created;

        let budget = ctx.steps();
        if budget.is_exhausted() {
            status.advance(BlockStatus::Failed)?;
            return Ok(BlockResult::failed(
                &block.label,
                format!("step budget of {} exhausted before block started", budget.max),
                0,
            ));
        }

        let url = match block.url() {
            Some(url) => match self.resolve_url(url, ctx)? {
                Some(resolved) => Some(resolved),
                None => {
                    status.advance(BlockStatus::Failed)?;
                    return Ok(BlockResult::failed(
                        &block.label,
                        format!("url for block `{}` did not resolve", block.label),
                        0,
                    ));
                }
            },
            None => None,
        };

        let mut parameters = HashMap::new();
        for key in &block.parameters {
            if let Some(value) = ctx.resolve_parameter(key)? {
                parameters.insert(key.clone(), value);
            }
        }

        status.advance(BlockStatus::Running)?;
        debug!(
            block_label = %block.label,
            block_type = block.kind.name(),
            workflow_run_id = %workflow_run_id,
            url = ?url,
            "executing block"
        );
        let result = self
            .executor
            .execute(BlockInvocation {
                block,
                url,
                parameters,
                workflow_run_id,
                organization_id: ctx.organization_id(),
                max_steps: budget.remaining(),
                browser: ctx.browser(),
            })
            .await?;
        if result.status.is_terminal() {
            status.advance(result.status)?;
        }

        let budget = ctx.consume_steps(result.steps);
        info!(
            block_label = %block.label,
            status = %result.status,
            steps = result.steps,
            steps_used = budget.used,
            "block finished"
        );
        Ok(result)
    }

    fn resolve_url(&self, url: &BlockUrl, ctx: &RunContext) -> Result<Option<String>> {
        match url {
            BlockUrl::Fixed(url) => Ok(Some(url.clone())),
            BlockUrl::Parameter(key) => Ok(match ctx.resolve_parameter(key)? {
                Some(Value::String(url)) => Some(url),
                Some(Value::Null) | None => None,
                Some(other) => Some(other.to_string()),
            }),
        }
    }

    async fn run_loop(
        &self,
        block: &Block,
        loop_over: &str,
        inner: &Block,
        ctx: &RunContext,
    ) -> Result<BlockResult> {
        if matches!(inner.kind, BlockKind::ForLoop { .. }) {
            return Ok(BlockResult::failed(
                &block.label,
                "nested for-loops are not supported",
                0,
            ));
        }

        let values = match ctx.resolve_parameter(loop_over)? {
            Some(Value::Array(values)) => values,
            other => {
                return Ok(BlockResult::failed(
                    &block.label,
                    format!(
                        "loop source `{loop_over}` did not resolve to a list (got {})",
                        other.map(|v| v.to_string()).unwrap_or_else(|| "nothing".into())
                    ),
                    0,
                ));
            }
        };

        let parent = self
            .persistence
            .get_workflow_run(ctx.workflow_run_id())
            .await?
            .ok_or_else(|| TaskFlowError::NotFound {
                kind: "workflow run",
                id: ctx.workflow_run_id().to_string(),
            })?;
        let iteration_keys = ctx.dependents_of(loop_over);

        info!(block_label = %block.label, iterations = values.len(), "starting for-loop");

        let mut outputs = Vec::with_capacity(values.len());
        let mut steps = 0u32;
        let mut stop: Option<BlockResult> = None;

        for (index, value) in values.iter().enumerate() {
            if ctx.steps().is_exhausted() {
                stop = Some(BlockResult::failed(
                    &block.label,
                    format!(
                        "step budget exhausted after {index} of {} loop iterations",
                        values.len()
                    ),
                    steps,
                ));
                break;
            }

            let mut child = WorkflowRun::child_of(&parent);
            self.persistence.save_workflow_run(&child).await?;

            let inner_result = match self
                .run_iteration(inner, ctx, &iteration_keys, value, &child.id)
                .await
            {
                Ok(result) => result,
                Err(error) => {
                    let failure = RunFailure::from_error(&error);
                    child.transition(failure.status)?;
                    child.failure_reason = Some(failure.reason);
                    if let Err(save_error) = self.persistence.save_workflow_run(&child).await {
                        warn!(workflow_run_id = %child.id, error = %save_error, "failed to close child run");
                    }
                    return Err(error);
                }
            };
            steps = steps.saturating_add(inner_result.steps);

            // Created/Running map to failed, so the child always ends terminal.
            child.transition(inner_result.status.as_run_status())?;
            child.failure_reason = inner_result.failure_reason.clone();
            self.persistence.save_workflow_run(&child).await?;

            outputs.push(Value::Array(vec![inner_result
                .output
                .clone()
                .unwrap_or(Value::Null)]));

            match inner_result.status {
                BlockStatus::Completed => {}
                BlockStatus::Canceled => {
                    stop = Some(BlockResult::canceled(&block.label, steps));
                    break;
                }
                _ if inner.continue_on_failure => {
                    warn!(
                        block_label = %inner.label,
                        iteration = index,
                        reason = ?inner_result.failure_reason,
                        "loop iteration failed, continuing"
                    );
                }
                _ => {
                    stop = Some(BlockResult::failed(
                        &block.label,
                        format!(
                            "loop iteration {index} failed: {}",
                            inner_result
                                .failure_reason
                                .unwrap_or_else(|| inner_result.status.to_string())
                        ),
                        steps,
                    ));
                    break;
                }
            }
        }

        let mut result = stop.unwrap_or_else(|| BlockResult::completed(&block.label, None, steps));
        result.steps = steps;
        result.output = Some(Value::Array(outputs));
        Ok(result)
    }

    /// Runs the loop body once with the per-item parameters bound.
    async fn run_iteration(
        &self,
        inner: &Block,
        ctx: &RunContext,
        iteration_keys: &[String],
        value: &Value,
        child_run_id: &str,
    ) -> Result<BlockResult> {
        let _bindings = iteration_keys
            .iter()
            .map(|key| ctx.bind_iteration(key, value.clone()))
            .collect::<Result<Vec<_>>>()?;
        self.run_leaf(inner, ctx, child_run_id).await
    }
}
