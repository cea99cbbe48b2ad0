mod support;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use support::{goal_achieved, not_done, plan, summary, FakeExecutor, FakeObserver, Harness, API_KEY};
use taskflow::block::BlockResult;
use taskflow::llm::prompts;
use taskflow::model::{RunStatus, TaskRequest, ThoughtOwner};
use taskflow::services::{
    sign_payload, BlockExecutor, BlockInvocation, MemoryPersistence, Persistence,
    SIGNATURE_HEADER, TIMESTAMP_HEADER,
};
use taskflow::{PlannerConfig, PlanningLoop, TaskFlowError};

const FLIGHTS: &str = "https://flights.example.com/";

#[tokio::test]
async fn blank_page_forces_goto_url_on_first_iteration() -> anyhow::Result<()> {
    let h = Harness::blank();
    let run = h.seed("find the cheapest flight", "https://flights.example.com").await?;
    h.llm.push(prompts::TASK_V2, goal_achieved());
    h.llm.push(
        prompts::SUMMARY,
        summary("Found the cheapest flight", json!({"price": 99})),
    );

    let planner = PlanningLoop::task_v2(h.services(), PlannerConfig::default());
    let finished = planner.run(&run.id).await?;

    let invocations = h.executor.invocations();
    assert_eq!(invocations.len(), 1);
    assert_eq!(invocations[0].label, "goto_url_0");
    assert_eq!(invocations[0].block_type, "goto_url");
    assert_eq!(invocations[0].url.as_deref(), Some(FLIGHTS));
    assert_eq!(h.llm.calls_for(prompts::TASK_V2), 1);

    assert_eq!(finished.status, RunStatus::Completed);
    assert_eq!(finished.summary.as_deref(), Some("Found the cheapest flight"));
    assert_eq!(finished.output, Some(json!({"price": 99})));
    assert_eq!(h.workflow_run(&run.workflow_run_id).await?.status, RunStatus::Completed);
    assert!(h.browser.is_closed());
    assert!(h
        .artifacts
        .keys
        .lock()
        .iter()
        .all(|key| key.starts_with(&run.id)));
    assert!(!h.artifacts.keys.lock().is_empty());
    Ok(())
}

#[tokio::test]
async fn completion_webhook_is_signed() -> anyhow::Result<()> {
    let h = Harness::new(FLIGHTS);
    let run = h.seed("find the cheapest flight", FLIGHTS).await?;
    h.llm.push(prompts::TASK_V2, goal_achieved());
    h.llm.push(prompts::SUMMARY, summary("done", json!(null)));

    PlanningLoop::task_v2(h.services(), PlannerConfig::default())
        .run(&run.id)
        .await?;

    let posts = h.webhook.posts.lock();
    assert_eq!(posts.len(), 1);
    let (url, body, headers) = &posts[0];
    assert_eq!(url, "https://hooks.example.com/taskflow");
    let header = |name: &str| {
        headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
    };
    let timestamp: i64 = header(TIMESTAMP_HEADER).unwrap_or_default().parse()?;
    assert_eq!(
        header(SIGNATURE_HEADER),
        Some(sign_payload(API_KEY, timestamp, body)?)
    );
    let payload: serde_json::Value = serde_json::from_str(body)?;
    assert_eq!(payload["status"], json!("completed"));
    Ok(())
}

#[tokio::test]
async fn goal_achieved_builds_no_block() -> anyhow::Result<()> {
    let h = Harness::new(FLIGHTS);
    let run = h.seed("find the cheapest flight", FLIGHTS).await?;
    h.llm.push(prompts::TASK_V2, goal_achieved());
    h.llm.push(prompts::SUMMARY, summary("nothing to do", json!(null)));

    let finished = PlanningLoop::task_v2(h.services(), PlannerConfig::default())
        .run(&run.id)
        .await?;

    assert_eq!(finished.status, RunStatus::Completed);
    assert!(h.executor.invocations().is_empty());
    assert!(h.persistence.definition_revisions(&run.workflow_id).is_empty());
    Ok(())
}

#[tokio::test]
async fn unknown_task_type_fails_without_block() -> anyhow::Result<()> {
    let h = Harness::new(FLIGHTS);
    let run = h.seed("find the cheapest flight", FLIGHTS).await?;
    h.llm.push(prompts::TASK_V2, plan("scroll", "scroll to the bottom"));

    let finished = PlanningLoop::task_v2(h.services(), PlannerConfig::default())
        .run(&run.id)
        .await?;

    assert_eq!(finished.status, RunStatus::Failed);
    assert!(finished
        .failure_reason
        .as_deref()
        .unwrap_or_default()
        .contains("unsupported task type `scroll`"));
    assert!(h.executor.invocations().is_empty());
    assert!(h.persistence.definition_revisions(&run.workflow_id).is_empty());
    assert_eq!(h.workflow_run(&run.workflow_run_id).await?.status, RunStatus::Failed);
    assert_eq!(h.webhook.posts.lock().len(), 1);
    Ok(())
}

#[tokio::test]
async fn never_runs_more_than_ten_iterations() -> anyhow::Result<()> {
    let h = Harness::new(FLIGHTS);
    let run = h.seed("find the cheapest flight", FLIGHTS).await?;
    for i in 0..11 {
        h.llm.push(prompts::TASK_V2, plan("navigate", &format!("click result {i}")));
    }
    h.llm.push(prompts::CHECK_COMPLETION, not_done());

    let finished = PlanningLoop::task_v2(h.services(), PlannerConfig::default())
        .run(&run.id)
        .await?;

    assert_eq!(finished.status, RunStatus::Failed);
    assert!(finished
        .failure_reason
        .as_deref()
        .unwrap_or_default()
        .contains("max iterations"));
    assert_eq!(h.llm.calls_for(prompts::TASK_V2), 10);
    assert_eq!(h.llm.calls_for(prompts::CHECK_COMPLETION), 1);
    let labels = h.executor.labels();
    assert_eq!(labels.len(), 10);
    assert_eq!(labels.last().map(String::as_str), Some("navigate_9"));
    Ok(())
}

#[tokio::test]
async fn step_budget_failure_has_its_own_reason() -> anyhow::Result<()> {
    let h = Harness::new(FLIGHTS);
    let run = h
        .seed_request(TaskRequest {
            organization_id: "org_1".into(),
            prompt: "find the cheapest flight".into(),
            url: Some(FLIGHTS.into()),
            max_steps_override: Some(2),
            ..TaskRequest::default()
        })
        .await?;
    for _ in 0..3 {
        h.llm.push(prompts::TASK_V2, plan("navigate", "open the next page"));
    }
    h.llm.push(prompts::CHECK_COMPLETION, not_done());

    let finished = PlanningLoop::task_v2(h.services(), PlannerConfig::default())
        .run(&run.id)
        .await?;

    assert_eq!(finished.status, RunStatus::Failed);
    let reason = finished.failure_reason.unwrap_or_default();
    assert!(reason.contains("increase max steps"), "{reason}");
    assert!(!reason.contains("max iterations"));

    let invocations = h.executor.invocations();
    assert_eq!(invocations.len(), 2);
    assert_eq!(invocations[0].max_steps, 2);
    assert_eq!(invocations[1].max_steps, 1);
    Ok(())
}

#[tokio::test]
async fn exhausted_budget_still_completes_when_goal_is_met() -> anyhow::Result<()> {
    let browser = support::FakeBrowser::at(FLIGHTS);
    let h = Harness::with_executor(browser.clone(), FakeExecutor::with_steps(browser, 5));
    let run = h.seed("find the cheapest flight", FLIGHTS).await?;
    h.llm.push(prompts::TASK_V2, plan("navigate", "sort by price"));
    h.llm.push(
        prompts::CHECK_COMPLETION,
        json!({"page_info": "sorted", "thoughts": "done", "user_goal_achieved": true}),
    );
    h.llm.push(prompts::SUMMARY, summary("sorted by price", json!(null)));

    let finished = PlanningLoop::task_v2(h.services(), PlannerConfig::default().with_max_steps(5))
        .run(&run.id)
        .await?;

    assert_eq!(finished.status, RunStatus::Completed);
    assert_eq!(h.executor.labels(), vec!["navigate_0".to_string()]);
    Ok(())
}

/// Cancels the stored run while its first block is executing.
struct CancelingExecutor {
    inner: FakeExecutor,
    persistence: Arc<MemoryPersistence>,
    task_run_id: String,
}

#[async_trait]
impl BlockExecutor for CancelingExecutor {
    async fn execute(&self, invocation: BlockInvocation<'_>) -> taskflow::Result<BlockResult> {
        let result = self.inner.execute(invocation).await?;
        if let Some(mut stored) = self.persistence.get_task_run(&self.task_run_id).await? {
            stored.transition(RunStatus::Canceled)?;
            self.persistence.save_task_run(&stored).await?;
        }
        Ok(result)
    }
}

#[tokio::test]
async fn cancellation_is_honoured_at_the_next_iteration() -> anyhow::Result<()> {
    let h = Harness::new(FLIGHTS);
    let run = h.seed("find the cheapest flight", FLIGHTS).await?;
    h.llm.push(prompts::TASK_V2, plan("navigate", "open search"));
    h.llm.push(prompts::TASK_V2, plan("navigate", "never planned"));

    let mut services = h.services();
    services.executor = Arc::new(CancelingExecutor {
        inner: FakeExecutor::new(h.browser.clone()),
        persistence: h.persistence.clone(),
        task_run_id: run.id.clone(),
    });

    let finished = PlanningLoop::task_v2(services, PlannerConfig::default())
        .run(&run.id)
        .await?;

    assert_eq!(finished.status, RunStatus::Canceled);
    assert_eq!(h.llm.calls_for(prompts::TASK_V2), 1);
    assert_eq!(h.workflow_run(&run.workflow_run_id).await?.status, RunStatus::Canceled);
    // seed, start, external cancel; the loop adds nothing after that
    assert_eq!(h.persistence.task_run_writes(&run.id), 3);
    assert!(h.browser.is_closed());
    Ok(())
}

#[tokio::test]
async fn canceled_block_cancels_the_run() -> anyhow::Result<()> {
    let h = Harness::new(FLIGHTS);
    let run = h.seed("find the cheapest flight", FLIGHTS).await?;
    h.llm.push(prompts::TASK_V2, plan("navigate", "open search"));
    h.executor
        .respond("navigate_0", BlockResult::canceled("navigate_0", 1));

    let finished = PlanningLoop::task_v2(h.services(), PlannerConfig::default())
        .run(&run.id)
        .await?;

    assert_eq!(finished.status, RunStatus::Canceled);
    assert_eq!(h.workflow_run(&run.workflow_run_id).await?.status, RunStatus::Canceled);
    assert_eq!(h.llm.calls_for(prompts::TASK_V2), 1);
    Ok(())
}

#[tokio::test]
async fn definition_only_ever_grows() -> anyhow::Result<()> {
    let h = Harness::blank();
    let run = h.seed("download all invoices", "https://billing.example.com").await?;
    h.llm.push(prompts::TASK_V2, plan("navigate", "open the invoices tab"));
    h.llm.push(prompts::TASK_V2, plan("extract", "read the invoice list"));
    h.llm.push(prompts::TASK_V2, goal_achieved());
    h.llm.push(
        prompts::GENERATE_EXTRACTION_TASK,
        json!({
            "data_extraction_goal": "List every invoice number",
            "schema": {"type": "array", "items": {"type": "string"}}
        }),
    );
    h.llm.push(prompts::SUMMARY, summary("listed invoices", json!(["A-1"])));

    let finished = PlanningLoop::task_v2(h.services(), PlannerConfig::default())
        .run(&run.id)
        .await?;
    assert_eq!(finished.status, RunStatus::Completed);

    let revisions = h.persistence.definition_revisions(&run.workflow_id);
    assert_eq!(revisions.len(), 3);
    for pair in revisions.windows(2) {
        assert!(pair[0].is_prefix_of(&pair[1]));
        assert_eq!(pair[1].blocks.len(), pair[0].blocks.len() + 1);
    }
    for revision in &revisions {
        revision.validate()?;
    }
    let labels: Vec<_> = revisions[2].blocks.iter().map(|b| b.label.as_str()).collect();
    assert_eq!(labels, vec!["goto_url_0", "navigate_1", "extract_2"]);

    // extraction after other blocks works on whatever page is open
    let extract = &h.executor.invocations()[2];
    assert_eq!(extract.label, "extract_2");
    assert_eq!(extract.url, None);

    let last_prompt = h
        .llm
        .calls()
        .into_iter()
        .filter(|call| call.prompt_name() == prompts::TASK_V2)
        .last()
        .map(|call| call.prompt)
        .unwrap_or_default();
    assert!(last_prompt.contains("\"from\": \"extract_2\""));
    Ok(())
}

#[tokio::test]
async fn first_extract_binds_current_url() -> anyhow::Result<()> {
    let h = Harness::new(FLIGHTS);
    let run = h.seed("list flight prices", FLIGHTS).await?;
    h.llm.push(prompts::TASK_V2, plan("extract", "read the prices"));
    h.llm.push(prompts::TASK_V2, goal_achieved());
    h.llm.push(
        prompts::GENERATE_EXTRACTION_TASK,
        json!({"data_extraction_goal": "prices", "schema": null}),
    );
    h.llm.push(prompts::SUMMARY, summary("prices", json!(null)));

    PlanningLoop::task_v2(h.services(), PlannerConfig::default())
        .run(&run.id)
        .await?;

    let invocations = h.executor.invocations();
    assert_eq!(invocations[0].label, "extract_0");
    assert_eq!(invocations[0].url.as_deref(), Some(FLIGHTS));
    Ok(())
}

#[tokio::test]
async fn terminal_run_is_never_written_again() -> anyhow::Result<()> {
    let h = Harness::new(FLIGHTS);
    let run = h.seed("find the cheapest flight", FLIGHTS).await?;
    h.llm.push(prompts::TASK_V2, goal_achieved());
    h.llm.push(prompts::SUMMARY, summary("done", json!(null)));

    let planner = PlanningLoop::task_v2(h.services(), PlannerConfig::default());
    let finished = planner.run(&run.id).await?;
    let writes = h.persistence.task_run_writes(&run.id);

    let again = planner.run(&run.id).await;
    assert!(matches!(again, Err(TaskFlowError::Setup(_))));

    let mut tampered = finished.clone();
    tampered.status = RunStatus::Failed;
    assert!(h.persistence.save_task_run(&tampered).await.is_err());
    assert_eq!(h.persistence.task_run_writes(&run.id), writes);
    Ok(())
}

#[tokio::test]
async fn run_timeout_ends_timed_out() -> anyhow::Result<()> {
    let h = Harness::new(FLIGHTS);
    let run = h.seed("find the cheapest flight", FLIGHTS).await?;

    let config = PlannerConfig::default().with_run_timeout(Duration::ZERO);
    let finished = PlanningLoop::task_v2(h.services(), config).run(&run.id).await?;

    assert_eq!(finished.status, RunStatus::TimedOut);
    assert!(h.executor.invocations().is_empty());
    assert_eq!(h.workflow_run(&run.workflow_run_id).await?.status, RunStatus::TimedOut);
    Ok(())
}

#[tokio::test]
async fn empty_plan_consumes_the_iteration() -> anyhow::Result<()> {
    let h = Harness::new(FLIGHTS);
    let run = h.seed("find the cheapest flight", FLIGHTS).await?;
    h.llm.push(prompts::TASK_V2, plan("navigate", ""));
    h.llm.push(prompts::TASK_V2, plan("navigate", "   "));

    let config = PlannerConfig::default().with_max_iterations(2);
    let finished = PlanningLoop::task_v2(h.services(), config).run(&run.id).await?;

    assert_eq!(finished.status, RunStatus::Failed);
    assert!(finished.failure_reason.unwrap_or_default().contains("max iterations"));
    assert!(h.executor.invocations().is_empty());
    Ok(())
}

#[tokio::test]
async fn observation_failure_retries_on_next_iteration() -> anyhow::Result<()> {
    let h = Harness::new(FLIGHTS).with_observer(FakeObserver::failing(1));
    let run = h.seed("find the cheapest flight", FLIGHTS).await?;
    h.llm.push(prompts::TASK_V2, goal_achieved());
    h.llm.push(prompts::SUMMARY, summary("done", json!(null)));

    let finished = PlanningLoop::task_v2(h.services(), PlannerConfig::default())
        .run(&run.id)
        .await?;

    assert_eq!(finished.status, RunStatus::Completed);
    assert_eq!(h.llm.calls_for(prompts::TASK_V2), 1);
    Ok(())
}

#[tokio::test]
async fn failed_block_is_fed_back_into_history() -> anyhow::Result<()> {
    let h = Harness::new(FLIGHTS);
    let run = h.seed("find the cheapest flight", FLIGHTS).await?;
    h.llm.push(prompts::TASK_V2, plan("navigate", "click search"));
    h.llm.push(prompts::TASK_V2, goal_achieved());
    h.llm.push(prompts::SUMMARY, summary("done", json!(null)));
    h.executor.respond(
        "navigate_0",
        BlockResult::failed("navigate_0", "search button missing", 2),
    );

    let finished = PlanningLoop::task_v2(h.services(), PlannerConfig::default())
        .run(&run.id)
        .await?;

    assert_eq!(finished.status, RunStatus::Completed);
    let second = &h.llm.calls()[1];
    assert_eq!(second.prompt_name(), prompts::TASK_V2);
    assert!(second.prompt.contains("search button missing"));
    assert!(second.prompt.contains("\"status\": \"failed\""));
    Ok(())
}

#[tokio::test]
async fn observer_channel_files_thoughts_under_the_cruise() -> anyhow::Result<()> {
    let h = Harness::new(FLIGHTS);
    let run = h.seed("find the cheapest flight", FLIGHTS).await?;
    h.llm.push(prompts::TASK_V2, plan("navigate", "open deals"));
    h.llm.push(prompts::TASK_V2, goal_achieved());
    h.llm.push(prompts::SUMMARY, summary("done", json!(null)));

    let finished = PlanningLoop::observer(h.services(), PlannerConfig::default())
        .run(&run.id)
        .await?;

    assert_eq!(finished.status, RunStatus::Completed);
    let thoughts = h.persistence.thoughts_for(&run.id);
    assert_eq!(thoughts.len(), 3);
    assert!(thoughts
        .iter()
        .all(|t| matches!(t.owner, ThoughtOwner::ObserverCruise(_))));
    assert_eq!(thoughts[0].block_label.as_deref(), Some("navigate_0"));
    assert_eq!(thoughts[0].task_type.as_deref(), Some("navigate"));
    Ok(())
}

#[tokio::test]
async fn precondition_violation_is_a_setup_error() -> anyhow::Result<()> {
    let h = Harness::new(FLIGHTS);
    let mut run = h.seed("find the cheapest flight", FLIGHTS).await?;
    run.url = None;
    h.persistence.save_task_run(&run).await?;

    let result = PlanningLoop::task_v2(h.services(), PlannerConfig::default())
        .run(&run.id)
        .await;

    assert!(matches!(result, Err(TaskFlowError::Setup(_))));
    let stored = h.persistence.get_task_run(&run.id).await?;
    assert_eq!(stored.map(|r| r.status), Some(RunStatus::Queued));
    Ok(())
}

#[tokio::test]
async fn termination_signal_ends_the_run_terminated() -> anyhow::Result<()> {
    let h = Harness::new(FLIGHTS);
    let run = h.seed("find the cheapest flight", FLIGHTS).await?;
    h.llm.push(prompts::TASK_V2, plan("navigate", "log in"));
    h.executor.fail(
        "navigate_0",
        TaskFlowError::Terminated("account is locked".into()),
    );

    let finished = PlanningLoop::task_v2(h.services(), PlannerConfig::default())
        .run(&run.id)
        .await?;

    assert_eq!(finished.status, RunStatus::Terminated);
    assert_eq!(finished.failure_reason.as_deref(), Some("account is locked"));
    assert_eq!(
        h.workflow_run(&run.workflow_run_id).await?.status,
        RunStatus::Terminated
    );
    assert_eq!(h.llm.calls_for(prompts::TASK_V2), 1);
    assert!(h.browser.is_closed());

    let posts = h.webhook.posts.lock();
    assert_eq!(posts.len(), 1);
    let payload: serde_json::Value = serde_json::from_str(&posts[0].1)?;
    assert_eq!(payload["status"], json!("terminated"));
    Ok(())
}

#[tokio::test]
async fn executor_error_fails_the_run_and_still_cleans_up() -> anyhow::Result<()> {
    let h = Harness::new(FLIGHTS);
    let run = h.seed("find the cheapest flight", FLIGHTS).await?;
    h.llm.push(prompts::TASK_V2, plan("navigate", "open search"));
    h.executor.fail(
        "navigate_0",
        TaskFlowError::Execution("browser crashed".into()),
    );

    let finished = PlanningLoop::task_v2(h.services(), PlannerConfig::default())
        .run(&run.id)
        .await?;

    assert_eq!(finished.status, RunStatus::Failed);
    assert!(finished
        .failure_reason
        .as_deref()
        .unwrap_or_default()
        .contains("browser crashed"));
    assert_eq!(
        h.workflow_run(&run.workflow_run_id).await?.status,
        RunStatus::Failed
    );
    assert!(h.browser.is_closed());
    // the screenshot upload from the first observation was drained
    assert_eq!(h.artifacts.keys.lock().len(), 1);
    assert_eq!(h.webhook.posts.lock().len(), 1);
    Ok(())
}

#[tokio::test]
async fn reasoning_model_error_fails_the_run() -> anyhow::Result<()> {
    let h = Harness::new(FLIGHTS);
    let run = h.seed("find the cheapest flight", FLIGHTS).await?;

    let finished = PlanningLoop::task_v2(h.services(), PlannerConfig::default())
        .run(&run.id)
        .await?;

    assert_eq!(finished.status, RunStatus::Failed);
    assert!(finished
        .failure_reason
        .as_deref()
        .unwrap_or_default()
        .starts_with("reasoning model error"));
    assert!(h.executor.invocations().is_empty());
    assert!(h.browser.is_closed());
    Ok(())
}
