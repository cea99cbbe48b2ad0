mod support;

use serde_json::json;

use support::{goal_achieved, plan, summary, Harness};
use taskflow::block::{BlockKind, BlockResult, BlockUrl};
use taskflow::llm::prompts;
use taskflow::model::{RunStatus, ThoughtScenario};
use taskflow::{PlannerConfig, PlanningLoop};

const LIST: &str = "https://shop.example.com/list";

fn inner_task() -> serde_json::Value {
    json!({
        "thoughts": "open each item and read its price",
        "navigation_goal": "Open the item",
        "data_extraction_goal": "Read the price",
        "data_schema": {"type": "object", "properties": {"price": {"type": "number"}}}
    })
}

#[tokio::test]
async fn discovery_missing_field_fails_before_any_loop() -> anyhow::Result<()> {
    let h = Harness::new(LIST);
    let run = h.seed("get the price of every color", LIST).await?;
    h.llm.push(prompts::TASK_V2, plan("loop", "repeat for every color"));
    h.executor.respond(
        "extract_loop_values_0",
        BlockResult::completed(
            "extract_loop_values_0",
            Some(json!({"loop_values": ["red", "blue"]})),
            1,
        ),
    );

    let finished = PlanningLoop::task_v2(h.services(), PlannerConfig::default())
        .run(&run.id)
        .await?;

    assert_eq!(finished.status, RunStatus::Failed);
    assert!(finished
        .failure_reason
        .as_deref()
        .unwrap_or_default()
        .contains("is_loop_value_link"));
    assert_eq!(h.executor.labels(), vec!["extract_loop_values_0".to_string()]);
    assert_eq!(h.llm.calls_for(prompts::GENERATE_TASK_BLOCK), 0);

    // the discovery block ran, so it is on record; no loop was ever built
    let revisions = h.persistence.definition_revisions(&run.workflow_id);
    assert_eq!(revisions.len(), 1);
    revisions[0].validate()?;
    let labels: Vec<_> = revisions[0].blocks.iter().map(|b| b.label.as_str()).collect();
    assert_eq!(labels, vec!["extract_loop_values_0"]);
    assert_eq!(revisions[0].parameters.len(), 1);
    assert!(h
        .persistence
        .thoughts_for(&run.id)
        .iter()
        .all(|t| t.scenario != ThoughtScenario::ExtractLoopValues));
    Ok(())
}

#[tokio::test]
async fn discovery_block_failure_fails_the_run() -> anyhow::Result<()> {
    let h = Harness::new(LIST);
    let run = h.seed("get the price of every color", LIST).await?;
    h.llm.push(prompts::TASK_V2, plan("loop", "repeat for every color"));
    h.executor.respond(
        "extract_loop_values_0",
        BlockResult::failed("extract_loop_values_0", "page did not load", 1),
    );

    let finished = PlanningLoop::task_v2(h.services(), PlannerConfig::default())
        .run(&run.id)
        .await?;

    assert_eq!(finished.status, RunStatus::Failed);
    assert!(finished
        .failure_reason
        .unwrap_or_default()
        .contains("page did not load"));
    let revisions = h.persistence.definition_revisions(&run.workflow_id);
    assert!(revisions.last().map_or(false, |definition| definition
        .blocks
        .iter()
        .all(|block| !matches!(block.kind, BlockKind::ForLoop { .. }))));
    assert_eq!(revisions.len(), 1);
    Ok(())
}

#[tokio::test]
async fn non_link_values_reuse_the_captured_page_url() -> anyhow::Result<()> {
    let h = Harness::new(LIST);
    let run = h.seed("get the price of every color", LIST).await?;
    h.llm.push(prompts::TASK_V2, plan("loop", "repeat for every color"));
    h.llm.push(prompts::TASK_V2, goal_achieved());
    h.llm.push(prompts::GENERATE_TASK_BLOCK, inner_task());
    h.llm.push(prompts::SUMMARY, summary("prices collected", json!([1, 2])));
    h.executor.respond(
        "extract_loop_values_0",
        BlockResult::completed(
            "extract_loop_values_0",
            Some(json!({"extracted_information": {"loop_values": ["red", "blue"], "is_loop_value_link": false}})),
            1,
        ),
    );

    let finished = PlanningLoop::task_v2(h.services(), PlannerConfig::default())
        .run(&run.id)
        .await?;
    assert_eq!(finished.status, RunStatus::Completed);

    let invocations = h.executor.invocations();
    let inner: Vec<_> = invocations
        .iter()
        .filter(|i| i.label == "task_in_loop_0")
        .collect();
    assert_eq!(inner.len(), 2);
    for (invocation, color) in inner.iter().zip(["red", "blue"]) {
        assert_eq!(invocation.url.as_deref(), Some(LIST));
        assert_eq!(invocation.parameters.get("loop_value_0"), Some(&json!(color)));
        assert_ne!(invocation.workflow_run_id, run.workflow_run_id);
    }

    let children: Vec<_> = h
        .persistence
        .workflow_runs()
        .into_iter()
        .filter(|wr| wr.parent_workflow_run_id.as_deref() == Some(run.workflow_run_id.as_str()))
        .collect();
    assert_eq!(children.len(), 2);
    assert!(children.iter().all(|wr| wr.status == RunStatus::Completed));

    let definition = h
        .persistence
        .definition_revisions(&run.workflow_id)
        .pop()
        .ok_or_else(|| anyhow::anyhow!("no definition saved"))?;
    definition.validate()?;
    let labels: Vec<_> = definition.blocks.iter().map(|b| b.label.as_str()).collect();
    assert_eq!(labels, vec!["extract_loop_values_0", "loop_0"]);
    let BlockKind::ForLoop { loop_over, loop_block } = &definition.blocks[1].kind else {
        anyhow::bail!("expected a for-loop block");
    };
    assert_eq!(loop_over, "loop_values_0");
    assert!(loop_block.continue_on_failure);
    assert_eq!(
        loop_block.url(),
        Some(&BlockUrl::Fixed(LIST.to_string()))
    );

    let second_plan = h
        .llm
        .calls()
        .into_iter()
        .filter(|call| call.prompt_name() == prompts::TASK_V2)
        .nth(1)
        .map(|call| call.prompt)
        .unwrap_or_default();
    assert!(second_plan.contains("\"loop_values\""));
    assert!(second_plan.contains("\"from\": \"task_in_loop_0\""));

    let scenarios: Vec<_> = h
        .persistence
        .thoughts_for(&run.id)
        .into_iter()
        .map(|t| t.scenario)
        .collect();
    assert!(scenarios.contains(&ThoughtScenario::ExtractLoopValues));
    assert!(scenarios.contains(&ThoughtScenario::GenerateTaskInLoop));
    Ok(())
}

#[tokio::test]
async fn link_values_become_the_inner_url() -> anyhow::Result<()> {
    let h = Harness::new(LIST);
    let run = h.seed("read every product page", LIST).await?;
    h.llm.push(prompts::TASK_V2, plan("loop", "open every product"));
    h.llm.push(prompts::TASK_V2, goal_achieved());
    h.llm.push(prompts::GENERATE_TASK_BLOCK, inner_task());
    h.llm.push(prompts::SUMMARY, summary("done", json!(null)));
    let links = ["https://shop.example.com/p/1", "https://shop.example.com/p/2"];
    h.executor.respond(
        "extract_loop_values_0",
        BlockResult::completed(
            "extract_loop_values_0",
            Some(json!({"loop_values": links, "is_loop_value_link": true})),
            1,
        ),
    );
    h.executor.respond(
        "task_in_loop_0",
        BlockResult::failed("task_in_loop_0", "product page 404", 1),
    );

    let finished = PlanningLoop::task_v2(h.services(), PlannerConfig::default())
        .run(&run.id)
        .await?;
    assert_eq!(finished.status, RunStatus::Completed);

    let urls: Vec<_> = h
        .executor
        .invocations()
        .into_iter()
        .filter(|i| i.label == "task_in_loop_0")
        .map(|i| i.url.unwrap_or_default())
        .collect();
    assert_eq!(urls, links);

    // the first item failed, the loop carried on
    let failed_children = h
        .persistence
        .workflow_runs()
        .into_iter()
        .filter(|wr| wr.status == RunStatus::Failed)
        .count();
    assert_eq!(failed_children, 1);
    Ok(())
}
