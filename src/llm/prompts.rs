//! Prompt templates for the planning loop. Answers are always JSON; the keys
//! listed in each template are what the planner reads back.

use chrono::Local;
use serde_json::Value;

pub const TASK_V2: &str = "task_v2";
pub const GENERATE_EXTRACTION_TASK: &str = "task_v2_generate_extraction_task";
pub const EXTRACT_LOOP_VALUES: &str = "task_v2_extract_loop_values";
pub const GENERATE_TASK_BLOCK: &str = "task_v2_generate_task_block";
pub const CHECK_COMPLETION: &str = "task_v2_check_completion";
pub const SUMMARY: &str = "task_v2_summary";
pub const GENERATE_METADATA: &str = "task_v2_generate_metadata";

const PLAN_TEMPLATE: &str = r#"You are driving a web browser to accomplish a user's goal, one step at a time.

User goal:
{goal}

Current URL: {current_url}
Current local datetime: {local_datetime}

Elements on the page:
{elements}

Steps taken so far (oldest first):
{history}

Decide the single next step. Supported task types:
- "navigate": interact with the page (click, type, submit) towards a sub-goal
- "extract": read structured data from the current page
- "loop": repeat the same task for every item of a list on the page

Answer with JSON only:
{"user_goal_achieved": bool, "observation": string, "thoughts": string, "plan": string, "task_type": "navigate" | "extract" | "loop"}"#;

const EXTRACTION_TASK_TEMPLATE: &str = r#"Turn the plan into a concrete data extraction task for the current page.

User goal:
{goal}

Plan:
{plan}

Current URL: {current_url}

Answer with JSON only:
{"data_extraction_goal": string, "schema": object (JSON schema of the data to extract)}"#;

const LOOP_VALUES_GOAL: &str = r#"Find the list of values that the following plan has to be repeated for. Each value is either a link to visit or a short description of the item.

Plan:
{plan}

User goal:
{goal}"#;

const TASK_BLOCK_TEMPLATE: &str = r#"Write one browser task that will be run once for every loop value.

User goal:
{goal}

Plan for each item:
{plan}

Current URL: {current_url}
The value of the current item is available as the parameter `{loop_parameter}`. Is the value a link: {is_link}.

Answer with JSON only:
{"thoughts": string, "navigation_goal": string | null, "data_extraction_goal": string | null, "data_schema": object | null}"#;

const COMPLETION_TEMPLATE: &str = r#"Decide whether the user's goal has been fully achieved.

User goal:
{goal}

Current URL: {current_url}

Elements on the page:
{elements}

Steps taken so far:
{history}

Answer with JSON only:
{"page_info": string, "thoughts": string, "user_goal_achieved": bool}"#;

const SUMMARY_TEMPLATE: &str = r#"The browser task below is finished. Summarize what was done and return the information the user asked for.

User goal:
{goal}

Current URL: {current_url}

Steps taken:
{history}

Expected output schema (may be empty):
{output_schema}

Answer with JSON only:
{"description": string, "output": any}"#;

const METADATA_TEMPLATE: &str = r#"A user wants a browser task done but did not say where to start.

User goal:
{goal}

Current local datetime: {local_datetime}

Pick the best starting URL and give the workflow a short title.

Answer with JSON only:
{"thoughts": string, "url": string, "workflow_title": string}"#;

/// Renders the templates above.
pub struct PromptBuilder;

impl PromptBuilder {
    pub fn plan(goal: &str, current_url: &str, elements: &str, history: &Value) -> String {
        PLAN_TEMPLATE
            .replace("{goal}", goal)
            .replace("{current_url}", current_url)
            .replace("{local_datetime}", &local_datetime())
            .replace("{elements}", elements)
            .replace("{history}", &pretty(history))
    }

    pub fn extraction_task(goal: &str, plan: &str, current_url: &str) -> String {
        EXTRACTION_TASK_TEMPLATE
            .replace("{goal}", goal)
            .replace("{plan}", plan)
            .replace("{current_url}", current_url)
    }

    /// Data-extraction goal handed to the loop discovery block.
    pub fn loop_values_goal(goal: &str, plan: &str) -> String {
        LOOP_VALUES_GOAL
            .replace("{goal}", goal)
            .replace("{plan}", plan)
    }

    pub fn task_block(
        goal: &str,
        plan: &str,
        current_url: &str,
        loop_parameter: &str,
        is_link: bool,
    ) -> String {
        TASK_BLOCK_TEMPLATE
            .replace("{goal}", goal)
            .replace("{plan}", plan)
            .replace("{current_url}", current_url)
            .replace("{loop_parameter}", loop_parameter)
            .replace("{is_link}", if is_link { "yes" } else { "no" })
    }

    pub fn check_completion(goal: &str, current_url: &str, elements: &str, history: &Value) -> String {
        COMPLETION_TEMPLATE
            .replace("{goal}", goal)
            .replace("{current_url}", current_url)
            .replace("{elements}", elements)
            .replace("{history}", &pretty(history))
    }

    pub fn summary(
        goal: &str,
        current_url: &str,
        history: &Value,
        output_schema: Option<&Value>,
    ) -> String {
        SUMMARY_TEMPLATE
            .replace("{goal}", goal)
            .replace("{current_url}", current_url)
            .replace("{history}", &pretty(history))
            .replace(
                "{output_schema}",
                &output_schema.map(pretty).unwrap_or_default(),
            )
    }

    pub fn metadata(goal: &str) -> String {
        METADATA_TEMPLATE
            .replace("{goal}", goal)
            .replace("{local_datetime}", &local_datetime())
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn local_datetime() -> String {
    Local::now().format("%Y-%m-%dT%H:%M:%S%:z").to_string()
}
