use std::path::Path;

use serde::Serialize;

use crate::block::WorkflowDefinition;
use crate::config::PlannerConfig;
use crate::error::Result;

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct BlockSummary {
    pub label: String,
    pub block_type: String,
    pub output_parameter: String,
}

/// What `definition check` reports for a valid file.
#[derive(Clone, Debug, Serialize)]
pub struct DefinitionSummary {
    pub workflow_id: String,
    pub title: String,
    pub parameters: usize,
    pub blocks: Vec<BlockSummary>,
}

/// Loads a YAML or JSON definition and checks its parameter chains.
pub fn check_definition(path: &Path) -> Result<DefinitionSummary> {
    let definition = WorkflowDefinition::load(path)?;
    definition.validate()?;
    Ok(DefinitionSummary {
        workflow_id: definition.workflow_id.clone(),
        title: definition.title.clone(),
        parameters: definition.parameters.len(),
        blocks: definition
            .blocks
            .iter()
            .map(|block| BlockSummary {
                label: block.label.clone(),
                block_type: block.kind.name().to_string(),
                output_parameter: block.output_parameter.clone(),
            })
            .collect(),
    })
}

/// Planner configuration after `TASKFLOW_*` overrides.
pub fn effective_config() -> Result<PlannerConfig> {
    PlannerConfig::from_env()
}
