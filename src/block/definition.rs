use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TaskFlowError};
use crate::state::{Parameter, ParameterError, ParameterTable};

use super::model::Block;

/// Serializable description of everything executed so far.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkflowDefinition {
    pub workflow_id: String,
    pub title: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub blocks: Vec<Block>,
}

impl WorkflowDefinition {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Parses JSON when the text starts with `{`, YAML otherwise.
    pub fn parse(text: &str) -> Result<Self> {
        if text.trim_start().starts_with('{') {
            Ok(serde_json::from_str(text)?)
        } else {
            Ok(serde_yaml::from_str(text)?)
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| TaskFlowError::Config(format!("{}: {e}", path.display())))?;
        Self::parse(&text)
    }

    /// Every source chain resolves and every referenced key is declared.
    pub fn validate(&self) -> Result<()> {
        let table = ParameterTable::from_parameters(&self.parameters)?;
        table.validate()?;
        for block in &self.blocks {
            for param in block.output_parameters() {
                if !table.contains(&param.key) {
                    return Err(ParameterError::Unknown(param.key).into());
                }
            }
            for key in block.referenced_parameters() {
                if !table.contains(key) {
                    return Err(ParameterError::Unknown(key.to_string()).into());
                }
            }
        }
        Ok(())
    }

    /// True when `self` is an unchanged prefix of `later`.
    pub fn is_prefix_of(&self, later: &WorkflowDefinition) -> bool {
        self.workflow_id == later.workflow_id
            && later.parameters.starts_with(&self.parameters)
            && later.blocks.starts_with(&self.blocks)
    }
}

/// Blocks and parameters contributed by one planning iteration.
#[derive(Clone, Debug, Default)]
pub struct DefinitionFragment {
    pub parameters: Vec<Parameter>,
    pub blocks: Vec<Block>,
}

impl DefinitionFragment {
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty() && self.blocks.is_empty()
    }

    pub fn extend(&mut self, other: DefinitionFragment) {
        self.parameters.extend(other.parameters);
        self.blocks.extend(other.blocks);
    }
}

/// Append-only accumulator; serializes only when asked.
#[derive(Debug)]
pub struct WorkflowDefinitionBuilder {
    definition: WorkflowDefinition,
    revision: usize,
}

impl WorkflowDefinitionBuilder {
    pub fn new(workflow_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            definition: WorkflowDefinition {
                workflow_id: workflow_id.into(),
                title: title.into(),
                parameters: Vec::new(),
                blocks: Vec::new(),
            },
            revision: 0,
        }
    }

    pub fn append(&mut self, fragment: DefinitionFragment) {
        if fragment.is_empty() {
            return;
        }
        self.definition.parameters.extend(fragment.parameters);
        self.definition.blocks.extend(fragment.blocks);
        self.revision += 1;
    }

    pub fn revision(&self) -> usize {
        self.revision
    }

    pub fn blocks(&self) -> &[Block] {
        &self.definition.blocks
    }

    pub fn definition(&self) -> &WorkflowDefinition {
        &self.definition
    }

    pub fn snapshot(&self) -> WorkflowDefinition {
        self.definition.clone()
    }
}
