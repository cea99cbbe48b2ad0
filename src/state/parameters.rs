use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ParameterError {
    #[error("parameter `{0}` already exists")]
    Duplicate(String),
    #[error("parameter `{key}` references unknown source `{source_key}`")]
    DanglingSource { key: String, source_key: String },
    #[error("parameter `{0}` is part of a source cycle")]
    Cycle(String),
    #[error("parameter `{0}` not found")]
    Unknown(String),
    #[error("parameter `{0}` is derived and cannot be written directly")]
    NotWritable(String),
    #[error("only context parameters may declare a source (`{0}`)")]
    UnexpectedSource(String),
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    /// Supplied when the workflow starts.
    Workflow,
    /// Written by the block that owns it.
    Output,
    /// Aliases the resolved value of its source.
    Context,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Parameter {
    pub key: String,
    #[serde(rename = "parameter_type")]
    pub kind: ParameterKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Field picked out of the source value when it is an object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl Parameter {
    fn new(key: impl Into<String>, kind: ParameterKind) -> Self {
        Self {
            key: key.into(),
            kind,
            description: None,
            source: None,
            field: None,
        }
    }

    pub fn workflow(key: impl Into<String>) -> Self {
        Self::new(key, ParameterKind::Workflow)
    }

    pub fn output(key: impl Into<String>) -> Self {
        Self::new(key, ParameterKind::Output)
    }

    pub fn context(key: impl Into<String>, source: impl Into<String>) -> Self {
        let mut param = Self::new(key, ParameterKind::Context);
        param.source = Some(source.into());
        param
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Named values of one run plus the source edges between them.
///
/// Sources must be registered before anything points at them, so the
/// table is a DAG by construction; `validate` re-checks it anyway for
/// tables rebuilt from a serialized definition.
#[derive(Debug, Default)]
pub struct ParameterTable {
    order: Vec<Parameter>,
    index: HashMap<String, usize>,
    values: HashMap<String, Value>,
    bindings: HashMap<String, Value>,
}

impl ParameterTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from parameters listed in dependency order.
    pub fn from_parameters<'a>(
        parameters: impl IntoIterator<Item = &'a Parameter>,
    ) -> Result<Self, ParameterError> {
        let mut table = Self::new();
        for param in parameters {
            table.add(param.clone())?;
        }
        Ok(table)
    }

    pub fn add(&mut self, param: Parameter) -> Result<(), ParameterError> {
        if self.index.contains_key(&param.key) {
            return Err(ParameterError::Duplicate(param.key));
        }
        if let Some(source) = &param.source {
            if param.kind != ParameterKind::Context {
                return Err(ParameterError::UnexpectedSource(param.key));
            }
            if source == &param.key {
                return Err(ParameterError::Cycle(param.key));
            }
            if !self.index.contains_key(source) {
                return Err(ParameterError::DanglingSource {
                    key: param.key.clone(),
                    source_key: source.clone(),
                });
            }
        }
        self.index.insert(param.key.clone(), self.order.len());
        self.order.push(param);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Parameter> {
        self.index.get(key).map(|idx| &self.order[*idx])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.order
    }

    pub fn set_value(&mut self, key: &str, value: Value) -> Result<(), ParameterError> {
        let param = self
            .get(key)
            .ok_or_else(|| ParameterError::Unknown(key.to_string()))?;
        if param.kind == ParameterKind::Context {
            return Err(ParameterError::NotWritable(key.to_string()));
        }
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    /// Temporarily pins a context parameter to one value (loop iterations).
    pub fn bind(&mut self, key: &str, value: Value) -> Result<(), ParameterError> {
        if !self.contains(key) {
            return Err(ParameterError::Unknown(key.to_string()));
        }
        self.bindings.insert(key.to_string(), value);
        Ok(())
    }

    pub fn unbind(&mut self, key: &str) {
        self.bindings.remove(key);
    }

    /// Follows the source chain of `key` down to a stored value.
    pub fn resolve(&self, key: &str) -> Result<Option<Value>, ParameterError> {
        let mut hops = 0usize;
        self.resolve_inner(key, &mut hops)
    }

    fn resolve_inner(&self, key: &str, hops: &mut usize) -> Result<Option<Value>, ParameterError> {
        if let Some(bound) = self.bindings.get(key) {
            return Ok(Some(bound.clone()));
        }
        *hops += 1;
        if *hops > self.order.len() + 1 {
            return Err(ParameterError::Cycle(key.to_string()));
        }
        let param = self
            .get(key)
            .ok_or_else(|| ParameterError::Unknown(key.to_string()))?;
        match (&param.kind, &param.source) {
            (ParameterKind::Context, Some(source)) => {
                let upstream = self.resolve_inner(source, hops)?;
                Ok(match (&param.field, upstream) {
                    (Some(field), Some(Value::Object(map))) => map.get(field).cloned(),
                    (Some(_), Some(_)) => None,
                    (None, upstream) => upstream,
                    (_, None) => None,
                })
            }
            _ => Ok(self.values.get(key).cloned()),
        }
    }

    /// Every source exists and no chain loops back on itself.
    pub fn validate(&self) -> Result<(), ParameterError> {
        for param in &self.order {
            let mut seen = vec![param.key.as_str()];
            let mut cursor = param.source.as_deref();
            while let Some(source) = cursor {
                if seen.contains(&source) {
                    return Err(ParameterError::Cycle(param.key.clone()));
                }
                let next = self
                    .get(source)
                    .ok_or_else(|| ParameterError::DanglingSource {
                        key: param.key.clone(),
                        source_key: source.to_string(),
                    })?;
                seen.push(source);
                cursor = next.source.as_deref();
            }
        }
        Ok(())
    }
}
