use serde::Serialize;
use serde_json::Value;

use crate::block::{BlockResult, BlockStatus};

use super::decision::TaskType;

/// One prompt-visible entry of the run's short-term memory.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct TaskHistoryRecord {
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub plan: String,
    pub status: BlockStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loop_values: Option<Vec<Value>>,
}

impl TaskHistoryRecord {
    pub fn from_result(task_type: TaskType, plan: impl Into<String>, result: &BlockResult) -> Self {
        let extracted_data = match task_type {
            TaskType::Extract => result.output.as_ref().map(extracted_payload),
            TaskType::Loop => result.output.as_ref().map(unnest_loop_output),
            TaskType::GotoUrl | TaskType::Navigate => None,
        };
        Self {
            task_type,
            plan: plan.into(),
            status: result.status,
            failure_reason: result.failure_reason.clone(),
            extracted_data,
            loop_values: None,
        }
    }

    pub fn with_loop_values(mut self, values: Vec<Value>) -> Self {
        self.loop_values = Some(values);
        self
    }
}

/// The `extracted_information` an executor wraps its output in, or the
/// output itself when it is not wrapped.
pub fn extracted_payload(output: &Value) -> Value {
    match output {
        Value::Object(map) => map
            .get("extracted_information")
            .cloned()
            .unwrap_or_else(|| output.clone()),
        other => other.clone(),
    }
}

/// Flattens the list-of-lists a for-loop produces into one list of extracted
/// items, preferring each item's `extracted_information` field.
pub fn unnest_loop_output(output: &Value) -> Value {
    let Value::Array(iterations) = output else {
        return output.clone();
    };
    let mut items = Vec::new();
    for iteration in iterations {
        let inner = match iteration {
            Value::Array(inner) => inner.as_slice(),
            other => std::slice::from_ref(other),
        };
        for item in inner {
            match item {
                Value::Null => {}
                Value::Object(map) if map.contains_key("extracted_information") => {
                    if let Some(extracted) = map.get("extracted_information") {
                        if !extracted.is_null() {
                            items.push(extracted.clone());
                        }
                    }
                }
                other => items.push(other.clone()),
            }
        }
    }
    Value::Array(items)
}

/// Ordered history fed back into every planning prompt.
#[derive(Clone, Debug, Default)]
pub struct TaskHistory {
    records: Vec<TaskHistoryRecord>,
}

impl TaskHistory {
    pub fn push(&mut self, record: TaskHistoryRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[TaskHistoryRecord] {
        &self.records
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(&self.records).unwrap_or(Value::Array(Vec::new()))
    }
}
