use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::client::LlmClient;
use super::types::{LlmRequest, LlmResponse};
use crate::error::{Result, TaskFlowError};

/// Replays queued answers per prompt name; records every request.
#[derive(Default)]
pub struct ScriptedLlmClient {
    answers: Mutex<HashMap<String, VecDeque<Value>>>,
    calls: Mutex<Vec<LlmRequest>>,
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, prompt_name: &str, answer: Value) -> &Self {
        self.answers
            .lock()
            .entry(prompt_name.to_string())
            .or_default()
            .push_back(answer);
        self
    }

    pub fn calls(&self) -> Vec<LlmRequest> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, prompt_name: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|request| request.prompt_name() == prompt_name)
            .count()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let name = request.prompt_name().to_string();
        self.calls.lock().push(request);
        let answer = self
            .answers
            .lock()
            .get_mut(&name)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| TaskFlowError::Llm(format!("no scripted answer for `{name}`")))?;
        Ok(LlmResponse {
            content: answer,
            metadata: None,
        })
    }
}
