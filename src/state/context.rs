use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use crate::error::Result;
use crate::services::BrowserSession;

use super::parameters::{Parameter, ParameterTable};
use super::uploads::UploadTracker;

/// Steps consumed by every block of one run against its ceiling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepBudget {
    pub max: u32,
    pub used: u32,
}

impl StepBudget {
    pub fn new(max: u32) -> Self {
        Self { max, used: 0 }
    }

    pub fn remaining(&self) -> u32 {
        self.max.saturating_sub(self.used)
    }

    pub fn is_exhausted(&self) -> bool {
        self.used >= self.max
    }
}

/// Run-scoped state handed down to the synthesizer and block runner.
///
/// Lives from run start to run cleanup and is never shared across runs.
#[derive(Clone)]
pub struct RunContext {
    task_run_id: String,
    organization_id: String,
    workflow_run_id: String,
    parameters: Arc<RwLock<ParameterTable>>,
    steps: Arc<Mutex<StepBudget>>,
    uploads: UploadTracker,
    browser: Arc<dyn BrowserSession>,
    started_at: Instant,
}

impl RunContext {
    pub fn new(
        task_run_id: impl Into<String>,
        organization_id: impl Into<String>,
        workflow_run_id: impl Into<String>,
        browser: Arc<dyn BrowserSession>,
        max_steps: u32,
    ) -> Self {
        Self {
            task_run_id: task_run_id.into(),
            organization_id: organization_id.into(),
            workflow_run_id: workflow_run_id.into(),
            parameters: Arc::new(RwLock::new(ParameterTable::new())),
            steps: Arc::new(Mutex::new(StepBudget::new(max_steps))),
            uploads: UploadTracker::default(),
            browser,
            started_at: Instant::now(),
        }
    }

    pub fn task_run_id(&self) -> &str {
        &self.task_run_id
    }

    pub fn organization_id(&self) -> &str {
        &self.organization_id
    }

    pub fn workflow_run_id(&self) -> &str {
        &self.workflow_run_id
    }

    pub fn browser(&self) -> Arc<dyn BrowserSession> {
        Arc::clone(&self.browser)
    }

    pub fn uploads(&self) -> &UploadTracker {
        &self.uploads
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn register_parameter(&self, param: Parameter) -> Result<()> {
        self.parameters.write().add(param)?;
        Ok(())
    }

    pub fn set_parameter_value(&self, key: &str, value: Value) -> Result<()> {
        self.parameters.write().set_value(key, value)?;
        Ok(())
    }

    pub fn resolve_parameter(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.parameters.read().resolve(key)?)
    }

    pub fn validate_parameters(&self) -> Result<()> {
        self.parameters.read().validate()?;
        Ok(())
    }

    pub fn parameter(&self, key: &str) -> Option<Parameter> {
        self.parameters.read().get(key).cloned()
    }

    /// Context parameters that alias `source` directly.
    pub fn dependents_of(&self, source: &str) -> Vec<String> {
        self.parameters
            .read()
            .parameters()
            .iter()
            .filter(|param| param.source.as_deref() == Some(source))
            .map(|param| param.key.clone())
            .collect()
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters.read().len()
    }

    /// Pins `key` to `value` until the returned guard drops.
    pub fn bind_iteration(&self, key: &str, value: Value) -> Result<IterationBinding> {
        self.parameters.write().bind(key, value)?;
        Ok(IterationBinding {
            parameters: Arc::clone(&self.parameters),
            key: key.to_string(),
        })
    }

    pub fn steps(&self) -> StepBudget {
        *self.steps.lock()
    }

    /// Records steps spent by a block and returns the updated budget.
    pub fn consume_steps(&self, steps: u32) -> StepBudget {
        let mut budget = self.steps.lock();
        budget.used = budget.used.saturating_add(steps);
        *budget
    }

    /// Drops values and bindings held for this run.
    pub fn reset(&self) {
        *self.parameters.write() = ParameterTable::new();
    }
}

/// Scoped iteration value; unbinds on drop.
pub struct IterationBinding {
    parameters: Arc<RwLock<ParameterTable>>,
    key: String,
}

impl IterationBinding {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for IterationBinding {
    fn drop(&mut self) {
        self.parameters.write().unbind(&self.key);
    }
}
