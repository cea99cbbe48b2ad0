use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::block::WorkflowDefinition;
use crate::error::{Result, TaskFlowError};
use crate::model::{TaskRun, Thought, WorkflowRun};

/// Durable store for runs, thoughts and the accreted workflow definition.
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn get_task_run(&self, id: &str) -> Result<Option<TaskRun>>;
    async fn save_task_run(&self, run: &TaskRun) -> Result<()>;
    async fn get_workflow_run(&self, id: &str) -> Result<Option<WorkflowRun>>;
    async fn save_workflow_run(&self, run: &WorkflowRun) -> Result<()>;
    async fn append_thought(&self, thought: &Thought) -> Result<()>;
    async fn update_thought(&self, thought: &Thought) -> Result<()>;
    /// Overwrites the whole stored definition for `workflow_id`.
    async fn save_workflow_definition(
        &self,
        workflow_id: &str,
        definition: &WorkflowDefinition,
    ) -> Result<()>;
}

/// 内存持久化实现
#[derive(Default)]
pub struct MemoryPersistence {
    task_runs: RwLock<HashMap<String, TaskRun>>,
    workflow_runs: RwLock<HashMap<String, WorkflowRun>>,
    thoughts: RwLock<Vec<Thought>>,
    definitions: RwLock<HashMap<String, Vec<WorkflowDefinition>>>,
    status_writes: RwLock<HashMap<String, usize>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn thoughts_for(&self, run_id: &str) -> Vec<Thought> {
        self.thoughts
            .read()
            .iter()
            .filter(|thought| thought.owner.run_id() == run_id)
            .cloned()
            .collect()
    }

    pub fn workflow_runs(&self) -> Vec<WorkflowRun> {
        self.workflow_runs.read().values().cloned().collect()
    }

    /// Every definition revision saved for `workflow_id`, oldest first.
    pub fn definition_revisions(&self, workflow_id: &str) -> Vec<WorkflowDefinition> {
        self.definitions
            .read()
            .get(workflow_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of TaskRun writes seen for `id`.
    pub fn task_run_writes(&self, id: &str) -> usize {
        self.status_writes.read().get(id).copied().unwrap_or_default()
    }
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn get_task_run(&self, id: &str) -> Result<Option<TaskRun>> {
        Ok(self.task_runs.read().get(id).cloned())
    }

    async fn save_task_run(&self, run: &TaskRun) -> Result<()> {
        let mut runs = self.task_runs.write();
        if let Some(stored) = runs.get(&run.id) {
            if stored.status.is_terminal() {
                return Err(TaskFlowError::InvalidTransition {
                    from: stored.status.to_string(),
                    to: run.status.to_string(),
                });
            }
        }
        runs.insert(run.id.clone(), run.clone());
        *self.status_writes.write().entry(run.id.clone()).or_default() += 1;
        Ok(())
    }

    async fn get_workflow_run(&self, id: &str) -> Result<Option<WorkflowRun>> {
        Ok(self.workflow_runs.read().get(id).cloned())
    }

    async fn save_workflow_run(&self, run: &WorkflowRun) -> Result<()> {
        self.workflow_runs
            .write()
            .insert(run.id.clone(), run.clone());
        Ok(())
    }

    async fn append_thought(&self, thought: &Thought) -> Result<()> {
        self.thoughts.write().push(thought.clone());
        Ok(())
    }

    async fn update_thought(&self, thought: &Thought) -> Result<()> {
        let mut thoughts = self.thoughts.write();
        let slot = thoughts
            .iter_mut()
            .find(|stored| stored.id == thought.id)
            .ok_or_else(|| TaskFlowError::NotFound {
                kind: "thought",
                id: thought.id.clone(),
            })?;
        *slot = thought.clone();
        Ok(())
    }

    async fn save_workflow_definition(
        &self,
        workflow_id: &str,
        definition: &WorkflowDefinition,
    ) -> Result<()> {
        self.definitions
            .write()
            .entry(workflow_id.to_string())
            .or_default()
            .push(definition.clone());
        Ok(())
    }
}
