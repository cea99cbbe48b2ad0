use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;
use crate::model::{TaskRun, Thought, ThoughtDraft, ThoughtOwner};
use crate::services::Persistence;

/// Run identity plus the sinks a planning loop writes into.
///
/// The controller is generic over this so the task-v2 and observer call
/// sites share one loop.
#[async_trait]
pub trait RunChannel: Send + Sync {
    fn flavor(&self) -> &'static str;

    fn owner(&self, run_id: &str) -> ThoughtOwner;

    async fn record_thought(&self, run_id: &str, draft: ThoughtDraft) -> Result<Thought>;

    async fn update_thought(&self, thought: &Thought) -> Result<()>;

    async fn write_status(&self, run: &TaskRun) -> Result<()>;
}

async fn append(
    persistence: &dyn Persistence,
    owner: ThoughtOwner,
    draft: ThoughtDraft,
) -> Result<Thought> {
    let thought = Thought::from_draft(owner, draft);
    persistence.append_thought(&thought).await?;
    debug!(thought_id = %thought.id, scenario = ?thought.scenario, "thought recorded");
    Ok(thought)
}

/// Task-v2 runs.
#[derive(Clone)]
pub struct TaskV2Channel {
    persistence: Arc<dyn Persistence>,
}

impl TaskV2Channel {
    pub fn new(persistence: Arc<dyn Persistence>) -> Self {
        Self { persistence }
    }
}

#[async_trait]
impl RunChannel for TaskV2Channel {
    fn flavor(&self) -> &'static str {
        "task_v2"
    }

    fn owner(&self, run_id: &str) -> ThoughtOwner {
        ThoughtOwner::TaskV2(run_id.to_string())
    }

    async fn record_thought(&self, run_id: &str, draft: ThoughtDraft) -> Result<Thought> {
        append(self.persistence.as_ref(), self.owner(run_id), draft).await
    }

    async fn update_thought(&self, thought: &Thought) -> Result<()> {
        self.persistence.update_thought(thought).await
    }

    async fn write_status(&self, run: &TaskRun) -> Result<()> {
        self.persistence.save_task_run(run).await
    }
}

/// Observer cruises: same loop, thoughts filed under the cruise.
#[derive(Clone)]
pub struct ObserverChannel {
    persistence: Arc<dyn Persistence>,
}

impl ObserverChannel {
    pub fn new(persistence: Arc<dyn Persistence>) -> Self {
        Self { persistence }
    }
}

#[async_trait]
impl RunChannel for ObserverChannel {
    fn flavor(&self) -> &'static str {
        "observer_cruise"
    }

    fn owner(&self, run_id: &str) -> ThoughtOwner {
        ThoughtOwner::ObserverCruise(run_id.to_string())
    }

    async fn record_thought(&self, run_id: &str, draft: ThoughtDraft) -> Result<Thought> {
        append(self.persistence.as_ref(), self.owner(run_id), draft).await
    }

    async fn update_thought(&self, thought: &Thought) -> Result<()> {
        self.persistence.update_thought(thought).await
    }

    async fn write_status(&self, run: &TaskRun) -> Result<()> {
        self.persistence.save_task_run(run).await
    }
}
