mod status;
mod task_run;
mod thought;
mod workflow_run;

pub use status::RunStatus;
pub use task_run::{TaskRequest, TaskRun, TotpConfig};
pub use thought::{Thought, ThoughtDraft, ThoughtOwner, ThoughtScenario, ThoughtType};
pub use workflow_run::WorkflowRun;

/// Prefixed, sortable-enough identifier (`tsk_…`, `wr_…`).
pub fn new_id(prefix: &str) -> String {
    format!("{prefix}_{}", uuid::Uuid::new_v4().simple())
}
