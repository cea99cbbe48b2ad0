// 规划循环：观察、决策、构建区块、执行、记录

mod channel;
mod controller;
mod decision;
mod history;
mod init;
mod lifecycle;
mod summarizer;
mod synthesizer;

pub use channel::{ObserverChannel, RunChannel, TaskV2Channel};
pub use controller::{PlannerServices, PlanningLoop};
pub use decision::{
    CompletionVerdict, ExtractionTask, InnerTaskDraft, LoopDiscovery, PlannerDecision, RunMetadata,
    RunSummary, TaskType,
};
pub use history::{unnest_loop_output, TaskHistory, TaskHistoryRecord};
pub use init::initialize_task_run;
pub use lifecycle::RunLifecycle;
pub use summarizer::CompletionSummarizer;
pub use synthesizer::{validate_discovery, BlockSynthesizer, SynthesisRequest, Synthesized};
