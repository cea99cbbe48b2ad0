pub mod block;
pub mod cli;
pub mod config;
pub mod error;
pub mod llm;
pub mod model;
pub mod planner;
pub mod schema;
pub mod services;
pub mod state;
pub mod utils;

pub use block::{
    handle_block_result, Block, BlockKind, BlockResult, BlockRunner, BlockStatus, BlockUrl,
    DefinitionFragment, Outcome, RunFailure, WorkflowDefinition, WorkflowDefinitionBuilder,
};
pub use config::{EnvConfig, PlannerConfig};
pub use error::{Result, TaskFlowError};
pub use llm::{DynLlmClient, LlmClient, LlmRequest, LlmResponse, ScriptedLlmClient};
#[cfg(feature = "openai-client")]
pub use llm::OpenAiClient;
pub use model::{
    RunStatus, TaskRequest, TaskRun, Thought, ThoughtOwner, ThoughtScenario, ThoughtType,
    TotpConfig, WorkflowRun,
};
pub use planner::{
    initialize_task_run, ObserverChannel, PlannerServices, PlanningLoop, RunChannel,
    TaskV2Channel, TaskType,
};
pub use schema::{Schema, SchemaError, SchemaKind};
pub use state::{Parameter, ParameterKind, ParameterTable, RunContext};
pub use utils::{logging, validation};
