// 区块模型、执行结果状态机与工作流定义

mod definition;
mod handler;
mod model;
mod outcome;
mod result;
mod runner;

pub use definition::{DefinitionFragment, WorkflowDefinition, WorkflowDefinitionBuilder};
pub use handler::handle_block_result;
pub use model::{Block, BlockKind, BlockUrl};
pub use outcome::{Outcome, RunFailure};
pub use result::{BlockResult, BlockStatus};
pub use runner::BlockRunner;
