// 运行状态模块：参数表、运行上下文与上传跟踪

mod context;
mod parameters;
mod uploads;

pub use context::{IterationBinding, RunContext, StepBudget};
pub use parameters::{Parameter, ParameterError, ParameterKind, ParameterTable};
pub use uploads::{DrainReport, UploadTracker};
