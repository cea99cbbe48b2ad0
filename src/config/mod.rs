// 配置模块：环境变量读取与规划器预算
pub mod env;
pub mod planner;

pub use env::EnvConfig;
pub use planner::PlannerConfig;
