use thiserror::Error;

use crate::schema::SchemaError;
use crate::state::ParameterError;

pub type Result<T> = std::result::Result<T, TaskFlowError>;

#[derive(Debug, Error)]
pub enum TaskFlowError {
    #[error("setup failed: {0}")]
    Setup(String),
    #[error("invalid transition from `{from}` to `{to}`")]
    InvalidTransition { from: String, to: String },
    #[error("{kind} `{id}` not found")]
    NotFound { kind: &'static str, id: String },
    #[error("reasoning model error: {0}")]
    Llm(String),
    #[error("page observation failed: {0}")]
    Observation(String),
    #[error("block execution failed: {0}")]
    Execution(String),
    /// A collaborator found the run cannot be attempted at all.
    #[error("run terminated: {0}")]
    Terminated(String),
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("webhook error: {0}")]
    Webhook(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Parameter(#[from] ParameterError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<serde_json::Error> for TaskFlowError {
    fn from(error: serde_json::Error) -> Self {
        TaskFlowError::Serialization(error.to_string())
    }
}

impl From<serde_yaml::Error> for TaskFlowError {
    fn from(error: serde_yaml::Error) -> Self {
        TaskFlowError::Serialization(error.to_string())
    }
}
