use crate::error::TaskFlowError;
use crate::model::RunStatus;

/// Why a run has to stop, and the terminal status it stops in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunFailure {
    pub status: RunStatus,
    pub reason: String,
}

impl RunFailure {
    /// Budget exhausted or plan unusable.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Failed,
            reason: reason.into(),
        }
    }

    /// A precondition made the run impossible to attempt.
    pub fn terminated(reason: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Terminated,
            reason: reason.into(),
        }
    }

    /// Failure for an error that escaped the run. Termination signals keep
    /// their own status and reason; anything else is operational.
    pub fn from_error(error: &TaskFlowError) -> Self {
        match error {
            TaskFlowError::Terminated(reason) => Self::terminated(reason.clone()),
            other => Self::failed(other.to_string()),
        }
    }

    pub fn timed_out(reason: impl Into<String>) -> Self {
        Self {
            status: RunStatus::TimedOut,
            reason: reason.into(),
        }
    }
}

/// Tagged result passed between synthesizer, result handler and controller.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome<T> {
    Success(T),
    RetryableFailure(String),
    TerminalFailure(RunFailure),
    Canceled,
}

impl<T> Outcome<T> {
    pub fn map<U>(self, apply: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Success(value) => Outcome::Success(apply(value)),
            Outcome::RetryableFailure(reason) => Outcome::RetryableFailure(reason),
            Outcome::TerminalFailure(failure) => Outcome::TerminalFailure(failure),
            Outcome::Canceled => Outcome::Canceled,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}
