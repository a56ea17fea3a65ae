use thiserror::Error;

use super::lifecycle::TransitionError;
use crate::domain::{RequestId, Stage, StageStatus};
use crate::stages::FailureKind;
use crate::store::StoreError;

/// Result code reported to operators and used as the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultCode {
    /// Completed, or refused for an expected reason.
    Completed,
    Fatal,
    HumanPending,
}

impl ResultCode {
    pub fn as_exit_code(self) -> i32 {
        match self {
            ResultCode::Completed => 0,
            ResultCode::Fatal => 1,
            ResultCode::HumanPending => 2,
        }
    }
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("request {0} not found")]
    NotFound(RequestId),

    #[error("gate has not approved this request (gate status '{gate_status}')")]
    GateNotSatisfied { gate_status: StageStatus },

    #[error("driver's licence (CNH) not received; gate blocked")]
    DocumentMissing,

    #[error("{stage} already finished with status '{status}'")]
    AlreadyFinished { stage: Stage, status: StageStatus },

    #[error("{stage} is already running")]
    AlreadyRunning { stage: Stage },

    #[error("{stage} failed ({kind}): {reason}")]
    ExecutorFailed {
        stage: Stage,
        kind: FailureKind,
        reason: String,
    },

    #[error(transparent)]
    StoreUnavailable(StoreError),

    #[error("{stage} execution cancelled")]
    Cancelled { stage: Stage },

    #[error("no executor registered for {stage}")]
    ExecutorMissing { stage: Stage },

    #[error("{0}")]
    Lifecycle(TransitionError),
}

impl WorkflowError {
    pub fn result_code(&self) -> ResultCode {
        match self {
            WorkflowError::NotFound(_)
            | WorkflowError::GateNotSatisfied { .. }
            | WorkflowError::DocumentMissing
            | WorkflowError::AlreadyFinished { .. }
            | WorkflowError::AlreadyRunning { .. } => ResultCode::Completed,
            WorkflowError::ExecutorFailed { .. }
            | WorkflowError::StoreUnavailable(_)
            | WorkflowError::Cancelled { .. }
            | WorkflowError::ExecutorMissing { .. }
            | WorkflowError::Lifecycle(_) => ResultCode::Fatal,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.result_code().as_exit_code()
    }

    /// Precondition refusals are never retried automatically.
    pub fn is_precondition(&self) -> bool {
        self.result_code() == ResultCode::Completed
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, WorkflowError::ExecutorFailed { kind, .. } if kind.is_retryable())
    }

    /// Operator guidance shown next to the error.
    pub fn remediation(&self) -> &'static str {
        match self {
            WorkflowError::NotFound(_) => "Check the request id with `courier-onboarding list`.",
            WorkflowError::GateNotSatisfied { .. } => {
                "Run the brasil_risk stage first; downstream stages need an 'Apto' decision."
            }
            WorkflowError::DocumentMissing => {
                "Collect the driver's CNH, then run `courier-onboarding mark-document` and retry."
            }
            WorkflowError::AlreadyFinished { .. } => "Nothing to do; the stage already finished.",
            WorkflowError::AlreadyRunning { .. } => {
                "Wait for the running attempt, or run `courier-onboarding sweep` if it was abandoned."
            }
            WorkflowError::ExecutorFailed { .. } => {
                "Inspect the request events, fix the cause and run the stage again."
            }
            WorkflowError::StoreUnavailable(_) => {
                "Check the database path and permissions; no stage status was changed."
            }
            WorkflowError::Cancelled { .. } => "The stage was interrupted; run it again.",
            WorkflowError::ExecutorMissing { .. } => {
                "Configure the stage under [integrations] in courier-onboarding.toml."
            }
            WorkflowError::Lifecycle(_) => "Inspect the request events; the stored status is inconsistent.",
        }
    }
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => WorkflowError::NotFound(id),
            other => WorkflowError::StoreUnavailable(other),
        }
    }
}

impl From<TransitionError> for WorkflowError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::AlreadyFinished { stage, status } => {
                WorkflowError::AlreadyFinished { stage, status }
            }
            TransitionError::AlreadyRunning { stage } => WorkflowError::AlreadyRunning { stage },
            other => WorkflowError::Lifecycle(other),
        }
    }
}
