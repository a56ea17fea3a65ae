use std::fmt;
use thiserror::Error;

use crate::domain::{Stage, StageStatus};
use crate::stages::GateDecision;

/// Things that happen to a single stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageEvent {
    Start,
    /// Gate attempted without the driver's licence on file.
    DocumentMissing,
    Decided(GateDecision),
    Completed,
    HumanRequired,
    Failed,
    Interrupted,
    DocumentReceived,
}

impl fmt::Display for StageEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageEvent::Start => f.write_str("start"),
            StageEvent::DocumentMissing => f.write_str("document missing"),
            StageEvent::Decided(GateDecision::Apto) => f.write_str("decided apto"),
            StageEvent::Decided(GateDecision::NaoApto) => f.write_str("decided nao apto"),
            StageEvent::Completed => f.write_str("completed"),
            StageEvent::HumanRequired => f.write_str("human required"),
            StageEvent::Failed => f.write_str("failed"),
            StageEvent::Interrupted => f.write_str("interrupted"),
            StageEvent::DocumentReceived => f.write_str("document received"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("{stage} already finished with status '{status}'")]
    AlreadyFinished { stage: Stage, status: StageStatus },

    #[error("{stage} is already running")]
    AlreadyRunning { stage: Stage },

    #[error("invalid transition for {stage}: '{from}' on {event}")]
    InvalidTransition {
        stage: Stage,
        from: StageStatus,
        event: StageEvent,
    },
}

fn guard_start(stage: Stage, from: StageStatus) -> Result<(), TransitionError> {
    if from.is_finished() {
        return Err(TransitionError::AlreadyFinished { stage, status: from });
    }
    if from == StageStatus::Running {
        return Err(TransitionError::AlreadyRunning { stage });
    }
    Ok(())
}

/// Next status for `stage` given its current status and an event.
pub fn transition(
    stage: Stage,
    from: StageStatus,
    event: &StageEvent,
) -> Result<StageStatus, TransitionError> {
    let invalid = || TransitionError::InvalidTransition {
        stage,
        from,
        event: *event,
    };

    match event {
        StageEvent::Start => {
            guard_start(stage, from)?;
            Ok(StageStatus::Running)
        }
        StageEvent::DocumentMissing => {
            if !stage.is_gate() {
                return Err(invalid());
            }
            guard_start(stage, from)?;
            Ok(StageStatus::BlockedDocument)
        }
        StageEvent::DocumentReceived => match from {
            StageStatus::BlockedDocument => Ok(StageStatus::Awaiting),
            other => Ok(other),
        },
        _ if from != StageStatus::Running => Err(invalid()),
        StageEvent::Decided(decision) => {
            if !stage.is_gate() {
                return Err(invalid());
            }
            Ok(match decision {
                GateDecision::Apto => StageStatus::Apto,
                GateDecision::NaoApto => StageStatus::NaoApto,
            })
        }
        StageEvent::Completed => {
            if stage.is_gate() {
                return Err(invalid());
            }
            Ok(StageStatus::Completed)
        }
        StageEvent::HumanRequired => Ok(StageStatus::PendingHuman),
        StageEvent::Failed | StageEvent::Interrupted => Ok(StageStatus::Error),
    }
}
