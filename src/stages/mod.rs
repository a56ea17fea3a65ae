//! Stage executors: one per external system.
//!
//! Executors classify every failure before returning. The workflow engine
//! trusts that classification and only adds its own gating checks on top.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::domain::{RequestSnapshot, Stage, StageStatus};

pub mod command;
pub mod downstream;
pub mod gate;

pub use crate::automation::Decision as GateDecision;
pub use command::{CommandError, CommandInvocation, CommandOutput, CommandRunner, ProcessCommandRunner};
pub use downstream::{IntegrationCommand, IntegrationCommandExecutor};
pub use gate::{BrowserGateExecutor, GateTimeouts};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Something the executor needs is missing (configuration, data).
    Precondition,
    /// Field plan did not match the page, or the page was unexpected.
    PageStructure,
    ReadinessTimeout,
    /// The external system rejected the operation.
    Integration,
    /// Driver, process spawn or profile trouble on our side.
    Infrastructure,
    /// Deadline or shutdown reached mid-execution.
    Interrupted,
}

impl FailureKind {
    /// Execution errors an operator may retry automatically.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            FailureKind::PageStructure | FailureKind::ReadinessTimeout | FailureKind::Integration
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::Precondition => "precondition",
            FailureKind::PageStructure => "page structure",
            FailureKind::ReadinessTimeout => "readiness timeout",
            FailureKind::Integration => "integration",
            FailureKind::Infrastructure => "infrastructure",
            FailureKind::Interrupted => "interrupted",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// Gate executors always carry a decision; downstream ones never do.
    Success { decision: Option<GateDecision> },
    Failure { kind: FailureKind, reason: String },
    HumanInterventionRequired { reason: String },
}

impl StageOutcome {
    pub fn success() -> Self {
        StageOutcome::Success { decision: None }
    }

    pub fn decided(decision: GateDecision) -> Self {
        StageOutcome::Success {
            decision: Some(decision),
        }
    }

    pub fn failure(kind: FailureKind, reason: impl Into<String>) -> Self {
        StageOutcome::Failure {
            kind,
            reason: reason.into(),
        }
    }

    pub fn human(reason: impl Into<String>) -> Self {
        StageOutcome::HumanInterventionRequired {
            reason: reason.into(),
        }
    }
}

/// Per-attempt context handed to an executor.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub attempt_id: String,
    pub correlation_id: String,
    /// Stage status before this attempt was marked running.
    pub previous_status: StageStatus,
    pub cancel: CancellationToken,
}

impl ExecutionContext {
    pub fn is_resume(&self) -> bool {
        self.previous_status == StageStatus::PendingHuman
    }
}

#[async_trait]
pub trait StageExecutor: Send + Sync {
    fn stage(&self) -> Stage;

    async fn execute(&self, request: &RequestSnapshot, ctx: &ExecutionContext) -> StageOutcome;
}

/// Maps each stage to its executor.
#[derive(Default, Clone)]
pub struct ExecutorRegistry {
    executors: HashMap<Stage, Arc<dyn StageExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under the executor's own stage, replacing any previous one.
    pub fn register(&mut self, executor: Arc<dyn StageExecutor>) -> &mut Self {
        self.executors.insert(executor.stage(), executor);
        self
    }

    pub fn with(mut self, executor: Arc<dyn StageExecutor>) -> Self {
        self.register(executor);
        self
    }

    pub fn get(&self, stage: Stage) -> Option<Arc<dyn StageExecutor>> {
        self.executors.get(&stage).cloned()
    }

    pub fn missing(&self) -> Vec<Stage> {
        Stage::ALL
            .into_iter()
            .filter(|s| !self.executors.contains_key(s))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Stage);

    #[async_trait]
    impl StageExecutor for Fixed {
        fn stage(&self) -> Stage {
            self.0
        }

        async fn execute(&self, _: &RequestSnapshot, _: &ExecutionContext) -> StageOutcome {
            StageOutcome::success()
        }
    }

    #[test]
    fn registry_reports_missing_stages() {
        let registry = ExecutorRegistry::new()
            .with(Arc::new(Fixed(Stage::BrasilRisk)))
            .with(Arc::new(Fixed(Stage::Bringg)));
        assert!(registry.get(Stage::BrasilRisk).is_some());
        assert_eq!(registry.missing(), vec![Stage::RlogCielo, Stage::RlogGeral]);
    }

    #[test]
    fn only_execution_errors_are_retryable() {
        assert!(FailureKind::Integration.is_retryable());
        assert!(FailureKind::ReadinessTimeout.is_retryable());
        assert!(!FailureKind::Precondition.is_retryable());
        assert!(!FailureKind::Interrupted.is_retryable());
    }
}
