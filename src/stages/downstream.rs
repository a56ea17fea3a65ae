//! Downstream stages backed by an external integration command.
//!
//! Protocol: the request snapshot is written as JSON to stdin. Exit 0 is
//! success, exit 2 asks for human intervention (last stdout line is the
//! reason), anything else is an integration failure.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::command::{CommandError, CommandInvocation, CommandRunner};
use super::{ExecutionContext, FailureKind, StageExecutor, StageOutcome};
use crate::domain::{RequestSnapshot, Stage};

const HUMAN_EXIT_CODE: i32 = 2;
const STDERR_TAIL_LINES: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_timeout_seconds() -> u64 {
    300
}

pub struct IntegrationCommandExecutor {
    stage: Stage,
    command: Option<IntegrationCommand>,
    runner: Arc<dyn CommandRunner>,
}

impl IntegrationCommandExecutor {
    pub fn new(stage: Stage, command: Option<IntegrationCommand>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            stage,
            command,
            runner,
        }
    }
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).filter(|l| !l.is_empty()).last()
}

fn tail(text: &str, lines: usize) -> String {
    let kept: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    kept[kept.len().saturating_sub(lines)..].join(" | ")
}

#[async_trait]
impl StageExecutor for IntegrationCommandExecutor {
    fn stage(&self) -> Stage {
        self.stage
    }

    async fn execute(&self, request: &RequestSnapshot, ctx: &ExecutionContext) -> StageOutcome {
        let Some(command) = &self.command else {
            return StageOutcome::failure(FailureKind::Precondition, "integration not configured");
        };

        let stdin = match serde_json::to_vec(request) {
            Ok(bytes) => bytes,
            Err(e) => {
                return StageOutcome::failure(
                    FailureKind::Precondition,
                    format!("request snapshot not serializable: {e}"),
                )
            }
        };

        let mut env = vec![
            ("ONBOARDING_STAGE".to_string(), self.stage.slug().to_string()),
            ("ONBOARDING_REQUEST_ID".to_string(), request.id.to_string()),
            ("ONBOARDING_ATTEMPT_ID".to_string(), ctx.attempt_id.clone()),
        ];
        if ctx.is_resume() {
            env.push(("ONBOARDING_RESUME".to_string(), "1".to_string()));
        }

        let invocation = CommandInvocation {
            program: command.program.clone(),
            args: command.args.clone(),
            env,
            stdin,
            timeout: Duration::from_secs(command.timeout_seconds),
            cancel: ctx.cancel.clone(),
        };

        info!(
            stage = %self.stage,
            program = %command.program,
            resume = ctx.is_resume(),
            "Running integration command"
        );

        let output = match self.runner.run(&invocation).await {
            Ok(output) => output,
            Err(CommandError::Cancelled) => {
                return StageOutcome::failure(FailureKind::Interrupted, "integration command cancelled")
            }
            Err(e @ CommandError::Timeout { .. }) => {
                return StageOutcome::failure(FailureKind::Integration, e.to_string())
            }
            Err(e) => return StageOutcome::failure(FailureKind::Infrastructure, e.to_string()),
        };

        match output.status_code {
            0 => StageOutcome::success(),
            HUMAN_EXIT_CODE => StageOutcome::human(
                last_line(&output.stdout).unwrap_or("integration requested human intervention"),
            ),
            code => {
                warn!(stage = %self.stage, exit_code = code, "Integration command failed");
                let stderr = tail(&output.stderr, STDERR_TAIL_LINES);
                let reason = if stderr.is_empty() {
                    format!("integration exited with code {code}")
                } else {
                    format!("integration exited with code {code}: {stderr}")
                };
                StageOutcome::failure(FailureKind::Integration, reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Applicant, CourierRole, NewRequest, RequestId, RequestKind, StageStatus};
    use crate::stages::CommandOutput;
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    struct Scripted {
        result: Result<CommandOutput, CommandError>,
        seen: Mutex<Vec<CommandInvocation>>,
    }

    impl Scripted {
        fn exit(code: i32, stdout: &str, stderr: &str) -> Arc<Self> {
            Arc::new(Self {
                result: Ok(CommandOutput {
                    status_code: code,
                    stdout: stdout.to_string(),
                    stderr: stderr.to_string(),
                }),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CommandRunner for Scripted {
        async fn run(&self, invocation: &CommandInvocation) -> Result<CommandOutput, CommandError> {
            self.seen.lock().unwrap().push(invocation.clone());
            self.result.clone()
        }
    }

    fn snapshot() -> RequestSnapshot {
        NewRequest {
            kind: RequestKind::RegistrationWithoutVehicle,
            role: CourierRole::Driver,
            applicant: Applicant {
                document_number: "12345678901".into(),
                display_name: "Maria".into(),
                canonical_name: None,
            },
            requester_name: None,
            requester_org: None,
            document_received: true,
            payload: serde_json::json!({}),
            vehicle: None,
        }
        .into_snapshot(RequestId::generate(), chrono::Utc::now())
        .0
    }

    fn ctx(previous_status: StageStatus) -> ExecutionContext {
        ExecutionContext {
            attempt_id: "attempt-1".into(),
            correlation_id: "corr-1".into(),
            previous_status,
            cancel: CancellationToken::new(),
        }
    }

    fn executor(runner: Arc<Scripted>) -> IntegrationCommandExecutor {
        IntegrationCommandExecutor::new(
            Stage::RlogCielo,
            Some(IntegrationCommand {
                program: "rlog-cielo-sync".into(),
                args: vec!["--push".into()],
                timeout_seconds: 10,
            }),
            runner,
        )
    }

    #[tokio::test]
    async fn exit_zero_is_success() {
        let runner = Scripted::exit(0, "ok\n", "");
        let outcome = executor(runner.clone())
            .execute(&snapshot(), &ctx(StageStatus::Awaiting))
            .await;
        assert_eq!(outcome, StageOutcome::success());

        let seen = runner.seen.lock().unwrap();
        assert!(!seen[0].env.iter().any(|(k, _)| k == "ONBOARDING_RESUME"));
        let body: serde_json::Value = serde_json::from_slice(&seen[0].stdin).unwrap();
        assert_eq!(body["applicant"]["document_number"], "12345678901");
    }

    #[tokio::test]
    async fn exit_two_requests_human_with_last_stdout_line() {
        let runner = Scripted::exit(2, "working\nconfirm the token in the portal\n\n", "");
        let outcome = executor(runner)
            .execute(&snapshot(), &ctx(StageStatus::Awaiting))
            .await;
        assert_eq!(outcome, StageOutcome::human("confirm the token in the portal"));
    }

    #[tokio::test]
    async fn other_exit_is_integration_failure_with_stderr_tail() {
        let runner = Scripted::exit(1, "", "a\nb\nc\nd\n");
        let outcome = executor(runner)
            .execute(&snapshot(), &ctx(StageStatus::Awaiting))
            .await;
        assert_eq!(
            outcome,
            StageOutcome::failure(FailureKind::Integration, "integration exited with code 1: b | c | d")
        );
    }

    #[tokio::test]
    async fn resume_sets_flag() {
        let runner = Scripted::exit(0, "", "");
        executor(runner.clone())
            .execute(&snapshot(), &ctx(StageStatus::PendingHuman))
            .await;
        let seen = runner.seen.lock().unwrap();
        assert!(seen[0]
            .env
            .contains(&("ONBOARDING_RESUME".to_string(), "1".to_string())));
    }

    #[tokio::test]
    async fn unconfigured_stage_is_precondition_failure() {
        let executor =
            IntegrationCommandExecutor::new(Stage::Bringg, None, Scripted::exit(0, "", ""));
        let outcome = executor.execute(&snapshot(), &ctx(StageStatus::Awaiting)).await;
        assert!(matches!(
            outcome,
            StageOutcome::Failure {
                kind: FailureKind::Precondition,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn spawn_failure_is_infrastructure() {
        let runner = Arc::new(Scripted {
            result: Err(CommandError::CommandNotFound {
                command: "rlog-cielo-sync".into(),
            }),
            seen: Mutex::new(Vec::new()),
        });
        let outcome = executor(runner)
            .execute(&snapshot(), &ctx(StageStatus::Awaiting))
            .await;
        assert!(matches!(
            outcome,
            StageOutcome::Failure {
                kind: FailureKind::Infrastructure,
                ..
            }
        ));
    }
}
