use anyhow::Result;
use rand::Rng;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::domain::{RequestId, Stage};
use crate::workflow::{ResultCode, StageRunReport, WorkflowEngine, WorkflowError};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_retries: retries,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based): doubles each time, capped,
    /// then scaled by a random factor in [0.5, 1.0] when jitter is on.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        let delay = self.base_delay.saturating_mul(factor).min(self.max_delay);
        if self.jitter {
            delay.mul_f64(rand::rng().random_range(0.5..=1.0))
        } else {
            delay
        }
    }
}

pub struct RunStageCommand {
    pub request_id: RequestId,
    pub stage: Stage,
    pub retry: RetryPolicy,
    pub json: bool,
    pub shutdown: CancellationToken,
}

impl RunStageCommand {
    pub fn new(request_id: RequestId, stage: Stage, shutdown: CancellationToken) -> Self {
        Self {
            request_id,
            stage,
            retry: RetryPolicy::default(),
            json: false,
            shutdown,
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retry = RetryPolicy::with_retries(retries);
        self
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    /// Returns the process exit code.
    pub async fn execute(&self, engine: &WorkflowEngine) -> Result<i32> {
        let mut attempt = 0;
        loop {
            let report = engine.run_stage_report(&self.request_id, self.stage).await;
            let retryable = report
                .error
                .as_deref()
                .is_some_and(WorkflowError::is_retryable);

            if !retryable || attempt >= self.retry.max_retries {
                self.print(&report)?;
                return Ok(report.code.as_exit_code());
            }

            let delay = self.retry.delay(attempt);
            attempt += 1;
            warn!(
                request_id = %self.request_id,
                stage = %self.stage,
                attempt,
                max_retries = self.retry.max_retries,
                delay_ms = delay.as_millis() as u64,
                "Retrying stage after execution failure"
            );
            if !self.json {
                println!(
                    "⚠️  {} Retrying in {:.1}s ({}/{})",
                    report.message,
                    delay.as_secs_f64(),
                    attempt,
                    self.retry.max_retries
                );
            }

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.cancelled() => {
                    self.print(&report)?;
                    return Ok(report.code.as_exit_code());
                }
            }
        }
    }

    fn print(&self, report: &StageRunReport) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(report)?);
            return Ok(());
        }

        let icon = match report.code {
            ResultCode::Completed if report.error.is_none() => "✅",
            ResultCode::Completed => "⛔",
            ResultCode::HumanPending => "🙋",
            ResultCode::Fatal => "❌",
        };
        println!("{icon} {} / {}", report.request_id, report.stage);
        println!("   {}", report.message);
        if let Some(status) = report.status {
            println!("   Stage status:   {status}");
        }
        if let Some(overall) = report.overall {
            println!("   Overall status: {overall}");
        }
        Ok(())
    }
}
