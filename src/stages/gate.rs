//! Gate stage: drives the Brasil Risk driver-registration page.
//!
//! Everything before submission is free of external side effects, so an
//! attempt that stops for human intervention can simply be re-run.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::{ExecutionContext, FailureKind, GateDecision, StageExecutor, StageOutcome};
use crate::automation::{
    AutomationError, AutomationSession, BrowserProfile, DriverLauncher, FieldDraft, FieldPlan,
    SessionSettings,
};
use crate::domain::{RequestSnapshot, Stage};

#[derive(Debug, Clone, Copy)]
pub struct GateTimeouts {
    pub interception: Duration,
    pub readiness: Duration,
}

impl Default for GateTimeouts {
    fn default() -> Self {
        Self {
            interception: Duration::from_secs(600),
            readiness: Duration::from_secs(60),
        }
    }
}

pub struct BrowserGateExecutor {
    launcher: Arc<dyn DriverLauncher>,
    profile: BrowserProfile,
    settings: Arc<SessionSettings>,
    plan: Arc<FieldPlan>,
    timeouts: GateTimeouts,
    headless: bool,
}

impl BrowserGateExecutor {
    pub fn new(
        launcher: Arc<dyn DriverLauncher>,
        profile: BrowserProfile,
        settings: SessionSettings,
        plan: FieldPlan,
        timeouts: GateTimeouts,
        headless: bool,
    ) -> Self {
        Self {
            launcher,
            profile,
            settings: Arc::new(settings),
            plan: Arc::new(plan),
            timeouts,
            headless,
        }
    }

    async fn drive(
        &self,
        session: &mut AutomationSession,
        draft: &FieldDraft,
        submit_selector: &str,
    ) -> Result<GateDecision, AutomationError> {
        session.open_target().await?;
        session
            .await_interception_clear(self.timeouts.interception)
            .await?;
        session.await_target_ready(self.timeouts.readiness).await?;
        session.fill_fields(draft).await?;
        session.submit(submit_selector).await?;
        session.inspect_decision(&self.plan.decisions).await
    }
}

fn classify(error: AutomationError) -> StageOutcome {
    match error {
        AutomationError::HumanStepRequired(reason) => StageOutcome::human(reason),
        e @ AutomationError::ReadinessTimeout(_) => {
            StageOutcome::failure(FailureKind::ReadinessTimeout, e.to_string())
        }
        e @ (AutomationError::PageStructure(_) | AutomationError::FieldPlan(_)) => {
            StageOutcome::failure(FailureKind::PageStructure, e.to_string())
        }
        e @ (AutomationError::Driver(_)
        | AutomationError::Profile(_)
        | AutomationError::ProfileLocked(_)) => {
            StageOutcome::failure(FailureKind::Infrastructure, e.to_string())
        }
        AutomationError::Cancelled => {
            StageOutcome::failure(FailureKind::Interrupted, "gate automation cancelled")
        }
    }
}

#[async_trait]
impl StageExecutor for BrowserGateExecutor {
    fn stage(&self) -> Stage {
        Stage::BrasilRisk
    }

    async fn execute(&self, request: &RequestSnapshot, ctx: &ExecutionContext) -> StageOutcome {
        let Some(submit_selector) = self.plan.submit_selector.as_deref() else {
            return StageOutcome::failure(
                FailureKind::Precondition,
                "field plan has no submit_selector",
            );
        };

        // Resolve before touching the browser: a bad plan costs nothing.
        let draft = match self.plan.resolve(request) {
            Ok(draft) => draft,
            Err(e) => return StageOutcome::failure(FailureKind::PageStructure, e.to_string()),
        };

        if ctx.is_resume() {
            info!(attempt_id = %ctx.attempt_id, "Resuming gate after human intervention");
        }

        let mut lock = match self.profile.open_lock() {
            Ok(lock) => lock,
            Err(e) => return classify(e),
        };
        let _guard = match lock.try_write() {
            Ok(guard) => guard,
            Err(_) => return classify(self.profile.locked_error()),
        };

        let driver = match self.launcher.launch(self.profile.path(), self.headless).await {
            Ok(driver) => driver,
            Err(e) => return classify(e),
        };

        let mut session = AutomationSession::new(driver, self.settings.clone(), ctx.cancel.clone());
        let result = self.drive(&mut session, &draft, submit_selector).await;
        if let Err(e) = session.close().await {
            warn!(error = %e, "Browser session did not close cleanly");
        }

        match result {
            Ok(decision) => StageOutcome::decided(decision),
            Err(e) => classify(e),
        }
    }
}
