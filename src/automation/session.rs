use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::driver::PageDriver;
use super::field_plan::{Decision, DecisionMarker, DraftAction, FieldDraft};
use super::interception::{InterceptionRules, Location, ReadinessMarker};
use super::wait::{wait_until, WaitError, WaitPolicy};
use super::AutomationError;

/// Everything a session needs to know about the target application.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub target_url: String,
    pub readiness: ReadinessMarker,
    pub interception: InterceptionRules,
    pub poll_interval: Duration,
    pub submit_settle: Duration,
}

/// One interactive session against the gate's web application.
///
/// Created per stage execution and closed on every exit path.
pub struct AutomationSession {
    driver: Box<dyn PageDriver>,
    settings: Arc<SessionSettings>,
    cancel: CancellationToken,
    location: Location,
}

impl AutomationSession {
    pub fn new(
        driver: Box<dyn PageDriver>,
        settings: Arc<SessionSettings>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            driver,
            settings,
            cancel,
            location: Location::OnTarget,
        }
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Navigate to the target and classify where the browser landed.
    pub async fn open_target(&mut self) -> Result<Location, AutomationError> {
        let url = self.settings.target_url.clone();
        self.driver.goto(&url).await?;
        let landed = self.driver.current_url().await?;
        self.location = self.settings.interception.classify(&landed);
        match &self.location {
            Location::OnTarget => debug!("Target opened without interception"),
            Location::Intercepted { hint } => {
                info!(hint = %hint, "Navigation intercepted by identity provider")
            }
        }
        Ok(self.location.clone())
    }

    /// Wait for a person to clear an identity challenge in the open browser.
    ///
    /// On timeout this is [`AutomationError::HumanStepRequired`], never a plain
    /// failure. Once cleared, the target is re-opened and re-verified.
    pub async fn await_interception_clear(&mut self, timeout: Duration) -> Result<(), AutomationError> {
        let Location::Intercepted { hint } = self.location.clone() else {
            return Ok(());
        };

        info!(hint = %hint, timeout_secs = timeout.as_secs(), "Waiting for human to clear interception");
        let rules: InterceptionRules = self.settings.interception.clone();
        let policy = WaitPolicy::new(timeout, self.settings.poll_interval);
        let waited = wait_until(self.driver.as_mut(), policy, &self.cancel, move |driver| {
            let rules = rules.clone();
            Box::pin(async move {
                let url = driver.current_url().await?;
                Ok(!rules.classify(&url).is_intercepted())
            })
        })
        .await;

        match waited {
            Ok(()) => {}
            Err(WaitError::TimedOut(_)) => {
                warn!(hint = %hint, "Interception not cleared in time");
                return Err(AutomationError::HumanStepRequired(format!(
                    "login at {hint} not completed within {}s; complete it in the browser and re-run the stage",
                    timeout.as_secs()
                )));
            }
            Err(WaitError::Cancelled) => return Err(AutomationError::Cancelled),
            Err(WaitError::Probe(e)) => return Err(e),
        }

        let location = self.open_target().await?;
        if let Location::Intercepted { hint } = location {
            return Err(AutomationError::HumanStepRequired(format!(
                "still redirected to {hint} after the challenge cleared"
            )));
        }
        info!("Interception cleared");
        Ok(())
    }

    /// Wait until the readiness marker (URL fragment and selector) is present.
    pub async fn await_target_ready(&mut self, timeout: Duration) -> Result<(), AutomationError> {
        let marker = self.settings.readiness.clone();
        let policy = WaitPolicy::new(timeout, self.settings.poll_interval);
        let waited = wait_until(self.driver.as_mut(), policy, &self.cancel, move |driver| {
            let marker = marker.clone();
            Box::pin(async move {
                let url = driver.current_url().await?;
                if !marker.url_matches(&url) {
                    return Ok(false);
                }
                driver.has_selector(&marker.selector).await
            })
        })
        .await;

        match waited {
            Ok(()) => Ok(()),
            Err(WaitError::TimedOut(t)) => Err(AutomationError::ReadinessTimeout(t)),
            Err(WaitError::Cancelled) => Err(AutomationError::Cancelled),
            Err(WaitError::Probe(e)) => Err(e),
        }
    }

    /// Apply a resolved draft in order.
    pub async fn fill_fields(&mut self, draft: &FieldDraft) -> Result<(), AutomationError> {
        for step in &draft.steps {
            if self.cancel.is_cancelled() {
                return Err(AutomationError::Cancelled);
            }
            let structure = |e: AutomationError| match e {
                AutomationError::Driver(msg) => {
                    AutomationError::PageStructure(format!("field '{}': {msg}", step.name))
                }
                other => other,
            };

            match &step.action {
                DraftAction::Fill { selector, value } => {
                    self.driver.fill(selector, value).await.map_err(structure)?
                }
                DraftAction::SelectValue { selector, value } => self
                    .driver
                    .select_by_value(selector, value)
                    .await
                    .map_err(structure)?,
                DraftAction::SelectLabel {
                    selector,
                    label,
                    partial,
                } => {
                    let selected = self
                        .driver
                        .select_by_label(selector, label, *partial)
                        .await
                        .map_err(structure)?;
                    if !selected {
                        if step.optional {
                            debug!(field = %step.name, "No matching option for optional field");
                            continue;
                        }
                        return Err(AutomationError::PageStructure(format!(
                            "field '{}': no matching option",
                            step.name
                        )));
                    }
                }
                DraftAction::Attach {
                    trigger,
                    selector,
                    path,
                } => {
                    if let Some(trigger) = trigger {
                        self.driver.click(trigger).await.map_err(structure)?;
                    }
                    self.driver
                        .attach_file(selector, path)
                        .await
                        .map_err(structure)?
                }
                DraftAction::Press { selector, key } => {
                    self.driver.press(selector, key).await.map_err(structure)?
                }
                DraftAction::Click { selector } => {
                    self.driver.click(selector).await.map_err(structure)?
                }
                DraftAction::Pause(pause) => settle(&self.cancel, *pause).await?,
            }
            debug!(field = %step.name, "Field applied");
        }
        info!(
            applied = draft.steps.len(),
            skipped = draft.skipped.len(),
            "Form filled"
        );
        Ok(())
    }

    /// Trigger the final save and give the page time to render the result.
    pub async fn submit(&mut self, selector: &str) -> Result<(), AutomationError> {
        self.driver.click(selector).await.map_err(|e| match e {
            AutomationError::Driver(msg) => {
                AutomationError::PageStructure(format!("submit control: {msg}"))
            }
            other => other,
        })?;
        info!("Form submitted");
        settle(&self.cancel, self.settings.submit_settle).await
    }

    /// Read the decision off the result page; first matching marker wins.
    pub async fn inspect_decision(
        &mut self,
        markers: &[DecisionMarker],
    ) -> Result<Decision, AutomationError> {
        for marker in markers {
            let matched = match &marker.contains {
                Some(needle) => self
                    .driver
                    .text_content(&marker.selector)
                    .await?
                    .is_some_and(|text| text.to_lowercase().contains(&needle.to_lowercase())),
                None => self.driver.has_selector(&marker.selector).await?,
            };
            if matched {
                info!(decision = ?marker.decision, "Gate decision read");
                return Ok(marker.decision);
            }
        }
        Err(AutomationError::PageStructure(
            "no decision marker matched the result page".to_string(),
        ))
    }

    /// Release the browser.
    pub async fn close(mut self) -> Result<(), AutomationError> {
        self.driver.close().await
    }
}

/// Cancellable pause.
async fn settle(cancel: &CancellationToken, pause: Duration) -> Result<(), AutomationError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(AutomationError::Cancelled),
        _ = tokio::time::sleep(pause) => Ok(()),
    }
}
