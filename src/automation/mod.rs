//! Browser-driven interaction with the gate's web application.
//!
//! ```text
//! AutomationSession (one per stage execution)
//!       │  wait_until (cancellable polling)
//!       ▼
//! PageDriver (trait) ── PlaywrightDriver (node bridge subprocess)
//!       │
//!       ▼
//! BrowserProfile (persistent, fd-locked)
//! ```
//!
//! Field values are never logged; only logical field names are.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub mod driver;
pub mod field_plan;
pub mod interception;
pub mod playwright;
pub mod profile;
pub mod session;
pub mod wait;

pub use driver::{DriverLauncher, PageDriver};
pub use field_plan::{
    Decision, DecisionMarker, DraftAction, FieldDraft, FieldOp, FieldPlan, FieldPlanError,
    FieldSpec, FieldStep,
};
pub use interception::{InterceptionRules, Location, ReadinessMarker};
pub use playwright::{PlaywrightDriver, PlaywrightLauncher};
pub use profile::BrowserProfile;
pub use session::{AutomationSession, SessionSettings};
pub use wait::{wait_until, ProbeFuture, WaitError, WaitPolicy};

#[derive(Debug, Error)]
pub enum AutomationError {
    /// Interception did not clear in time; a person must act in the browser.
    #[error("human step required: {0}")]
    HumanStepRequired(String),

    #[error("target page not ready after {0:?}")]
    ReadinessTimeout(Duration),

    #[error("unexpected page structure: {0}")]
    PageStructure(String),

    #[error(transparent)]
    FieldPlan(#[from] FieldPlanError),

    #[error("browser driver failure: {0}")]
    Driver(String),

    #[error("browser profile {} is in use by another session", .0.display())]
    ProfileLocked(PathBuf),

    #[error("browser profile error: {0}")]
    Profile(#[source] std::io::Error),

    #[error("automation cancelled")]
    Cancelled,
}
