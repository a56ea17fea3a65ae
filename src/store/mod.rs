//! Durable persistence of requests, vehicles and audit events.
//!
//! Every mutation is a single-row atomic update; the store knows nothing about
//! workflow rules and never derives statuses on its own.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{
    Event, NewEvent, NewRequest, RequestId, RequestSnapshot, Stage, StageFields, StageStatus,
    UnknownStatus, Vehicle,
};

pub mod memory;
#[cfg(feature = "database")]
pub mod sqlite;

pub use memory::InMemoryStore;
#[cfg(feature = "database")]
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request {0} not found")]
    NotFound(RequestId),

    #[error("record store unavailable: {0}")]
    Unavailable(String),

    #[error("stored row is corrupt: {0}")]
    Corrupt(String),
}

impl From<UnknownStatus> for StoreError {
    fn from(err: UnknownStatus) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::Corrupt(err.to_string())
            }
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

/// Search filter for [`RecordStore::list_requests`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestQuery {
    /// Matches CPF digits, display name (case-insensitive) or id substring.
    pub text: Option<String>,
    pub limit: Option<usize>,
}

impl RequestQuery {
    pub fn matching(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            limit: None,
        }
    }

    pub fn matches(&self, snapshot: &RequestSnapshot) -> bool {
        let Some(text) = self.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) else {
            return true;
        };
        let needle = text.to_lowercase();
        let digits = crate::validators::only_digits(text);
        (!digits.is_empty() && snapshot.applicant.document_number.contains(&digits))
            || snapshot.applicant.display_name.to_lowercase().contains(&needle)
            || snapshot.id.as_str().contains(&needle)
    }
}

/// A stage found "Em processo" by [`RecordStore::find_running_before`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningStage {
    pub request_id: RequestId,
    pub stage: Stage,
    pub since: DateTime<Utc>,
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist a new request (and its vehicle) with every stage "Aguardando",
    /// appending the intake INFO event.
    async fn create_request(&self, request: NewRequest) -> Result<RequestId, StoreError>;

    async fn get_request(&self, id: &RequestId) -> Result<RequestSnapshot, StoreError>;

    async fn get_vehicle(&self, id: &RequestId) -> Result<Option<Vehicle>, StoreError>;

    async fn update_stage_fields(&self, id: &RequestId, fields: StageFields) -> Result<(), StoreError>;

    /// Apply `fields` only while `stage` still reads `expected`, as one conditional write.
    ///
    /// `Ok(false)` means another writer moved the stage first and nothing was changed.
    async fn claim_stage(
        &self,
        id: &RequestId,
        stage: Stage,
        expected: StageStatus,
        fields: StageFields,
    ) -> Result<bool, StoreError>;

    async fn append_event(&self, id: &RequestId, event: NewEvent) -> Result<(), StoreError>;

    /// Newest first.
    async fn list_events(&self, id: &RequestId, limit: usize) -> Result<Vec<Event>, StoreError>;

    /// Newest first.
    async fn list_requests(&self, query: RequestQuery) -> Result<Vec<RequestSnapshot>, StoreError>;

    async fn find_running_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<RunningStage>, StoreError>;
}

pub(crate) const INTAKE_SYSTEM: &str = "Intake";
pub(crate) const INTAKE_MESSAGE: &str = "Request created";
