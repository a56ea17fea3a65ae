use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::stage::Stage;
use super::status::{derive_overall, OverallStatus, StageStatus};

/// Opaque request identifier (UUID v4 text).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    RegistrationWithVehicle,
    RegistrationWithoutVehicle,
    Deregistration,
}

impl RequestKind {
    pub fn requires_vehicle(self) -> bool {
        matches!(self, RequestKind::RegistrationWithVehicle)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequestKind::RegistrationWithVehicle => "registration_with_vehicle",
            RequestKind::RegistrationWithoutVehicle => "registration_without_vehicle",
            RequestKind::Deregistration => "deregistration",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CourierRole {
    #[serde(rename = "Motorista")]
    Driver,
    #[serde(rename = "Ajudante")]
    Helper,
    #[serde(rename = "Motorista/Ajudante")]
    DriverAndHelper,
}

impl CourierRole {
    pub fn as_str(self) -> &'static str {
        match self {
            CourierRole::Driver => "Motorista",
            CourierRole::Helper => "Ajudante",
            CourierRole::DriverAndHelper => "Motorista/Ajudante",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Applicant {
    /// CPF, digits only.
    pub document_number: String,
    pub display_name: String,
    pub canonical_name: Option<String>,
}

/// Status of one stage plus when it last changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub status: StageStatus,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for StageRecord {
    fn default() -> Self {
        Self {
            status: StageStatus::Awaiting,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageStatuses {
    pub brasil_risk: StageRecord,
    pub rlog_cielo: StageRecord,
    pub rlog_geral: StageRecord,
    pub bringg: StageRecord,
}

impl StageStatuses {
    pub fn record(&self, stage: Stage) -> &StageRecord {
        match stage {
            Stage::BrasilRisk => &self.brasil_risk,
            Stage::RlogCielo => &self.rlog_cielo,
            Stage::RlogGeral => &self.rlog_geral,
            Stage::Bringg => &self.bringg,
        }
    }

    pub fn record_mut(&mut self, stage: Stage) -> &mut StageRecord {
        match stage {
            Stage::BrasilRisk => &mut self.brasil_risk,
            Stage::RlogCielo => &mut self.rlog_cielo,
            Stage::RlogGeral => &mut self.rlog_geral,
            Stage::Bringg => &mut self.bringg,
        }
    }

    pub fn status(&self, stage: Stage) -> StageStatus {
        self.record(stage).status
    }

    pub fn set(&mut self, stage: Stage, status: StageStatus, at: DateTime<Utc>) {
        *self.record_mut(stage) = StageRecord {
            status,
            updated_at: Some(at),
        };
    }

    pub fn downstream(&self) -> [StageStatus; 3] {
        Stage::DOWNSTREAM.map(|s| self.status(s))
    }
}

/// Vehicle attached to a registration. Written once with the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub plate: String,
    pub payload: serde_json::Value,
}

/// Point-in-time copy of a request as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSnapshot {
    pub id: RequestId,
    pub created_at: DateTime<Utc>,
    pub kind: RequestKind,
    pub role: CourierRole,
    pub applicant: Applicant,
    pub requester_name: Option<String>,
    pub requester_org: Option<String>,
    pub document_received: bool,
    pub stages: StageStatuses,
    pub overall: OverallStatus,
    pub payload: serde_json::Value,
}

impl RequestSnapshot {
    /// Overall status as the stage statuses dictate, regardless of what is stored.
    pub fn derived_overall(&self) -> OverallStatus {
        derive_overall(
            self.stages.status(Stage::BrasilRisk),
            self.stages.downstream(),
            self.document_received,
        )
    }
}

/// Intake-side description of a request about to be created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRequest {
    pub kind: RequestKind,
    pub role: CourierRole,
    pub applicant: Applicant,
    pub requester_name: Option<String>,
    pub requester_org: Option<String>,
    pub document_received: bool,
    pub payload: serde_json::Value,
    pub vehicle: Option<Vehicle>,
}

impl NewRequest {
    /// Materialize the initial snapshot: every stage "Aguardando".
    pub fn into_snapshot(self, id: RequestId, created_at: DateTime<Utc>) -> (RequestSnapshot, Option<Vehicle>) {
        let stages = StageStatuses::default();
        let overall = derive_overall(
            stages.status(Stage::BrasilRisk),
            stages.downstream(),
            self.document_received,
        );
        let snapshot = RequestSnapshot {
            id,
            created_at,
            kind: self.kind,
            role: self.role,
            applicant: self.applicant,
            requester_name: self.requester_name,
            requester_org: self.requester_org,
            document_received: self.document_received,
            stages,
            overall,
            payload: self.payload,
        };
        (snapshot, self.vehicle)
    }
}

/// Single-row update applied atomically by the record store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageFields {
    pub stages: Vec<(Stage, StageStatus)>,
    pub overall: Option<OverallStatus>,
    pub document_received: Option<bool>,
}

impl StageFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(mut self, stage: Stage, status: StageStatus) -> Self {
        self.stages.push((stage, status));
        self
    }

    pub fn overall(mut self, overall: OverallStatus) -> Self {
        self.overall = Some(overall);
        self
    }

    pub fn document_received(mut self, received: bool) -> Self {
        self.document_received = Some(received);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty() && self.overall.is_none() && self.document_received.is_none()
    }

    /// Apply to an in-memory snapshot, stamping touched stages with `at`.
    pub fn apply_to(&self, snapshot: &mut RequestSnapshot, at: DateTime<Utc>) {
        for (stage, status) in &self.stages {
            snapshot.stages.set(*stage, *status, at);
        }
        if let Some(overall) = self.overall {
            snapshot.overall = overall;
        }
        if let Some(received) = self.document_received {
            snapshot.document_received = received;
        }
    }
}
