//! The workflow engine: the only component that writes stage statuses.
//!
//! Every call is serialized per request, gated on the upstream decision, and
//! leaves the stage in a status that the overall derivation understands. A
//! stage is never left "Em processo" by a call that returns.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Instrument};

use super::errors::{ResultCode, WorkflowError};
use super::lifecycle::{transition, StageEvent};
use super::locks::RequestLocks;
use crate::domain::{
    Event, NewEvent, NewRequest, OverallStatus, RequestId, RequestSnapshot, Stage, StageFields,
    StageStatus,
};
use crate::stages::{
    ExecutionContext, ExecutorRegistry, FailureKind, GateDecision, StageOutcome,
};
use crate::store::{RecordStore, RequestQuery};
use crate::telemetry::{create_stage_span, generate_correlation_id};

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Stage executions allowed at once across all requests in this process.
    pub max_concurrent_sessions: usize,
    pub stage_deadline: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: 2,
            stage_deadline: Duration::from_secs(15 * 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageLine {
    pub stage: Stage,
    pub status: StageStatus,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusView {
    pub request_id: RequestId,
    pub applicant: String,
    pub canonical_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub document_received: bool,
    pub stages: Vec<StageLine>,
    pub overall: OverallStatus,
}

impl StatusView {
    fn from_snapshot(snapshot: &RequestSnapshot) -> Self {
        Self {
            request_id: snapshot.id.clone(),
            applicant: snapshot.applicant.display_name.clone(),
            canonical_name: snapshot.applicant.canonical_name.clone(),
            created_at: snapshot.created_at,
            document_received: snapshot.document_received,
            stages: Stage::ALL
                .into_iter()
                .map(|stage| {
                    let record = snapshot.stages.record(stage);
                    StageLine {
                        stage,
                        status: record.status,
                        updated_at: record.updated_at,
                    }
                })
                .collect(),
            overall: snapshot.derived_overall(),
        }
    }

    pub fn status(&self, stage: Stage) -> Option<StageStatus> {
        self.stages.iter().find(|l| l.stage == stage).map(|l| l.status)
    }
}

/// What an operator sees after `run_stage`.
#[derive(Debug, Clone, Serialize)]
pub struct StageRunReport {
    pub request_id: RequestId,
    pub stage: Stage,
    pub status: Option<StageStatus>,
    pub overall: Option<OverallStatus>,
    pub message: String,
    pub code: ResultCode,
    #[serde(skip)]
    pub error: Option<Arc<WorkflowError>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReclaimedStage {
    pub request_id: RequestId,
    pub stage: Stage,
    pub since: DateTime<Utc>,
}

#[derive(Clone)]
pub struct WorkflowEngine {
    store: Arc<dyn RecordStore>,
    executors: ExecutorRegistry,
    locks: RequestLocks,
    sessions: Arc<Semaphore>,
    settings: EngineSettings,
    shutdown: CancellationToken,
}

impl WorkflowEngine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        executors: ExecutorRegistry,
        settings: EngineSettings,
        shutdown: CancellationToken,
    ) -> Self {
        let missing = executors.missing();
        if !missing.is_empty() {
            warn!(missing = ?missing, "Workflow engine started without executors for some stages");
        }
        Self {
            store,
            executors,
            locks: RequestLocks::new(),
            sessions: Arc::new(Semaphore::new(settings.max_concurrent_sessions.max(1))),
            settings,
            shutdown,
        }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub async fn create_request(&self, request: NewRequest) -> Result<RequestId, WorkflowError> {
        let id = self.store.create_request(request).await?;
        info!(request_id = %id, "Request created");
        Ok(id)
    }

    pub async fn search(&self, query: RequestQuery) -> Result<Vec<RequestSnapshot>, WorkflowError> {
        Ok(self.store.list_requests(query).await?)
    }

    pub async fn request_status(&self, id: &RequestId) -> Result<StatusView, WorkflowError> {
        let snapshot = self.store.get_request(id).await?;
        Ok(StatusView::from_snapshot(&snapshot))
    }

    /// Applicant-facing lookup by protocol and the last four CPF digits.
    ///
    /// A digit mismatch is reported exactly like an unknown id.
    pub async fn public_status(
        &self,
        id: &RequestId,
        cpf_last4: &str,
    ) -> Result<StatusView, WorkflowError> {
        let snapshot = self.store.get_request(id).await?;
        let cpf = crate::validators::only_digits(&snapshot.applicant.document_number);
        if cpf_last4.len() != 4 || !cpf.ends_with(cpf_last4) {
            info!(request_id = %id, "Public lookup refused: CPF suffix mismatch");
            return Err(WorkflowError::NotFound(id.clone()));
        }
        Ok(StatusView::from_snapshot(&snapshot))
    }

    /// Newest first.
    pub async fn events(&self, id: &RequestId, limit: usize) -> Result<Vec<Event>, WorkflowError> {
        self.store.get_request(id).await?;
        Ok(self.store.list_events(id, limit).await?)
    }

    /// Execute one stage for one request and persist where it ended up.
    ///
    /// `Ok` carries the stage's final status ("Aguardando Humano" included);
    /// every refusal or fault is a [`WorkflowError`].
    pub async fn run_stage(&self, id: &RequestId, stage: Stage) -> Result<StageStatus, WorkflowError> {
        let correlation_id = generate_correlation_id();
        let span = create_stage_span(id.as_str(), stage, &correlation_id);
        self.run_stage_inner(id, stage, correlation_id)
            .instrument(span)
            .await
    }

    /// [`run_stage`](Self::run_stage) folded into an operator report.
    pub async fn run_stage_report(&self, id: &RequestId, stage: Stage) -> StageRunReport {
        let result = self.run_stage(id, stage).await;
        let snapshot = self.store.get_request(id).await.ok();
        let status = snapshot.as_ref().map(|s| s.stages.status(stage));
        let overall = snapshot.as_ref().map(RequestSnapshot::derived_overall);

        let (message, code, error) = match result {
            Ok(StageStatus::PendingHuman) => (
                format!("{stage} is waiting for a human step; run it again once it is done"),
                ResultCode::HumanPending,
                None,
            ),
            Ok(status) => (format!("{stage} finished: {status}"), ResultCode::Completed, None),
            Err(e) => (
                format!("{e}. {}", e.remediation()),
                e.result_code(),
                Some(Arc::new(e)),
            ),
        };

        StageRunReport {
            request_id: id.clone(),
            stage,
            status,
            overall,
            message,
            code,
            error,
        }
    }

    async fn run_stage_inner(
        &self,
        id: &RequestId,
        stage: Stage,
        correlation_id: String,
    ) -> Result<StageStatus, WorkflowError> {
        let _guard = self.locks.acquire(id).await;
        let request = self.store.get_request(id).await?;
        let current = request.stages.status(stage);
        let system = stage.system_name();

        if !stage.is_gate() {
            let gate_status = request.stages.status(Stage::BrasilRisk);
            if gate_status != StageStatus::Apto {
                warn!(stage = %stage, gate_status = %gate_status, "Downstream stage refused");
                self.record_event(
                    id,
                    NewEvent::warn(
                        system,
                        format!("Refused: gate status is '{gate_status}', expected 'Apto'"),
                    ),
                )
                .await;
                return Err(WorkflowError::GateNotSatisfied { gate_status });
            }
        }

        if stage.is_gate() && !request.document_received {
            let blocked = transition(stage, current, &StageEvent::DocumentMissing)?;
            self.commit(
                request,
                stage,
                blocked,
                NewEvent::warn(system, "CNH not received; gate blocked"),
            )
            .await?;
            return Err(WorkflowError::DocumentMissing);
        }

        let running = transition(stage, current, &StageEvent::Start)?;
        let executor = self
            .executors
            .get(stage)
            .ok_or(WorkflowError::ExecutorMissing { stage })?;

        let _permit = tokio::select! {
            _ = self.shutdown.cancelled() => return Err(WorkflowError::Cancelled { stage }),
            permit = self.sessions.acquire() => permit.map_err(|_| WorkflowError::Cancelled { stage })?,
        };

        let attempt_id = uuid::Uuid::new_v4().to_string();
        let request = self
            .claim(
                request,
                stage,
                running,
                NewEvent::info(system, "Stage started").with_metadata(serde_json::json!({
                    "attempt_id": attempt_id,
                    "correlation_id": correlation_id,
                    "previous_status": current.as_str(),
                    "host": host_name(),
                })),
            )
            .await?;

        let cancel = self.shutdown.child_token();
        let ctx = ExecutionContext {
            attempt_id,
            correlation_id,
            previous_status: current,
            cancel: cancel.clone(),
        };

        let deadline = self.settings.stage_deadline;
        let outcome = tokio::select! {
            outcome = executor.execute(&request, &ctx) => outcome,
            _ = tokio::time::sleep(deadline) => StageOutcome::failure(
                FailureKind::Interrupted,
                format!("deadline of {}s reached", deadline.as_secs()),
            ),
            _ = self.shutdown.cancelled() => StageOutcome::failure(
                FailureKind::Interrupted,
                "shutdown requested",
            ),
        };
        cancel.cancel();

        self.finish(request, stage, outcome).await
    }

    async fn finish(
        &self,
        request: RequestSnapshot,
        stage: Stage,
        outcome: StageOutcome,
    ) -> Result<StageStatus, WorkflowError> {
        let system = stage.system_name();
        match outcome {
            StageOutcome::Success { decision } => {
                let (event, message) = match (stage.is_gate(), decision) {
                    (true, Some(decision)) => (
                        StageEvent::Decided(decision),
                        match decision {
                            GateDecision::Apto => "Decision: Apto",
                            GateDecision::NaoApto => "Decision: Não Apto",
                        },
                    ),
                    (true, None) => {
                        return self
                            .fail(
                                request,
                                stage,
                                FailureKind::PageStructure,
                                "gate finished without a decision".to_string(),
                            )
                            .await
                    }
                    (false, _) => (StageEvent::Completed, "Stage completed"),
                };
                let next = transition(stage, StageStatus::Running, &event)?;
                self.commit(request, stage, next, NewEvent::info(system, message))
                    .await?;
                Ok(next)
            }
            StageOutcome::HumanInterventionRequired { reason } => {
                let next = transition(stage, StageStatus::Running, &StageEvent::HumanRequired)?;
                self.commit(
                    request,
                    stage,
                    next,
                    NewEvent::warn(system, format!("Waiting for a human step: {reason}")),
                )
                .await?;
                Ok(next)
            }
            StageOutcome::Failure {
                kind: FailureKind::Interrupted,
                reason,
            } => {
                let next = transition(stage, StageStatus::Running, &StageEvent::Interrupted)?;
                if let Err(e) = self
                    .commit(
                        request,
                        stage,
                        next,
                        NewEvent::error(system, format!("Stage interrupted: {reason}")),
                    )
                    .await
                {
                    warn!(error = %e, "Could not record interruption");
                }
                Err(WorkflowError::Cancelled { stage })
            }
            StageOutcome::Failure { kind, reason } => self.fail(request, stage, kind, reason).await,
        }
    }

    async fn fail(
        &self,
        request: RequestSnapshot,
        stage: Stage,
        kind: FailureKind,
        reason: String,
    ) -> Result<StageStatus, WorkflowError> {
        let next = transition(stage, StageStatus::Running, &StageEvent::Failed)?;
        self.commit(
            request,
            stage,
            next,
            NewEvent::error(stage.system_name(), format!("Stage failed ({kind}): {reason}"))
                .with_metadata(serde_json::json!({ "failure_kind": kind })),
        )
        .await?;
        Err(WorkflowError::ExecutorFailed { stage, kind, reason })
    }

    /// Persist a stage status together with the derived overall, then log the event.
    async fn commit(
        &self,
        mut request: RequestSnapshot,
        stage: Stage,
        next: StageStatus,
        event: NewEvent,
    ) -> Result<RequestSnapshot, WorkflowError> {
        let from = request.stages.status(stage);
        request.stages.set(stage, next, Utc::now());
        let overall = request.derived_overall();

        self.store
            .update_stage_fields(&request.id, StageFields::new().stage(stage, next).overall(overall))
            .await?;
        request.overall = overall;

        info!(
            request_id = %request.id,
            stage = %stage,
            from_state = ?from,
            to_state = ?next,
            overall = ?overall,
            "Stage transition"
        );
        self.record_event(&request.id, event).await;
        Ok(request)
    }

    /// Like [`commit`](Self::commit), but the write only lands while the stage
    /// still holds the status this call read. `None` when another process
    /// sharing the store moved the stage first.
    async fn commit_if_unchanged(
        &self,
        mut request: RequestSnapshot,
        stage: Stage,
        next: StageStatus,
        event: NewEvent,
    ) -> Result<Option<RequestSnapshot>, WorkflowError> {
        let from = request.stages.status(stage);
        request.stages.set(stage, next, Utc::now());
        let overall = request.derived_overall();

        let fields = StageFields::new().stage(stage, next).overall(overall);
        if !self.store.claim_stage(&request.id, stage, from, fields).await? {
            return Ok(None);
        }
        request.overall = overall;

        info!(
            request_id = %request.id,
            stage = %stage,
            from_state = ?from,
            to_state = ?next,
            overall = ?overall,
            "Stage transition"
        );
        self.record_event(&request.id, event).await;
        Ok(Some(request))
    }

    /// Move a stage to "Em processo"; losing the race is a refusal, never a second run.
    async fn claim(
        &self,
        request: RequestSnapshot,
        stage: Stage,
        running: StageStatus,
        event: NewEvent,
    ) -> Result<RequestSnapshot, WorkflowError> {
        let id = request.id.clone();
        let from = request.stages.status(stage);
        if let Some(request) = self.commit_if_unchanged(request, stage, running, event).await? {
            return Ok(request);
        }

        let current = self.store.get_request(&id).await?.stages.status(stage);
        warn!(
            request_id = %id,
            stage = %stage,
            expected = ?from,
            found = ?current,
            "Stage claimed by another writer"
        );
        transition(stage, current, &StageEvent::Start)?;
        Err(WorkflowError::AlreadyRunning { stage })
    }

    async fn record_event(&self, id: &RequestId, event: NewEvent) {
        if let Err(e) = self.store.append_event(id, event).await {
            warn!(request_id = %id, error = %e, "Failed to append event");
        }
    }

    /// Record that the CNH arrived; unblocks a gate stuck on "Bloqueado (CNH)".
    pub async fn mark_document_received(&self, id: &RequestId) -> Result<StatusView, WorkflowError> {
        let _guard = self.locks.acquire(id).await;
        let mut request = self.store.get_request(id).await?;
        let gate = Stage::BrasilRisk;
        let current = request.stages.status(gate);
        let next = transition(gate, current, &StageEvent::DocumentReceived)?;

        let mut fields = StageFields::new().document_received(true);
        if next != current {
            fields = fields.stage(gate, next);
            request.stages.set(gate, next, Utc::now());
        }
        request.document_received = true;
        let overall = request.derived_overall();
        self.store
            .update_stage_fields(id, fields.overall(overall))
            .await?;
        request.overall = overall;

        info!(request_id = %id, from_state = ?current, to_state = ?next, "CNH received");
        self.record_event(id, NewEvent::info(gate.system_name(), "CNH received"))
            .await;
        Ok(StatusView::from_snapshot(&request))
    }

    /// Move stages left "Em processo" longer than `older_than` to "Erro".
    ///
    /// Requests with an execution in flight in this process are skipped.
    pub async fn sweep_stale_running(
        &self,
        older_than: Duration,
    ) -> Result<Vec<ReclaimedStage>, WorkflowError> {
        let Ok(age) = chrono::Duration::from_std(older_than) else {
            return Ok(Vec::new());
        };
        let Some(cutoff) = Utc::now().checked_sub_signed(age) else {
            return Ok(Vec::new());
        };

        let mut reclaimed = Vec::new();
        for running in self.store.find_running_before(cutoff).await? {
            let Some(_guard) = self.locks.try_acquire(&running.request_id) else {
                info!(request_id = %running.request_id, "Skipping stage with a live execution");
                continue;
            };
            let request = self.store.get_request(&running.request_id).await?;
            if request.stages.status(running.stage) != StageStatus::Running {
                continue;
            }

            let next = transition(running.stage, StageStatus::Running, &StageEvent::Interrupted)?;
            let committed = self
                .commit_if_unchanged(
                    request,
                    running.stage,
                    next,
                    NewEvent::error(
                        running.stage.system_name(),
                        format!("Stage interrupted: no progress since {}", running.since.to_rfc3339()),
                    ),
                )
                .await?;
            if committed.is_none() {
                continue;
            }
            warn!(request_id = %running.request_id, stage = %running.stage, "Reclaimed stale stage");
            reclaimed.push(ReclaimedStage {
                request_id: running.request_id,
                stage: running.stage,
                since: running.since,
            });
        }
        self.locks.prune();
        Ok(reclaimed)
    }
}

fn host_name() -> Option<String> {
    hostname::get().ok().and_then(|h| h.into_string().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Applicant, CourierRole, RequestKind};
    use crate::stages::StageExecutor;
    use crate::store::{MockRecordStore, StoreError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        stage: Stage,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl StageExecutor for Counting {
        fn stage(&self) -> Stage {
            self.stage
        }

        async fn execute(&self, _: &RequestSnapshot, _: &ExecutionContext) -> StageOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            StageOutcome::decided(GateDecision::Apto)
        }
    }

    fn snapshot(id: &RequestId) -> RequestSnapshot {
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
        .into_snapshot(id.clone(), Utc::now())
        .0
    }

    #[tokio::test]
    async fn store_failure_before_running_write_never_invokes_executor() {
        let id = RequestId::from("r-1");
        let stored = snapshot(&id);

        let mut store = MockRecordStore::new();
        store
            .expect_get_request()
            .returning(move |_| Ok(stored.clone()));
        store
            .expect_claim_stage()
            .times(1)
            .returning(|_, _, _, _| Err(StoreError::Unavailable("database is locked".into())));
        store.expect_update_stage_fields().never();
        store.expect_append_event().never();

        let calls = Arc::new(AtomicUsize::new(0));
        let engine = WorkflowEngine::new(
            Arc::new(store),
            ExecutorRegistry::new().with(Arc::new(Counting {
                stage: Stage::BrasilRisk,
                calls: calls.clone(),
            })),
            EngineSettings::default(),
            CancellationToken::new(),
        );

        let err = engine.run_stage(&id, Stage::BrasilRisk).await.unwrap_err();
        assert!(matches!(err, WorkflowError::StoreUnavailable(_)));
        assert_eq!(err.exit_code(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn event_append_failure_does_not_fail_the_stage() {
        let id = RequestId::from("r-2");
        let stored = snapshot(&id);

        let mut store = MockRecordStore::new();
        store
            .expect_get_request()
            .returning(move |_| Ok(stored.clone()));
        store.expect_claim_stage().returning(|_, _, _, _| Ok(true));
        store.expect_update_stage_fields().returning(|_, _| Ok(()));
        store
            .expect_append_event()
            .returning(|_, _| Err(StoreError::Unavailable("disk full".into())));

        let calls = Arc::new(AtomicUsize::new(0));
        let engine = WorkflowEngine::new(
            Arc::new(store),
            ExecutorRegistry::new().with(Arc::new(Counting {
                stage: Stage::BrasilRisk,
                calls: calls.clone(),
            })),
            EngineSettings::default(),
            CancellationToken::new(),
        );

        let status = engine.run_stage(&id, Stage::BrasilRisk).await.unwrap();
        assert_eq!(status, StageStatus::Apto);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_request_is_not_found() {
        let mut store = MockRecordStore::new();
        store
            .expect_get_request()
            .returning(|id| Err(StoreError::NotFound(id.clone())));

        let engine = WorkflowEngine::new(
            Arc::new(store),
            ExecutorRegistry::new(),
            EngineSettings::default(),
            CancellationToken::new(),
        );
        let report = engine
            .run_stage_report(&RequestId::from("nope"), Stage::Bringg)
            .await;
        assert_eq!(report.code, ResultCode::Completed);
        assert!(report.status.is_none());
        assert!(matches!(
            report.error.as_deref(),
            Some(WorkflowError::NotFound(_))
        ));
    }
}
