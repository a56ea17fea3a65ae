//! Shared test fixtures: sample requests, scripted executors and a fake browser page

#[allow(dead_code)]
pub mod page;

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use courier_onboarding::domain::{
    Applicant, CourierRole, NewRequest, RequestKind, RequestSnapshot, Stage, StageStatus,
};
use courier_onboarding::stages::{
    ExecutionContext, ExecutorRegistry, GateDecision, StageExecutor, StageOutcome,
};
use courier_onboarding::store::{InMemoryStore, RecordStore};
use courier_onboarding::workflow::{EngineSettings, WorkflowEngine};

/// A driver registration without vehicle, CNH as given
#[allow(dead_code)]
pub fn sample_request(document_received: bool) -> NewRequest {
    NewRequest {
        kind: RequestKind::RegistrationWithoutVehicle,
        role: CourierRole::Driver,
        applicant: Applicant {
            document_number: "52998224725".to_string(),
            display_name: "Maria da Silva".to_string(),
            canonical_name: Some("SPO - Maria da Silva - AGR".to_string()),
        },
        requester_name: Some("Ana Souza".to_string()),
        requester_org: Some("FedEx".to_string()),
        document_received,
        payload: serde_json::json!({
            "driver": {
                "name": "Maria da Silva",
                "gender": "Feminino",
                "birth_date": "01/02/1990",
                "cpf": "52998224725",
                "mobile": "11987654321"
            }
        }),
        vehicle: None,
    }
}

/// Executor that replays queued outcomes and records every context it saw
#[allow(dead_code)]
pub struct ScriptedExecutor {
    stage: Stage,
    outcomes: Mutex<VecDeque<StageOutcome>>,
    fallback: StageOutcome,
    delay: Duration,
    calls: AtomicUsize,
    contexts: Mutex<Vec<ExecutionContext>>,
}

#[allow(dead_code)]
impl ScriptedExecutor {
    pub fn new(stage: Stage, fallback: StageOutcome) -> Self {
        Self {
            stage,
            outcomes: Mutex::new(VecDeque::new()),
            fallback,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            contexts: Mutex::new(Vec::new()),
        }
    }

    pub fn approving_gate() -> Self {
        Self::new(Stage::BrasilRisk, StageOutcome::decided(GateDecision::Apto))
    }

    pub fn succeeding(stage: Stage) -> Self {
        Self::new(stage, StageOutcome::success())
    }

    pub fn then(self, outcome: StageOutcome) -> Self {
        self.outcomes.lock().unwrap().push_back(outcome);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn contexts(&self) -> Vec<ExecutionContext> {
        self.contexts.lock().unwrap().clone()
    }
}

#[async_trait]
impl StageExecutor for ScriptedExecutor {
    fn stage(&self) -> Stage {
        self.stage
    }

    async fn execute(&self, _request: &RequestSnapshot, ctx: &ExecutionContext) -> StageOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.contexts.lock().unwrap().push(ctx.clone());
        if !self.delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(self.delay) => {}
                _ = ctx.cancel.cancelled() => {
                    return StageOutcome::failure(
                        courier_onboarding::stages::FailureKind::Interrupted,
                        "cancelled",
                    );
                }
            }
        }
        let next = self.outcomes.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

/// Store, engine and the executors wired into it
#[allow(dead_code)]
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub engine: WorkflowEngine,
    pub gate: Arc<ScriptedExecutor>,
    pub downstream: Vec<Arc<ScriptedExecutor>>,
    pub shutdown: CancellationToken,
}

#[allow(dead_code)]
impl Harness {
    pub fn new() -> Self {
        Self::with_gate(ScriptedExecutor::approving_gate())
    }

    pub fn with_gate(gate: ScriptedExecutor) -> Self {
        let downstream = Stage::DOWNSTREAM
            .into_iter()
            .map(|stage| Arc::new(ScriptedExecutor::succeeding(stage)))
            .collect();
        Self::build(gate, downstream, EngineSettings::default())
    }

    pub fn build(
        gate: ScriptedExecutor,
        downstream: Vec<Arc<ScriptedExecutor>>,
        settings: EngineSettings,
    ) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let gate = Arc::new(gate);
        let mut registry = ExecutorRegistry::new().with(gate.clone());
        for executor in &downstream {
            registry.register(executor.clone());
        }
        let shutdown = CancellationToken::new();
        let engine = WorkflowEngine::new(
            store.clone() as Arc<dyn RecordStore>,
            registry,
            settings,
            shutdown.clone(),
        );
        Self {
            store,
            engine,
            gate,
            downstream,
            shutdown,
        }
    }

    pub fn executor(&self, stage: Stage) -> &Arc<ScriptedExecutor> {
        if stage.is_gate() {
            return &self.gate;
        }
        self.downstream
            .iter()
            .find(|e| e.stage() == stage)
            .expect("downstream executor registered")
    }

    pub async fn snapshot(&self, id: &courier_onboarding::RequestId) -> RequestSnapshot {
        self.store.get_request(id).await.unwrap()
    }

    pub async fn status(&self, id: &courier_onboarding::RequestId, stage: Stage) -> StageStatus {
        self.snapshot(id).await.stages.status(stage)
    }
}
