//! End-to-end workflow scenarios on the in-memory store.

mod fixtures;

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use courier_onboarding::automation::{
    BrowserProfile, FieldPlan, InterceptionRules, ReadinessMarker, SessionSettings,
};
use courier_onboarding::domain::{
    EventLevel, OverallStatus, RequestId, Stage, StageFields, StageStatus,
};
use courier_onboarding::stages::{
    BrowserGateExecutor, FailureKind, GateDecision, GateTimeouts, StageOutcome,
};
use courier_onboarding::store::RecordStore;
use courier_onboarding::workflow::{EngineSettings, ResultCode, WorkflowError};
use fixtures::page::{FakeLauncher, FakePage};
use fixtures::{sample_request, Harness, ScriptedExecutor};

async fn create(harness: &Harness, document_received: bool) -> RequestId {
    harness
        .engine
        .create_request(sample_request(document_received))
        .await
        .unwrap()
}

async fn assert_overall_is_derived(harness: &Harness, id: &RequestId) {
    let snapshot = harness.snapshot(id).await;
    assert_eq!(snapshot.overall, snapshot.derived_overall());
}

#[tokio::test]
async fn test_scenario_a_missing_document_blocks_the_gate() {
    let harness = Harness::new();
    let id = create(&harness, false).await;

    let err = harness
        .engine
        .run_stage(&id, Stage::BrasilRisk)
        .await
        .unwrap_err();

    assert!(matches!(err, WorkflowError::DocumentMissing));
    assert_eq!(err.exit_code(), 0);
    assert_eq!(harness.gate.calls(), 0);

    let snapshot = harness.snapshot(&id).await;
    assert_eq!(snapshot.stages.status(Stage::BrasilRisk), StageStatus::BlockedDocument);
    assert_eq!(snapshot.overall, OverallStatus::BlockedDocument);

    let events = harness.engine.events(&id, 10).await.unwrap();
    assert_eq!(events[0].level, EventLevel::Warn);
}

#[tokio::test]
async fn test_scenario_a_document_arrival_unblocks_the_gate() {
    let harness = Harness::new();
    let id = create(&harness, false).await;
    let _ = harness.engine.run_stage(&id, Stage::BrasilRisk).await;

    let view = harness.engine.mark_document_received(&id).await.unwrap();
    assert_eq!(view.status(Stage::BrasilRisk), Some(StageStatus::Awaiting));
    assert_eq!(view.overall, OverallStatus::Awaiting);
    assert!(view.document_received);

    let status = harness
        .engine
        .run_stage(&id, Stage::BrasilRisk)
        .await
        .unwrap();
    assert_eq!(status, StageStatus::Apto);
    assert_overall_is_derived(&harness, &id).await;
}

#[tokio::test]
async fn test_scenario_b_overall_completes_only_after_every_downstream_stage() {
    let harness = Harness::new();
    let id = create(&harness, true).await;

    assert_eq!(
        harness.engine.run_stage(&id, Stage::BrasilRisk).await.unwrap(),
        StageStatus::Apto
    );
    assert_eq!(harness.snapshot(&id).await.overall, OverallStatus::InProgress);

    for (done, stage) in Stage::DOWNSTREAM.into_iter().enumerate() {
        let status = harness.engine.run_stage(&id, stage).await.unwrap();
        assert_eq!(status, StageStatus::Completed);

        let expected = if done == Stage::DOWNSTREAM.len() - 1 {
            OverallStatus::Completed
        } else {
            OverallStatus::InProgress
        };
        assert_eq!(harness.snapshot(&id).await.overall, expected);
        assert_overall_is_derived(&harness, &id).await;
    }

    for stage in Stage::ALL {
        assert_eq!(harness.executor(stage).calls(), 1);
    }
}

#[tokio::test]
async fn test_scenario_c_not_apto_closes_the_request() {
    let harness = Harness::with_gate(ScriptedExecutor::new(
        Stage::BrasilRisk,
        StageOutcome::decided(GateDecision::NaoApto),
    ));
    let id = create(&harness, true).await;

    let status = harness
        .engine
        .run_stage(&id, Stage::BrasilRisk)
        .await
        .unwrap();
    assert_eq!(status, StageStatus::NaoApto);
    assert_eq!(harness.snapshot(&id).await.overall, OverallStatus::ClosedNotApto);

    let err = harness
        .engine
        .run_stage(&id, Stage::RlogCielo)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::GateNotSatisfied {
            gate_status: StageStatus::NaoApto
        }
    ));
    assert_eq!(harness.status(&id, Stage::RlogCielo).await, StageStatus::Awaiting);
    assert_eq!(harness.executor(Stage::RlogCielo).calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_scenario_d_unsolved_login_leaves_stage_waiting_for_human() {
    let profile_root = TempDir::new().unwrap();
    let page = FakePage::stuck_at("https://purpleid.okta.com/app/step-up");
    let gate = BrowserGateExecutor::new(
        Arc::new(FakeLauncher::new(page.clone())),
        BrowserProfile::new(profile_root.path().join("pw-profile")),
        SessionSettings {
            target_url: "https://br2.brasilrisk.com.br/Motorista/Criar".to_string(),
            readiness: ReadinessMarker {
                url_fragment: "/Motorista/Criar".to_string(),
                selector: "h1#Motorista".to_string(),
            },
            interception: InterceptionRules::new(["okta.com"]),
            poll_interval: Duration::from_secs(1),
            submit_settle: Duration::from_secs(2),
        },
        FieldPlan::from_toml_str(include_str!("../config/field-plan.toml")).unwrap(),
        GateTimeouts::default(),
        true,
    );

    let store = Arc::new(courier_onboarding::store::InMemoryStore::new());
    let engine = courier_onboarding::workflow::WorkflowEngine::new(
        store.clone(),
        courier_onboarding::stages::ExecutorRegistry::new().with(Arc::new(gate)),
        EngineSettings::default(),
        tokio_util::sync::CancellationToken::new(),
    );
    let mut request = sample_request(true);
    request.payload = serde_json::json!({
        "driver": {
            "name": "Maria da Silva", "gender": "Feminino", "birth_date": "01/02/1990",
            "rg": "123456789", "rg_issue_date": "01/01/2010", "rg_issuer": "SSP",
            "mother_name": "Joana da Silva", "profile": "Agregado", "cost_center": "FEDEX",
            "cep": "01310100", "state": "SP", "city": "São Paulo", "district": "Bela Vista",
            "street": "Avenida Paulista", "number": "1000", "mobile": "11987654321",
            "cnh_registration": "12345678901", "cnh_number": "98765432100",
            "cnh_category": "B", "cnh_expiry": "01/01/2030", "cnh_state": "SP"
        }
    });
    let id = engine.create_request(request).await.unwrap();

    let report = engine.run_stage_report(&id, Stage::BrasilRisk).await;

    assert_eq!(report.code, ResultCode::HumanPending);
    assert_eq!(report.status, Some(StageStatus::PendingHuman));
    assert_ne!(report.overall, Some(OverallStatus::Error));
    assert!(page.is_closed());
}

#[tokio::test]
async fn test_human_intervention_then_resume_passes_previous_status() {
    let harness = Harness::new();
    let id = create(&harness, true).await;
    harness.engine.run_stage(&id, Stage::BrasilRisk).await.unwrap();

    let bringg = Arc::new(
        ScriptedExecutor::succeeding(Stage::Bringg)
            .then(StageOutcome::human("confirm the SMS token")),
    );
    let downstream = vec![
        Arc::new(ScriptedExecutor::succeeding(Stage::RlogCielo)),
        Arc::new(ScriptedExecutor::succeeding(Stage::RlogGeral)),
        bringg.clone(),
    ];
    // Same store, engine with a scripted Bringg.
    let engine = courier_onboarding::workflow::WorkflowEngine::new(
        harness.store.clone(),
        downstream.iter().fold(
            courier_onboarding::stages::ExecutorRegistry::new().with(harness.gate.clone()),
            |registry, e| registry.with(e.clone()),
        ),
        EngineSettings::default(),
        tokio_util::sync::CancellationToken::new(),
    );

    let status = engine.run_stage(&id, Stage::Bringg).await.unwrap();
    assert_eq!(status, StageStatus::PendingHuman);
    assert_eq!(harness.snapshot(&id).await.overall, OverallStatus::InProgress);

    let status = engine.run_stage(&id, Stage::Bringg).await.unwrap();
    assert_eq!(status, StageStatus::Completed);

    let contexts = bringg.contexts();
    assert_eq!(contexts.len(), 2);
    assert!(!contexts[0].is_resume());
    assert!(contexts[1].is_resume());
    assert_ne!(contexts[0].attempt_id, contexts[1].attempt_id);
}

#[tokio::test]
async fn test_finished_stage_is_rejected_without_side_effects() {
    let harness = Harness::new();
    let id = create(&harness, true).await;
    harness.engine.run_stage(&id, Stage::BrasilRisk).await.unwrap();
    harness.engine.run_stage(&id, Stage::RlogGeral).await.unwrap();

    let err = harness
        .engine
        .run_stage(&id, Stage::RlogGeral)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::AlreadyFinished {
            stage: Stage::RlogGeral,
            status: StageStatus::Completed
        }
    ));
    assert_eq!(harness.executor(Stage::RlogGeral).calls(), 1);

    let err = harness
        .engine
        .run_stage(&id, Stage::BrasilRisk)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::AlreadyFinished { .. }));
    assert_eq!(harness.gate.calls(), 1);
}

#[tokio::test]
async fn test_execution_failure_records_error_and_can_be_rerun() {
    let harness = Harness::with_gate(
        ScriptedExecutor::approving_gate().then(StageOutcome::failure(
            FailureKind::ReadinessTimeout,
            "readiness marker not found within 60s",
        )),
    );
    let id = create(&harness, true).await;

    let err = harness
        .engine
        .run_stage(&id, Stage::BrasilRisk)
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(err.exit_code(), 1);
    assert_eq!(harness.status(&id, Stage::BrasilRisk).await, StageStatus::Error);
    assert_eq!(harness.snapshot(&id).await.overall, OverallStatus::Error);

    let status = harness
        .engine
        .run_stage(&id, Stage::BrasilRisk)
        .await
        .unwrap();
    assert_eq!(status, StageStatus::Apto);
    assert_overall_is_derived(&harness, &id).await;
}

#[tokio::test]
async fn test_gate_success_without_decision_is_a_page_structure_failure() {
    let harness = Harness::with_gate(ScriptedExecutor::new(
        Stage::BrasilRisk,
        StageOutcome::success(),
    ));
    let id = create(&harness, true).await;

    let err = harness
        .engine
        .run_stage(&id, Stage::BrasilRisk)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::ExecutorFailed {
            kind: FailureKind::PageStructure,
            ..
        }
    ));
    assert_eq!(harness.status(&id, Stage::BrasilRisk).await, StageStatus::Error);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_runs_on_one_request_are_serialized() {
    let harness = Harness::with_gate(
        ScriptedExecutor::approving_gate().with_delay(Duration::from_secs(30)),
    );
    let id = create(&harness, true).await;

    let first = {
        let engine = harness.engine.clone();
        let id = id.clone();
        tokio::spawn(async move { engine.run_stage(&id, Stage::BrasilRisk).await })
    };
    let second = {
        let engine = harness.engine.clone();
        let id = id.clone();
        tokio::spawn(async move { engine.run_stage(&id, Stage::BrasilRisk).await })
    };

    let results = [first.await.unwrap(), second.await.unwrap()];
    let applied = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(WorkflowError::AlreadyFinished { .. })))
        .count();
    assert_eq!((applied, rejected), (1, 1));
    assert_eq!(harness.gate.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_interrupts_the_stage_and_records_error() {
    let harness = Harness::build(
        ScriptedExecutor::approving_gate().with_delay(Duration::from_secs(3600)),
        Vec::new(),
        EngineSettings {
            max_concurrent_sessions: 1,
            stage_deadline: Duration::from_secs(60),
        },
    );
    let id = create(&harness, true).await;

    let err = harness
        .engine
        .run_stage(&id, Stage::BrasilRisk)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Cancelled { stage: Stage::BrasilRisk }));
    assert_eq!(harness.status(&id, Stage::BrasilRisk).await, StageStatus::Error);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_interrupts_a_running_stage() {
    let harness = Harness::with_gate(
        ScriptedExecutor::approving_gate().with_delay(Duration::from_secs(600)),
    );
    let id = create(&harness, true).await;

    let shutdown = harness.shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        shutdown.cancel();
    });

    let err = harness
        .engine
        .run_stage(&id, Stage::BrasilRisk)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Cancelled { .. }));
    assert_ne!(harness.status(&id, Stage::BrasilRisk).await, StageStatus::Running);
}

#[tokio::test]
async fn test_missing_executor_is_fatal_and_leaves_status_untouched() {
    let harness = Harness::build(
        ScriptedExecutor::approving_gate(),
        Vec::new(),
        EngineSettings::default(),
    );
    let id = create(&harness, true).await;
    harness.engine.run_stage(&id, Stage::BrasilRisk).await.unwrap();

    let err = harness
        .engine
        .run_stage(&id, Stage::RlogCielo)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::ExecutorMissing { .. }));
    assert_eq!(err.exit_code(), 1);
    assert_eq!(harness.status(&id, Stage::RlogCielo).await, StageStatus::Awaiting);
}

#[tokio::test]
async fn test_sweep_reclaims_abandoned_running_stages() {
    let harness = Harness::new();
    let id = create(&harness, true).await;
    harness
        .store
        .update_stage_fields(
            &id,
            StageFields::new().stage(Stage::BrasilRisk, StageStatus::Running),
        )
        .await
        .unwrap();

    let err = harness
        .engine
        .run_stage(&id, Stage::BrasilRisk)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::AlreadyRunning { .. }));

    let reclaimed = harness
        .engine
        .sweep_stale_running(Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].stage, Stage::BrasilRisk);

    let snapshot = harness.snapshot(&id).await;
    assert_eq!(snapshot.stages.status(Stage::BrasilRisk), StageStatus::Error);
    assert_eq!(snapshot.overall, OverallStatus::Error);

    let events = harness.engine.events(&id, 1).await.unwrap();
    assert_eq!(events[0].level, EventLevel::Error);

    assert!(harness
        .engine
        .sweep_stale_running(Duration::ZERO)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_sweep_ignores_recent_running_stages() {
    let harness = Harness::new();
    let id = create(&harness, true).await;
    harness
        .store
        .update_stage_fields(
            &id,
            StageFields::new().stage(Stage::BrasilRisk, StageStatus::Running),
        )
        .await
        .unwrap();

    let reclaimed = harness
        .engine
        .sweep_stale_running(Duration::from_secs(30 * 60))
        .await
        .unwrap();
    assert!(reclaimed.is_empty());
    assert_eq!(harness.status(&id, Stage::BrasilRisk).await, StageStatus::Running);
}

#[tokio::test]
async fn test_unknown_request_is_not_found_with_exit_zero() {
    let harness = Harness::new();
    let report = harness
        .engine
        .run_stage_report(&RequestId::from("missing"), Stage::BrasilRisk)
        .await;
    assert_eq!(report.code, ResultCode::Completed);
    assert!(report.message.contains("not found"));
}

#[tokio::test]
async fn test_public_lookup_requires_the_matching_cpf_suffix() {
    let harness = Harness::new();
    let id = create(&harness, true).await;

    let view = harness.engine.public_status(&id, "4725").await.unwrap();
    assert_eq!(view.request_id, id);
    assert_eq!(view.canonical_name.as_deref(), Some("SPO - Maria da Silva - AGR"));
    assert_eq!(view.stages.len(), 4);

    for wrong in ["4726", "8224", "725", ""] {
        let err = harness.engine.public_status(&id, wrong).await.unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound(_)), "{wrong}: {err:?}");
    }
    let err = harness
        .engine
        .public_status(&RequestId::from("missing"), "4725")
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound(_)));
}
