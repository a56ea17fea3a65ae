use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::automation::{BrowserProfile, FieldPlan, PlaywrightLauncher};
use crate::config::{OnboardingConfig, StoreConfig};
use crate::domain::{RequestId, Stage};
use crate::stages::{
    BrowserGateExecutor, CommandRunner, ExecutorRegistry, IntegrationCommandExecutor,
    ProcessCommandRunner,
};
use crate::store::{InMemoryStore, RecordStore};
use crate::workflow::WorkflowEngine;

pub mod cleanup_uploads;
pub mod events;
pub mod intake;
pub mod list;
pub mod lookup;
pub mod mark_document;
pub mod report;
pub mod run_stage;
pub mod status;
pub mod sweep;

const BUNDLED_FIELD_PLAN: &str = include_str!("../../../config/field-plan.toml");

/// Resolve configuration: an explicit file, or the layered global one.
pub fn load_config(path: Option<&Path>) -> Result<OnboardingConfig> {
    match path {
        Some(path) => {
            let mut loaded = OnboardingConfig::load_from_path(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            loaded.apply_runtime_overrides(|key| std::env::var(key).ok());
            Ok(loaded)
        }
        None => Ok(crate::config::config()?.clone()),
    }
}

/// Wire store, executors and engine from configuration.
pub async fn build_engine(config: &OnboardingConfig, shutdown: CancellationToken) -> Result<WorkflowEngine> {
    let store = open_store(&config.store).await?;
    let executors = build_executors(config)?;
    Ok(WorkflowEngine::new(
        store,
        executors,
        config.engine.engine_settings(),
        shutdown,
    ))
}

pub async fn open_store(store: &StoreConfig) -> Result<Arc<dyn RecordStore>> {
    if store.is_memory() {
        warn!("Using the in-memory record store; nothing survives this process");
        return Ok(Arc::new(InMemoryStore::new()));
    }
    open_sqlite(store).await
}

#[cfg(feature = "database")]
async fn open_sqlite(store: &StoreConfig) -> Result<Arc<dyn RecordStore>> {
    let sqlite =
        crate::store::SqliteStore::connect(&store.url, store.max_connections, store.auto_migrate)
            .await
            .with_context(|| format!("failed to open record store at {}", store.url))?;
    Ok(Arc::new(sqlite))
}

#[cfg(not(feature = "database"))]
async fn open_sqlite(store: &StoreConfig) -> Result<Arc<dyn RecordStore>> {
    anyhow::bail!(
        "store url {} needs the `database` feature; set store.url = \"memory\" or rebuild",
        store.url
    )
}

fn load_field_plan(path: &Path) -> Result<FieldPlan> {
    if path.exists() {
        info!(field_plan = %path.display(), "Loading field plan");
        return FieldPlan::load(path).with_context(|| format!("invalid field plan {}", path.display()));
    }
    info!("Field plan file not found, using the bundled Brasil Risk plan");
    Ok(FieldPlan::from_toml_str(BUNDLED_FIELD_PLAN)?)
}

pub fn build_executors(config: &OnboardingConfig) -> Result<ExecutorRegistry> {
    let automation = &config.automation;
    let launcher = PlaywrightLauncher {
        node_binary: automation.node_binary.clone(),
        action_timeout: Duration::from_secs(automation.action_timeout_seconds),
        ..PlaywrightLauncher::default()
    };

    let gate = BrowserGateExecutor::new(
        Arc::new(launcher),
        BrowserProfile::new(&automation.profile_dir),
        automation.session_settings(),
        load_field_plan(&automation.field_plan_path)?,
        automation.gate_timeouts(),
        automation.headless,
    );

    let runner: Arc<dyn CommandRunner> = Arc::new(ProcessCommandRunner);
    let mut registry = ExecutorRegistry::new().with(Arc::new(gate));
    for stage in Stage::DOWNSTREAM {
        registry.register(Arc::new(IntegrationCommandExecutor::new(
            stage,
            config.integrations.command_for(stage).cloned(),
            runner.clone(),
        )));
    }
    Ok(registry)
}

pub fn request_id(raw: &str) -> RequestId {
    RequestId::from(raw.trim())
}
