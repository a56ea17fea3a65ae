use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::automation::{InterceptionRules, ReadinessMarker, SessionSettings};
use crate::domain::Stage;
use crate::stages::{GateTimeouts, IntegrationCommand};
use crate::workflow::EngineSettings;

/// Main configuration structure for the onboarding engine
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct OnboardingConfig {
    /// Record store settings
    pub store: StoreConfig,
    /// Gate browser automation settings
    pub automation: AutomationConfig,
    /// Workflow engine limits
    pub engine: EngineConfig,
    /// Downstream integration commands
    pub integrations: IntegrationsConfig,
    /// Uploaded document retention
    pub uploads: UploadsConfig,
    /// Logging settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite URL; `memory` keeps everything in-process
    pub url: String,
    /// Maximum connections in pool
    pub max_connections: u32,
    /// Enable automatic migrations
    pub auto_migrate: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://.courier-onboarding/onboarding.db".to_string(),
            max_connections: 5,
            auto_migrate: true,
        }
    }
}

impl StoreConfig {
    pub fn is_memory(&self) -> bool {
        self.url == "memory"
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AutomationConfig {
    /// Page the gate stage opens
    pub target_url: String,
    pub readiness_url_fragment: String,
    pub readiness_selector: String,
    /// URL substrings marking identity-provider or challenge pages
    pub interception_hints: Vec<String>,
    pub interception_timeout_seconds: u64,
    pub readiness_timeout_seconds: u64,
    pub poll_interval_ms: u64,
    /// Pause after submitting before the result page is read
    pub submit_settle_ms: u64,
    pub headless: bool,
    pub node_binary: String,
    pub action_timeout_seconds: u64,
    /// Persistent browser profile directory
    pub profile_dir: PathBuf,
    /// Field plan TOML for the target page
    pub field_plan_path: PathBuf,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            target_url: "https://br2.brasilrisk.com.br/Motorista/Criar".to_string(),
            readiness_url_fragment: "/Motorista/Criar".to_string(),
            readiness_selector: "h1#Motorista".to_string(),
            interception_hints: vec![
                "okta.com".to_string(),
                "purpleid.okta.com".to_string(),
                "/Account/ResponseOKTASAML".to_string(),
            ],
            interception_timeout_seconds: 600,
            readiness_timeout_seconds: 60,
            poll_interval_ms: 1000,
            submit_settle_ms: 2000,
            headless: false,
            node_binary: "node".to_string(),
            action_timeout_seconds: 30,
            profile_dir: PathBuf::from(".courier-onboarding/pw-profile"),
            field_plan_path: PathBuf::from("config/field-plan.toml"),
        }
    }
}

impl AutomationConfig {
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            target_url: self.target_url.clone(),
            readiness: ReadinessMarker {
                url_fragment: self.readiness_url_fragment.clone(),
                selector: self.readiness_selector.clone(),
            },
            interception: InterceptionRules::new(&self.interception_hints),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            submit_settle: Duration::from_millis(self.submit_settle_ms),
        }
    }

    pub fn gate_timeouts(&self) -> GateTimeouts {
        GateTimeouts {
            interception: Duration::from_secs(self.interception_timeout_seconds),
            readiness: Duration::from_secs(self.readiness_timeout_seconds),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Concurrent stage executions across requests within one process.
    ///
    /// Separate CLI invocations do not share this cap. Across processes the
    /// gate is limited to one browser by the profile lock, and a stage is
    /// started at most once by the store's conditional claim.
    pub max_concurrent_sessions: usize,
    /// Overall deadline for one stage execution
    pub stage_deadline_seconds: u64,
    /// Age after which a running stage is considered abandoned
    pub stale_running_minutes: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: 2,
            stage_deadline_seconds: 900,
            stale_running_minutes: 30,
        }
    }
}

impl EngineConfig {
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            max_concurrent_sessions: self.max_concurrent_sessions.max(1),
            stage_deadline: Duration::from_secs(self.stage_deadline_seconds),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct IntegrationsConfig {
    pub rlog_cielo: Option<IntegrationCommand>,
    pub rlog_geral: Option<IntegrationCommand>,
    pub bringg: Option<IntegrationCommand>,
}

impl IntegrationsConfig {
    pub fn command_for(&self, stage: Stage) -> Option<&IntegrationCommand> {
        match stage {
            Stage::BrasilRisk => None,
            Stage::RlogCielo => self.rlog_cielo.as_ref(),
            Stage::RlogGeral => self.rlog_geral.as_ref(),
            Stage::Bringg => self.bringg.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UploadsConfig {
    pub dir: PathBuf,
    /// Files older than this are removed by `cleanup-uploads`
    pub retention_days: u64,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".courier-onboarding/uploads"),
            retention_days: 7,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level used when RUST_LOG is not set
    pub log_level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: true,
        }
    }
}

impl OnboardingConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (courier-onboarding.toml, .courier-onboarding-rc)
    /// 3. Environment variables (prefixed with COURIER_ONBOARDING_, `__` between sections)
    /// 4. Runtime directory overrides (CCR_RUNTIME_DIR, CCR_DB_PATH, CCR_PW_PROFILE_DIR, CCR_UPLOADS_DIR)
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if Path::new("courier-onboarding.toml").exists() {
            builder = builder.add_source(File::with_name("courier-onboarding"));
        }

        if Path::new(".courier-onboarding-rc").exists() {
            builder = builder.add_source(
                File::with_name(".courier-onboarding-rc").format(config::FileFormat::Toml),
            );
        }

        builder = builder.add_source(
            Environment::with_prefix("COURIER_ONBOARDING")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("automation.interception_hints")
                .try_parsing(true),
        );

        let mut loaded: OnboardingConfig = builder.build()?.try_deserialize()?;
        loaded.apply_runtime_overrides(|key| std::env::var(key).ok());
        Ok(loaded)
    }

    /// Load a single TOML file on top of the defaults.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config = Config::builder()
            .add_source(Config::try_from(&Self::default())?)
            .add_source(File::from(path).format(config::FileFormat::Toml))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Apply the runtime directory variables used by existing deployments.
    pub fn apply_runtime_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("CCR_RUNTIME_DIR").filter(|d| !d.is_empty()) {
            let dir = PathBuf::from(dir);
            self.store.url = format!("sqlite://{}", dir.join("onboarding.db").display());
            self.automation.profile_dir = dir.join("pw-profile");
            self.uploads.dir = dir.join("uploads");
        }
        if let Some(db) = lookup("CCR_DB_PATH").filter(|d| !d.is_empty()) {
            self.store.url = format!("sqlite://{db}");
        }
        if let Some(profile) = lookup("CCR_PW_PROFILE_DIR").filter(|d| !d.is_empty()) {
            self.automation.profile_dir = PathBuf::from(profile);
        }
        if let Some(uploads) = lookup("CCR_UPLOADS_DIR").filter(|d| !d.is_empty()) {
            self.uploads.dir = PathBuf::from(uploads);
        }
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<OnboardingConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        // Load .env file first
        let _ = OnboardingConfig::load_env_file();
        OnboardingConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static OnboardingConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

/// Initialize configuration (called at startup)
pub fn init_config() -> Result<()> {
    let _config = config()?;
    tracing::info!("Configuration loaded successfully");
    Ok(())
}
