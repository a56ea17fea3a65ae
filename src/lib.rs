// Courier Onboarding Library - staged workflow for courier registration
// This exposes the core components for the CLI, tests and integration

pub mod automation;
pub mod cli;
pub mod config;
pub mod domain;
pub mod shutdown;
pub mod stages;
pub mod store;
pub mod telemetry;
pub mod uploads;
pub mod validators;
pub mod workflow;

// Re-export key types for easy access
pub use config::{config, init_config, OnboardingConfig};
pub use domain::{
    derive_overall, OverallStatus, RequestId, RequestSnapshot, Stage, StageStatus,
};
pub use shutdown::ShutdownCoordinator;
pub use stages::{ExecutorRegistry, StageExecutor, StageOutcome};
pub use store::{InMemoryStore, RecordStore, StoreError};
pub use telemetry::{create_stage_span, generate_correlation_id, init_telemetry};
pub use workflow::{ResultCode, WorkflowEngine, WorkflowError};
