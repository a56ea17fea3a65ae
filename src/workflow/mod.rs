pub mod engine;
pub mod errors;
pub mod lifecycle;
pub mod locks;

pub use engine::{
    EngineSettings, ReclaimedStage, StageLine, StageRunReport, StatusView, WorkflowEngine,
};
pub use errors::{ResultCode, WorkflowError};
pub use lifecycle::{transition, StageEvent, TransitionError};
pub use locks::RequestLocks;
