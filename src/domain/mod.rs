// Domain model for onboarding requests
// Statuses are typed everywhere; strings only exist at the persistence edge.

pub mod event;
pub mod intake;
pub mod request;
pub mod stage;
pub mod status;

pub use event::{Event, EventLevel, NewEvent};
pub use intake::{DriverData, IntakeDocument};
pub use request::{
    Applicant, CourierRole, NewRequest, RequestId, RequestKind, RequestSnapshot, StageFields,
    StageRecord, StageStatuses, Vehicle,
};
pub use stage::Stage;
pub use status::{derive_overall, OverallStatus, StageStatus, UnknownStatus};
