mod record;
mod state;

pub use record::{
    AbilityInfo, AbilityRecord, AbilityRequest, AbilityType, AppState, ApplicationInfo,
    LaunchMode, LaunchReason, RecordId,
};
pub use state::{AbilityState, ForegroundFailure, PendingState, TransactionState};
