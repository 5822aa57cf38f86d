//! Mission-list management for an ability framework.
//!
//! A [`MissionListManager`] tracks one user's running abilities as missions
//! grouped into ordered lists, resolves launch modes (standard, singleton,
//! specified) against them, and drives ability lifecycle transitions through
//! an injected scheduler. All waiting on remote processes is modeled as
//! re-entry: a request issues at most one lifecycle command and returns, and
//! the completion comes back later through a `dispatch_*` or `on_*` entry
//! point keyed by record id.

pub mod ability;
pub mod config;
pub mod error;
pub mod mission;
pub mod services;
pub mod want;

pub use ability::{
    AbilityInfo, AbilityRecord, AbilityRequest, AbilityState, AbilityType, AppState,
    ApplicationInfo, ForegroundFailure, LaunchMode, LaunchReason, PendingState, RecordId,
    TransactionState,
};
pub use config::MissionConfig;
pub use error::{AmsError, Result};
pub use mission::{
    InnerMissionInfo, Mission, MissionCollaborators, MissionId, MissionInfo, MissionList,
    MissionListManager, MissionListType, TimeoutMessage,
};
pub use services::{
    AbilityScheduler, LifecycleCommand, MissionListener, MissionListenerController, MissionStore,
    ResourceReporter, WindowHandler,
};
pub use want::Want;
