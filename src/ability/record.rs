use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::want::{FLAG_ABILITY_CONTINUATION, PARAM_ABILITY_RECOVERY_RESTART, Want};

use super::state::{AbilityState, PendingState};

pub type RecordId = i64;

/// Policy governing whether a start request creates a new instance or
/// reuses an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchMode {
    #[default]
    Standard,
    Singleton,
    Specified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbilityType {
    #[default]
    Page,
    Service,
    Data,
}

/// Why the current launch happened, delivered to the application so it can
/// distinguish a cold start from continuation or crash recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchReason {
    #[default]
    StartAbility,
    Continuation,
    AppRecovery,
}

/// Coarse process state reported by the app manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppState {
    #[default]
    Begin,
    Foreground,
    Background,
    Terminated,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbilityInfo {
    pub bundle_name: String,
    pub module_name: String,
    pub name: String,
    pub launch_mode: LaunchMode,
    pub ability_type: AbilityType,
    pub is_stage_based_model: bool,
    pub exclude_from_missions: bool,
    pub remove_mission_after_terminate: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationInfo {
    pub bundle_name: String,
    pub uid: i32,
    pub is_launcher_app: bool,
}

/// A resolved start request handed to the manager by the service layer.
#[derive(Debug, Clone, Default)]
pub struct AbilityRequest {
    pub want: Want,
    pub ability_info: AbilityInfo,
    pub app_info: ApplicationInfo,
    pub caller: Option<RecordId>,
    /// Filled in during phase 2 of SPECIFIED resolution.
    pub specified_flag: Option<String>,
}

impl AbilityRequest {
    pub fn launch_mode(&self) -> LaunchMode {
        self.ability_info.launch_mode
    }

    pub fn element(&self) -> (&str, &str, &str) {
        (
            &self.ability_info.bundle_name,
            &self.ability_info.module_name,
            &self.ability_info.name,
        )
    }

    pub fn mission_name(&self) -> String {
        format!(
            "{}:{}:{}",
            self.ability_info.bundle_name, self.ability_info.module_name, self.ability_info.name
        )
    }
}

/// One runtime instance of an ability: its lifecycle state, pending state
/// and the flags the manager needs to reconcile it with its mission.
#[derive(Debug)]
pub struct AbilityRecord {
    id: RecordId,
    pub want: Want,
    pub info: AbilityInfo,
    pub app_info: ApplicationInfo,
    state: AbilityState,
    pub pending_state: PendingState,
    pub is_new_want: bool,
    pub launch_reason: LaunchReason,
    pub terminating: bool,
    pub starting_window: bool,
    pub uninstalling: bool,
    /// True once the remote process attached its scheduler.
    pub loaded: bool,
    pub app_state: AppState,
    pub recovery_enabled: bool,
    pub specified_flag: Option<String>,
    pub start_time: DateTime<Utc>,
    // Touched by the window subsystem thread, hence the explicit guard.
    session_token: Mutex<Option<u64>>,
}

impl AbilityRecord {
    pub fn new(id: RecordId, request: &AbilityRequest) -> Self {
        Self {
            id,
            want: request.want.clone(),
            info: request.ability_info.clone(),
            app_info: request.app_info.clone(),
            state: AbilityState::Initial,
            pending_state: PendingState::None,
            is_new_want: false,
            launch_reason: LaunchReason::StartAbility,
            terminating: false,
            starting_window: false,
            uninstalling: false,
            loaded: false,
            app_state: AppState::Begin,
            recovery_enabled: false,
            specified_flag: request.specified_flag.clone(),
            start_time: Utc::now(),
            session_token: Mutex::new(None),
        }
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn state(&self) -> AbilityState {
        self.state
    }

    /// Direct assignment for locally driven transitions; no remote
    /// round-trip involved.
    pub fn set_state(&mut self, state: AbilityState) {
        self.state = state;
    }

    /// State as seen by non-stage-model callers, which only know
    /// Active/Inactive.
    pub fn reported_state(&self) -> AbilityState {
        if self.info.is_stage_based_model {
            return self.state;
        }
        match self.state {
            AbilityState::Foreground | AbilityState::Foregrounding => AbilityState::Active,
            AbilityState::Background | AbilityState::Backgrounding => AbilityState::Inactive,
            other => other,
        }
    }

    pub fn element(&self) -> (&str, &str, &str) {
        (&self.info.bundle_name, &self.info.module_name, &self.info.name)
    }

    pub fn matches_want(&self, want: &Want) -> bool {
        self.info.bundle_name == want.bundle_name
            && self.info.name == want.ability_name
            && self.info.module_name == want.module_name
            && self.want.device_id == want.device_id
    }

    pub fn is_launcher(&self) -> bool {
        self.app_info.is_launcher_app
    }

    pub fn is_data_ability(&self) -> bool {
        self.info.ability_type == AbilityType::Data
    }

    /// Derives the launch reason delivered with the next lifecycle command.
    /// Continuation wins over recovery, recovery over a plain start.
    pub fn update_launch_reason(&mut self, want: &Want) {
        if want.has_flag(FLAG_ABILITY_CONTINUATION) {
            self.launch_reason = LaunchReason::Continuation;
        } else if want.bool_param(PARAM_ABILITY_RECOVERY_RESTART) {
            self.launch_reason = LaunchReason::AppRecovery;
        } else if self.recovery_enabled {
            self.launch_reason = LaunchReason::AppRecovery;
        } else {
            self.launch_reason = LaunchReason::StartAbility;
        }
    }

    /// Drops every trace of the dead process so a future foreground request
    /// starts it fresh. The mission itself survives.
    pub fn clear_process_linkage(&mut self) {
        self.loaded = false;
        self.state = AbilityState::Initial;
        self.pending_state = PendingState::None;
        self.terminating = false;
        self.starting_window = false;
        self.app_state = AppState::Terminated;
        *self.session_token.lock() = None;
    }

    pub fn set_session_token(&self, token: Option<u64>) {
        *self.session_token.lock() = token;
    }

    pub fn session_token(&self) -> Option<u64> {
        *self.session_token.lock()
    }
}
