use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ability::{AbilityState, LaunchMode};

use super::mission::MissionId;

/// The persisted shape of a mission, stored by the injected mission store
/// keyed by mission id. Survives manager restarts so singleton missions
/// keep their ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InnerMissionInfo {
    pub mission_id: MissionId,
    pub mission_name: String,
    pub launch_mode: LaunchMode,
    pub bundle_name: String,
    pub module_name: String,
    pub ability_name: String,
    pub specified_flag: Option<String>,
    /// Last time the mission reached foreground.
    pub time: DateTime<Utc>,
    pub locked: bool,
    pub uid: i32,
}

/// The caller-facing snapshot returned by mission queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionInfo {
    pub mission_id: MissionId,
    pub mission_name: String,
    pub bundle_name: String,
    pub ability_name: String,
    pub time: DateTime<Utc>,
    /// True while the ability's process is attached.
    pub running: bool,
    pub locked: bool,
    pub ability_state: AbilityState,
}
