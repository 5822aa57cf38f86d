use std::sync::Arc;

use tracing::debug;

use crate::ability::{AbilityInfo, RecordId};
use crate::mission::{InnerMissionInfo, MissionId};
use crate::want::Want;

/// Lifecycle command pushed to the remote ability process. Fire-and-forget:
/// the completion re-enters the manager through its dispatch entry points.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleCommand {
    Load { want: Want, ability: AbilityInfo },
    Foreground,
    Background,
    Terminate,
}

/// Proxy to the remote ability scheduler.
pub trait AbilityScheduler {
    fn schedule(&self, record: RecordId, command: LifecycleCommand);

    /// Asks the application which existing instance (if any) a
    /// SPECIFIED-mode want should join; the answer arrives later via
    /// `MissionListManager::on_accept_want_response`.
    fn start_specified_ability(&self, want: &Want);
}

/// Key-value persistence for mission metadata, keyed by mission id.
pub trait MissionStore {
    fn generate_mission_id(&self) -> MissionId;
    fn get(&self, mission_id: MissionId) -> Option<InnerMissionInfo>;
    fn update(&self, info: InnerMissionInfo);
    fn delete(&self, mission_id: MissionId);
}

/// Narrow window-service surface the manager needs: dismissing a starting
/// window that will never be replaced by a real one.
pub trait WindowHandler {
    fn cancel_starting_window(&self, record: RecordId);
}

/// UI-facing mission-change notifications. All methods are fire-and-forget.
pub trait MissionListener {
    fn on_mission_created(&self, _mission_id: MissionId) {}
    fn on_mission_changed(&self, _mission_id: MissionId) {}
    fn on_mission_destroyed(&self, _mission_id: MissionId) {}
}

/// Best-effort telemetry sink for ability starts.
pub trait ResourceReporter {
    fn report_ability_start(&self, bundle_name: &str, ability_name: &str);
}

/// Fans mission events out to registered listeners. The manager tolerates
/// having no controller at all; the controller tolerates having no
/// listeners.
#[derive(Default)]
pub struct MissionListenerController {
    listeners: Vec<Arc<dyn MissionListener>>,
}

impl MissionListenerController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, listener: Arc<dyn MissionListener>) {
        if self
            .listeners
            .iter()
            .any(|existing| Arc::ptr_eq(existing, &listener))
        {
            debug!("listener already registered");
            return;
        }
        self.listeners.push(listener);
    }

    pub fn unregister(&mut self, listener: &Arc<dyn MissionListener>) {
        self.listeners
            .retain(|existing| !Arc::ptr_eq(existing, listener));
    }

    pub fn notify_mission_created(&self, mission_id: MissionId) {
        debug!(mission_id, "notify mission created");
        for listener in &self.listeners {
            listener.on_mission_created(mission_id);
        }
    }

    pub fn notify_mission_changed(&self, mission_id: MissionId) {
        for listener in &self.listeners {
            listener.on_mission_changed(mission_id);
        }
    }

    pub fn notify_mission_destroyed(&self, mission_id: MissionId) {
        debug!(mission_id, "notify mission destroyed");
        for listener in &self.listeners {
            listener.on_mission_destroyed(mission_id);
        }
    }
}
