use crate::ability::{AbilityRecord, LaunchMode};

use super::list::ListId;

pub type MissionId = i32;

/// A tracked task entry binding one ability record to a position in a
/// mission list. Survives background/foreground cycles and process death so
/// a "recent tasks" style UI can reattach to it.
#[derive(Debug)]
pub struct Mission {
    id: MissionId,
    name: String,
    record: AbilityRecord,
    /// Flag assigned by the application during SPECIFIED resolution; the
    /// reuse lookup key for later wants naming the same component.
    pub specified_flag: Option<String>,
    /// Listeners still need a created notification for this mission.
    pub need_notify: bool,
    pub locked: bool,
    /// Marked by a bundle uninstall; removal is deferred to the next
    /// lifecycle event so a list being dispatched is never mutated under it.
    pub uninstall_pending: bool,
    list: Option<ListId>,
}

impl Mission {
    pub fn new(id: MissionId, name: impl Into<String>, record: AbilityRecord) -> Self {
        let specified_flag = record.specified_flag.clone();
        Self {
            id,
            name: name.into(),
            record,
            specified_flag,
            need_notify: true,
            locked: false,
            uninstall_pending: false,
            list: None,
        }
    }

    pub fn id(&self) -> MissionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn record(&self) -> &AbilityRecord {
        &self.record
    }

    pub fn record_mut(&mut self) -> &mut AbilityRecord {
        &mut self.record
    }

    pub fn into_record(self) -> AbilityRecord {
        self.record
    }

    pub fn launch_mode(&self) -> LaunchMode {
        self.record.info.launch_mode
    }

    pub fn is_singleton(&self) -> bool {
        self.launch_mode() == LaunchMode::Singleton
    }

    pub fn list(&self) -> Option<ListId> {
        self.list
    }

    pub fn set_list(&mut self, list: Option<ListId>) {
        self.list = list;
    }
}
