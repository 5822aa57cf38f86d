use std::collections::VecDeque;

use super::mission::MissionId;

pub type ListId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissionListType {
    /// A dynamically created standard-launch chain.
    Current,
    DefaultStandard,
    DefaultSingle,
    Launcher,
}

/// One switchable task stack: an ordered group of missions, front = most
/// recently active.
#[derive(Debug)]
pub struct MissionList {
    id: ListId,
    kind: MissionListType,
    missions: VecDeque<MissionId>,
}

impl MissionList {
    pub fn new(id: ListId, kind: MissionListType) -> Self {
        Self {
            id,
            kind,
            missions: VecDeque::new(),
        }
    }

    pub fn id(&self) -> ListId {
        self.id
    }

    pub fn kind(&self) -> MissionListType {
        self.kind
    }

    /// Inserts at the front, relocating the mission if it is already a
    /// member. The dominant mutation on a list.
    pub fn add_mission_to_top(&mut self, mission: MissionId) {
        self.remove_mission(mission);
        self.missions.push_front(mission);
    }

    pub fn remove_mission(&mut self, mission: MissionId) -> bool {
        if let Some(pos) = self.missions.iter().position(|&m| m == mission) {
            self.missions.remove(pos);
            return true;
        }
        false
    }

    pub fn top(&self) -> Option<MissionId> {
        self.missions.front().copied()
    }

    pub fn bottom(&self) -> Option<MissionId> {
        self.missions.back().copied()
    }

    pub fn contains(&self, mission: MissionId) -> bool {
        self.missions.contains(&mission)
    }

    pub fn is_empty(&self) -> bool {
        self.missions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.missions.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = MissionId> + '_ {
        self.missions.iter().copied()
    }

    /// Tail-first iteration, used by LRU eviction.
    pub fn iter_lru(&self) -> impl Iterator<Item = MissionId> + '_ {
        self.missions.iter().rev().copied()
    }
}
