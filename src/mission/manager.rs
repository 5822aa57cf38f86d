use std::collections::{HashMap, VecDeque};
use std::fmt::Write as _;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::ability::{
    AbilityRecord, AbilityRequest, AbilityState, AppState, ForegroundFailure, LaunchMode,
    PendingState, RecordId, TransactionState,
};
use crate::config::MissionConfig;
use crate::error::{AmsError, Result};
use crate::services::{
    AbilityScheduler, LifecycleCommand, MissionListener, MissionListenerController, MissionStore,
    ResourceReporter, WindowHandler,
};
use crate::want::Want;

use super::info::{InnerMissionInfo, MissionInfo};
use super::list::{ListId, MissionList, MissionListType};
use super::mission::{Mission, MissionId};

/// Timeout events correlated with an earlier remote request. The single
/// cancellation funnel: every case leaves the affected record in a
/// well-defined state instead of stuck mid-transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutMessage {
    Load,
    Foreground,
    SpecifiedStart,
}

/// External collaborators injected at construction so the core stays
/// testable with fakes and user-scoped managers share no global state.
pub struct MissionCollaborators {
    pub scheduler: Arc<dyn AbilityScheduler>,
    pub store: Arc<dyn MissionStore>,
    pub window: Option<Arc<dyn WindowHandler>>,
    pub reporter: Option<Arc<dyn ResourceReporter>>,
}

struct TerminatingAbility {
    record: AbilityRecord,
    mission_id: MissionId,
}

enum RecordLocation {
    Mission(MissionId),
    Terminating(usize),
}

/// The scheduler over one user's mission lists.
///
/// All entry points are expected to run on one handler thread. Waiting for
/// the remote process is modeled as returning to the event loop and being
/// re-entered through `dispatch_*` / `on_*` keyed by record id.
pub struct MissionListManager {
    user_id: i32,
    config: MissionConfig,
    scheduler: Arc<dyn AbilityScheduler>,
    store: Arc<dyn MissionStore>,
    window: Option<Arc<dyn WindowHandler>>,
    reporter: Option<Arc<dyn ResourceReporter>>,
    missions: HashMap<MissionId, Mission>,
    lists: HashMap<ListId, MissionList>,
    /// Most-recently-used list first. Seeded with the launcher list.
    current_lists: VecDeque<ListId>,
    launcher_list: ListId,
    default_standard_list: ListId,
    default_single_list: ListId,
    /// SPECIFIED-mode requests awaiting the application's flag decision.
    waiting_queue: VecDeque<AbilityRequest>,
    /// Records that began terminating but are not yet confirmed destroyed.
    terminating: Vec<TerminatingAbility>,
    listener_controller: Option<MissionListenerController>,
    next_record_id: RecordId,
    next_list_id: ListId,
    initialized: bool,
}

impl MissionListManager {
    pub fn new(
        user_id: i32,
        config: MissionConfig,
        collaborators: MissionCollaborators,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            user_id,
            config,
            scheduler: collaborators.scheduler,
            store: collaborators.store,
            window: collaborators.window,
            reporter: collaborators.reporter,
            missions: HashMap::new(),
            lists: HashMap::new(),
            current_lists: VecDeque::new(),
            launcher_list: 0,
            default_standard_list: 0,
            default_single_list: 0,
            waiting_queue: VecDeque::new(),
            terminating: Vec::new(),
            listener_controller: None,
            next_record_id: 1,
            next_list_id: 1,
            initialized: false,
        })
    }

    /// Creates the three built-in lists and the listener controller. The
    /// built-in lists persist for the manager's lifetime.
    pub fn init(&mut self) {
        if self.initialized {
            return;
        }
        self.launcher_list = self.create_list(MissionListType::Launcher);
        self.default_standard_list = self.create_list(MissionListType::DefaultStandard);
        self.default_single_list = self.create_list(MissionListType::DefaultSingle);
        self.current_lists.push_back(self.launcher_list);
        self.listener_controller = Some(MissionListenerController::new());
        self.initialized = true;
        debug!(user_id = self.user_id, "mission list manager initialized");
    }

    pub fn user_id(&self) -> i32 {
        self.user_id
    }

    pub fn register_mission_listener(&mut self, listener: Arc<dyn MissionListener>) -> Result<()> {
        let Some(controller) = self.listener_controller.as_mut() else {
            return Err(AmsError::NotInitialized);
        };
        controller.register(listener);
        Ok(())
    }

    pub fn unregister_mission_listener(
        &mut self,
        listener: &Arc<dyn MissionListener>,
    ) -> Result<()> {
        let Some(controller) = self.listener_controller.as_mut() else {
            return Err(AmsError::NotInitialized);
        };
        controller.unregister(listener);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Start / launch-mode resolution
    // ---------------------------------------------------------------------

    pub fn start_ability(&mut self, request: AbilityRequest) -> Result<()> {
        if !self.initialized {
            return Err(AmsError::NotInitialized);
        }
        info!(
            user_id = self.user_id,
            want = %request.want,
            launch_mode = ?request.launch_mode(),
            "start ability"
        );
        if let Some(reporter) = &self.reporter {
            reporter.report_ability_start(
                &request.ability_info.bundle_name,
                &request.ability_info.name,
            );
        }
        // SPECIFIED resolution is two-phase: park the request and ask the
        // application which instance the want should join.
        if request.launch_mode() == LaunchMode::Specified && request.specified_flag.is_none() {
            self.enqueue_waiting_ability(request);
            return Ok(());
        }
        self.start_ability_locked(request)
    }

    fn enqueue_waiting_ability(&mut self, request: AbilityRequest) {
        let was_idle = self.waiting_queue.is_empty();
        debug!(want = %request.want, "enqueue specified ability");
        self.waiting_queue.push_back(request);
        if was_idle {
            if let Some(front) = self.waiting_queue.front() {
                self.scheduler.start_specified_ability(&front.want);
            }
        }
    }

    fn start_ability_locked(&mut self, request: AbilityRequest) -> Result<()> {
        let (mission_id, reused) = self.get_target_mission(&request)?;
        self.foreground_resolved_mission(mission_id, &request, reused)
    }

    /// Final leg of a start: reorder lists, refresh the record's launch
    /// bookkeeping and issue the load or foreground command.
    fn foreground_resolved_mission(
        &mut self,
        mission_id: MissionId,
        request: &AbilityRequest,
        reused: bool,
    ) -> Result<()> {
        self.ensure_mission_in_current(mission_id);
        self.promote_mission(mission_id);
        let scheduler = Arc::clone(&self.scheduler);
        let Some(mission) = self.missions.get_mut(&mission_id) else {
            return Err(AmsError::Inner("target mission vanished during start"));
        };
        let record = mission.record_mut();
        record.update_launch_reason(&request.want);
        if reused {
            record.is_new_want = true;
            record.want = request.want.clone();
        }
        let record_id = record.id();
        if record.state() == AbilityState::Terminating {
            return Err(AmsError::InvalidValue("target ability is terminating"));
        }
        if record.state().in_transition() {
            // One in-flight command per record; queue the intent instead.
            record.pending_state = PendingState::Foreground;
            return Ok(());
        }
        if !record.loaded {
            debug!(record_id, mission_id, "loading ability");
            scheduler.schedule(
                record_id,
                LifecycleCommand::Load {
                    want: record.want.clone(),
                    ability: record.info.clone(),
                },
            );
        } else if record.state() != AbilityState::Foreground || record.is_new_want {
            record.set_state(AbilityState::Foregrounding);
            scheduler.schedule(record_id, LifecycleCommand::Foreground);
        }
        Ok(())
    }

    fn get_target_mission(&mut self, request: &AbilityRequest) -> Result<(MissionId, bool)> {
        match request.launch_mode() {
            LaunchMode::Singleton => {
                if let Some(mission_id) = self.get_reused_mission(request) {
                    debug!(mission_id, "reusing singleton mission");
                    return Ok((mission_id, true));
                }
                let target = if request.app_info.is_launcher_app {
                    self.launcher_list
                } else {
                    self.ensure_capacity()?;
                    self.default_single_list
                };
                Ok((self.create_mission(request, target), false))
            }
            LaunchMode::Specified => {
                if let Some(flag) = request.specified_flag.as_deref() {
                    if let Some(mission_id) = self.get_mission_by_specified_flag(&request.want, flag)
                    {
                        debug!(mission_id, flag, "reusing specified mission");
                        return Ok((mission_id, true));
                    }
                }
                self.ensure_capacity()?;
                let target = self.standard_chain_target(request);
                Ok((self.create_mission(request, target), false))
            }
            LaunchMode::Standard => {
                self.ensure_capacity()?;
                let target = self.standard_chain_target(request);
                Ok((self.create_mission(request, target), false))
            }
        }
    }

    /// SINGLETON reuse: one mission per (bundle, module, ability) key.
    /// Search order is launcher list, current lists, default-singleton list;
    /// first match wins.
    fn get_reused_mission(&self, request: &AbilityRequest) -> Option<MissionId> {
        let element = request.element();
        let mut order: Vec<ListId> = vec![self.launcher_list];
        order.extend(self.current_lists.iter().copied());
        order.push(self.default_single_list);
        for list_id in order {
            let Some(list) = self.lists.get(&list_id) else {
                continue;
            };
            for mission_id in list.iter() {
                let Some(mission) = self.missions.get(&mission_id) else {
                    continue;
                };
                let record = mission.record();
                if record.info.launch_mode == LaunchMode::Singleton
                    && !record.terminating
                    && record.element() == element
                {
                    return Some(mission_id);
                }
            }
        }
        None
    }

    /// SPECIFIED reuse: the flag and the full component element must both
    /// match.
    pub fn get_mission_by_specified_flag(&self, want: &Want, flag: &str) -> Option<MissionId> {
        if flag.is_empty() {
            return None;
        }
        let mut order: Vec<ListId> = vec![self.launcher_list];
        order.extend(self.current_lists.iter().copied());
        order.push(self.default_standard_list);
        order.push(self.default_single_list);
        for list_id in order {
            let Some(list) = self.lists.get(&list_id) else {
                continue;
            };
            for mission_id in list.iter() {
                let Some(mission) = self.missions.get(&mission_id) else {
                    continue;
                };
                if mission.specified_flag.as_deref() == Some(flag)
                    && mission.record().matches_want(want)
                {
                    return Some(mission_id);
                }
            }
        }
        None
    }

    /// STANDARD chains: append to the caller's chain when the caller is on
    /// top of one, otherwise open a fresh list.
    fn standard_chain_target(&mut self, request: &AbilityRequest) -> ListId {
        if let Some(caller_id) = request.caller {
            if let Some(caller_mission) = self.mission_id_of_record(caller_id) {
                if let Some(list_id) =
                    self.missions.get(&caller_mission).and_then(Mission::list)
                {
                    if let Some(list) = self.lists.get(&list_id) {
                        if list.kind() == MissionListType::Current
                            && list.top() == Some(caller_mission)
                        {
                            return list_id;
                        }
                    }
                }
            }
        }
        let list_id = self.create_list(MissionListType::Current);
        self.current_lists.push_front(list_id);
        list_id
    }

    fn create_mission(&mut self, request: &AbilityRequest, target: ListId) -> MissionId {
        let mission_id = self.create_or_reused_mission_info(request);
        let record = AbilityRecord::new(self.alloc_record_id(), request);
        let mut mission = Mission::new(mission_id, request.mission_name(), record);
        mission.set_list(Some(target));
        debug!(mission_id, name = %mission.name(), "created mission");
        self.missions.insert(mission_id, mission);
        if let Some(list) = self.lists.get_mut(&target) {
            list.add_mission_to_top(mission_id);
        }
        mission_id
    }

    fn create_or_reused_mission_info(&mut self, request: &AbilityRequest) -> MissionId {
        let mission_id = self.store.generate_mission_id();
        let info = InnerMissionInfo {
            mission_id,
            mission_name: request.mission_name(),
            launch_mode: request.launch_mode(),
            bundle_name: request.ability_info.bundle_name.clone(),
            module_name: request.ability_info.module_name.clone(),
            ability_name: request.ability_info.name.clone(),
            specified_flag: request.specified_flag.clone(),
            time: Utc::now(),
            locked: false,
            uid: request.app_info.uid,
        };
        self.store.update(info);
        mission_id
    }

    /// Enforces the mission cap before a new non-launcher mission is
    /// created, evicting the least-recently-used eligible mission.
    fn ensure_capacity(&mut self) -> Result<()> {
        if self.non_launcher_mission_count() < self.config.max_missions {
            return Ok(());
        }
        let Some(victim) = self.find_lru_victim() else {
            warn!(
                limit = self.config.max_missions,
                "mission limit reached and no eligible eviction candidate"
            );
            return Err(AmsError::ReachToLimit);
        };
        info!(mission_id = victim, "evicting least recently used mission");
        self.destroy_mission(victim, true);
        if self.non_launcher_mission_count() >= self.config.max_missions {
            return Err(AmsError::ReachToLimit);
        }
        Ok(())
    }

    fn non_launcher_mission_count(&self) -> usize {
        let launcher = self
            .lists
            .get(&self.launcher_list)
            .map_or(0, MissionList::len);
        self.missions.len() - launcher
    }

    /// Tail of the least-recently-used current list first, then the default
    /// lists. Locked missions and missions with a foreground or terminating
    /// record are exempt.
    fn find_lru_victim(&self) -> Option<MissionId> {
        let mut order: Vec<ListId> = self
            .current_lists
            .iter()
            .rev()
            .filter(|&&l| l != self.launcher_list)
            .copied()
            .collect();
        order.push(self.default_standard_list);
        order.push(self.default_single_list);
        for list_id in order {
            let Some(list) = self.lists.get(&list_id) else {
                continue;
            };
            for mission_id in list.iter_lru() {
                let Some(mission) = self.missions.get(&mission_id) else {
                    continue;
                };
                let record = mission.record();
                if mission.locked || record.state().is_foreground() || record.terminating {
                    continue;
                }
                return Some(mission_id);
            }
        }
        None
    }

    // ---------------------------------------------------------------------
    // List mutations
    // ---------------------------------------------------------------------

    /// Detaches the mission from wherever it is and inserts it at the top
    /// of the launcher list (when the move comes from the launcher) or the
    /// given target list.
    pub fn move_mission_to_target_list(
        &mut self,
        is_call_from_launcher: bool,
        target_list: ListId,
        mission_id: MissionId,
    ) {
        self.detach_mission(mission_id);
        let dest = if is_call_from_launcher && self.lists.contains_key(&self.launcher_list) {
            self.launcher_list
        } else {
            target_list
        };
        self.attach_mission(dest, mission_id);
    }

    /// Relocates a minimized mission that is not on top of its list to the
    /// matching default list, so no stale middle-of-list entry remains.
    pub fn move_none_top_mission_to_default_list(&mut self, mission_id: MissionId) {
        let Some(mission) = self.missions.get(&mission_id) else {
            return;
        };
        let Some(list_id) = mission.list() else {
            return;
        };
        let Some(list) = self.lists.get(&list_id) else {
            return;
        };
        if list.kind() != MissionListType::Current || list.top() == Some(mission_id) {
            return;
        }
        self.relocate_mission_to_default(mission_id);
    }

    /// Reorders the collection of current lists so `list_id` is first.
    /// No-op when the list is empty or already topmost.
    pub fn move_mission_list_to_top(&mut self, list_id: ListId) {
        if self.lists.get(&list_id).map_or(true, MissionList::is_empty) {
            return;
        }
        if self.current_lists.front() == Some(&list_id) {
            return;
        }
        if let Some(pos) = self.current_lists.iter().position(|&l| l == list_id) {
            self.current_lists.remove(pos);
            self.current_lists.push_front(list_id);
        }
    }

    /// A mission parked in a default list gets its own fresh current list
    /// before it can come to the front; defaults never hold the top task.
    fn ensure_mission_in_current(&mut self, mission_id: MissionId) {
        let in_default = self
            .missions
            .get(&mission_id)
            .and_then(Mission::list)
            .and_then(|l| self.lists.get(&l))
            .is_some_and(|l| {
                matches!(
                    l.kind(),
                    MissionListType::DefaultStandard | MissionListType::DefaultSingle
                )
            });
        if in_default {
            let list_id = self.create_list(MissionListType::Current);
            self.current_lists.push_front(list_id);
            self.move_mission_to_target_list(false, list_id, mission_id);
        }
    }

    fn promote_mission(&mut self, mission_id: MissionId) {
        let Some(list_id) = self.missions.get(&mission_id).and_then(Mission::list) else {
            return;
        };
        if let Some(list) = self.lists.get_mut(&list_id) {
            list.add_mission_to_top(mission_id);
        }
        self.move_mission_list_to_top(list_id);
    }

    fn relocate_mission_to_default(&mut self, mission_id: MissionId) {
        let Some(mission) = self.missions.get(&mission_id) else {
            return;
        };
        let target = match mission.launch_mode() {
            LaunchMode::Singleton => self.default_single_list,
            LaunchMode::Standard | LaunchMode::Specified => self.default_standard_list,
        };
        if mission.list() == Some(target) {
            return;
        }
        debug!(mission_id, "relocating mission to default list");
        self.detach_mission(mission_id);
        self.attach_mission(target, mission_id);
    }

    /// Removes the mission from its list, pruning a standard-chain list
    /// that becomes empty. The back-reference is updated in the same step.
    fn detach_mission(&mut self, mission_id: MissionId) {
        let Some(mission) = self.missions.get_mut(&mission_id) else {
            return;
        };
        let Some(list_id) = mission.list() else {
            return;
        };
        mission.set_list(None);
        let mut prune = false;
        if let Some(list) = self.lists.get_mut(&list_id) {
            list.remove_mission(mission_id);
            prune = list.kind() == MissionListType::Current && list.is_empty();
        }
        if prune {
            self.lists.remove(&list_id);
            self.current_lists.retain(|&l| l != list_id);
        }
    }

    fn attach_mission(&mut self, list_id: ListId, mission_id: MissionId) {
        if let Some(list) = self.lists.get_mut(&list_id) {
            list.add_mission_to_top(mission_id);
            if let Some(mission) = self.missions.get_mut(&mission_id) {
                mission.set_list(Some(list_id));
            }
        }
    }

    // ---------------------------------------------------------------------
    // Minimize / terminate
    // ---------------------------------------------------------------------

    pub fn minimize_ability(&mut self, record_id: RecordId, from_user: bool) -> Result<()> {
        let scheduler = Arc::clone(&self.scheduler);
        let Some(record) = self.find_record_mut(record_id) else {
            return Err(AmsError::RecordNotFound(record_id));
        };
        match record.state() {
            AbilityState::Foregrounding => {
                record.pending_state = PendingState::Background;
                Ok(())
            }
            AbilityState::Foreground => {
                debug!(record_id, from_user, "minimizing ability");
                record.set_state(AbilityState::Backgrounding);
                scheduler.schedule(record_id, LifecycleCommand::Background);
                Ok(())
            }
            state => {
                debug!(record_id, %state, "minimize ignored; ability not foreground");
                Ok(())
            }
        }
    }

    pub fn terminate_ability(&mut self, record_id: RecordId) -> Result<()> {
        if self.terminating.iter().any(|t| t.record.id() == record_id) {
            debug!(record_id, "ability already terminating");
            return Ok(());
        }
        let Some(mission_id) = self.mission_id_of_record(record_id) else {
            return Err(AmsError::RecordNotFound(record_id));
        };
        info!(record_id, mission_id, "terminate ability");
        self.destroy_mission(mission_id, true);
        Ok(())
    }

    /// Full mission teardown. When `terminate_process` is set and the
    /// record has a live process, the record moves to the terminating list
    /// and confirmation arrives later via `dispatch_terminate`; otherwise
    /// destruction completes immediately.
    fn destroy_mission(&mut self, mission_id: MissionId, terminate_process: bool) {
        self.detach_mission(mission_id);
        let Some(mission) = self.missions.remove(&mission_id) else {
            return;
        };
        let mut record = mission.into_record();
        if terminate_process && record.loaded {
            record.terminating = true;
            let record_id = record.id();
            if record.state().in_transition() {
                // Deferred: the completion handler issues the command.
                self.terminating.push(TerminatingAbility { record, mission_id });
            } else {
                record.set_state(AbilityState::Terminating);
                self.terminating.push(TerminatingAbility { record, mission_id });
                self.scheduler.schedule(record_id, LifecycleCommand::Terminate);
            }
        } else {
            self.store.delete(mission_id);
            self.notify_destroyed(mission_id);
        }
    }

    // ---------------------------------------------------------------------
    // Remote completion dispatch
    // ---------------------------------------------------------------------

    pub fn ability_transaction_done(
        &mut self,
        record_id: RecordId,
        state: TransactionState,
    ) -> Result<()> {
        match state {
            TransactionState::Foreground => self.dispatch_foreground(record_id, true, None),
            TransactionState::ForegroundFailed(reason) => {
                self.dispatch_foreground(record_id, false, Some(reason))
            }
            TransactionState::Background => self.dispatch_background(record_id),
            TransactionState::Terminated => self.dispatch_terminate(record_id),
        }
    }

    pub fn dispatch_foreground(
        &mut self,
        record_id: RecordId,
        success: bool,
        failure: Option<ForegroundFailure>,
    ) -> Result<()> {
        let Some(record) = self.find_record(record_id) else {
            return Err(AmsError::RecordNotFound(record_id));
        };
        if record.state() != AbilityState::Foregrounding {
            warn!(
                record_id,
                state = %record.state(),
                "foreground completion arrived in unexpected state"
            );
            return Err(AmsError::InvalidValue(
                "dispatch foreground: ability not foregrounding",
            ));
        }
        if success {
            self.complete_foreground_success(record_id);
        } else {
            self.complete_foreground_failed(record_id, failure.unwrap_or(ForegroundFailure::Generic));
        }
        Ok(())
    }

    pub fn dispatch_background(&mut self, record_id: RecordId) -> Result<()> {
        let Some(record) = self.find_record(record_id) else {
            return Err(AmsError::RecordNotFound(record_id));
        };
        if record.state() != AbilityState::Backgrounding {
            warn!(
                record_id,
                state = %record.state(),
                "background completion arrived in unexpected state"
            );
            return Err(AmsError::InvalidValue(
                "dispatch background: ability not backgrounding",
            ));
        }
        self.complete_background(record_id);
        Ok(())
    }

    pub fn dispatch_terminate(&mut self, record_id: RecordId) -> Result<()> {
        let Some(index) = self
            .terminating
            .iter()
            .position(|t| t.record.id() == record_id)
        else {
            warn!(record_id, "terminate completion for record not in terminating list");
            return Err(AmsError::Inner(
                "dispatch terminate: record not in terminating list",
            ));
        };
        if self.terminating[index].record.state() != AbilityState::Terminating {
            return Err(AmsError::InvalidValue(
                "dispatch terminate: ability not terminating",
            ));
        }
        self.complete_terminate_and_update_mission(index);
        Ok(())
    }

    fn complete_foreground_success(&mut self, record_id: RecordId) {
        match self.locate_record(record_id) {
            Some(RecordLocation::Terminating(index)) => {
                self.issue_deferred_terminate(index);
            }
            Some(RecordLocation::Mission(mission_id)) => {
                let pending = {
                    let Some(mission) = self.missions.get_mut(&mission_id) else {
                        return;
                    };
                    let record = mission.record_mut();
                    record.set_state(AbilityState::Foreground);
                    record.starting_window = false;
                    record.is_new_want = false;
                    record.app_state = AppState::Foreground;
                    let pending = record.pending_state;
                    record.pending_state = PendingState::None;
                    pending
                };
                if let Some(mut inner) = self.store.get(mission_id) {
                    inner.time = Utc::now();
                    self.store.update(inner);
                }
                let first_time = self
                    .missions
                    .get_mut(&mission_id)
                    .map(|m| std::mem::take(&mut m.need_notify))
                    .unwrap_or(false);
                if first_time {
                    self.notify_created(mission_id);
                } else {
                    self.notify_changed(mission_id);
                }
                if pending == PendingState::Background {
                    self.issue_background(record_id);
                }
                self.start_waiting_ability();
            }
            None => warn!(record_id, "foreground completion for unknown record"),
        }
    }

    fn complete_foreground_failed(&mut self, record_id: RecordId, failure: ForegroundFailure) {
        warn!(record_id, ?failure, "foreground failed, demoting to background");
        match self.locate_record(record_id) {
            Some(RecordLocation::Terminating(index)) => {
                self.issue_deferred_terminate(index);
            }
            Some(RecordLocation::Mission(mission_id)) => {
                let cancel_window = {
                    let Some(mission) = self.missions.get_mut(&mission_id) else {
                        return;
                    };
                    let record = mission.record_mut();
                    record.set_state(AbilityState::Background);
                    record.pending_state = PendingState::None;
                    // Window freeze keeps the starting-window bookkeeping so
                    // a retry can reuse it.
                    let cancel =
                        failure != ForegroundFailure::WindowFreeze && record.starting_window;
                    if failure != ForegroundFailure::WindowFreeze {
                        record.starting_window = false;
                    }
                    cancel
                };
                if cancel_window {
                    if let Some(window) = &self.window {
                        window.cancel_starting_window(record_id);
                    }
                }
                self.notify_changed(mission_id);
                self.start_waiting_ability();
            }
            None => warn!(record_id, "foreground failure for unknown record"),
        }
    }

    fn complete_background(&mut self, record_id: RecordId) {
        match self.locate_record(record_id) {
            Some(RecordLocation::Terminating(index)) => {
                self.issue_deferred_terminate(index);
            }
            Some(RecordLocation::Mission(mission_id)) => {
                let pending = {
                    let Some(mission) = self.missions.get_mut(&mission_id) else {
                        return;
                    };
                    let record = mission.record_mut();
                    record.set_state(AbilityState::Background);
                    record.app_state = AppState::Background;
                    let pending = record.pending_state;
                    record.pending_state = PendingState::None;
                    pending
                };
                let uninstall_pending = self
                    .missions
                    .get(&mission_id)
                    .map(|m| m.uninstall_pending)
                    .unwrap_or(false);
                if uninstall_pending {
                    // Deferred uninstall removal happens here, never while a
                    // list walk is in progress.
                    self.destroy_mission(mission_id, true);
                    return;
                }
                self.move_none_top_mission_to_default_list(mission_id);
                self.notify_changed(mission_id);
                if pending == PendingState::Foreground {
                    self.issue_foreground(record_id);
                }
                self.start_waiting_ability();
            }
            None => warn!(record_id, "background completion for unknown record"),
        }
    }

    fn complete_terminate_and_update_mission(&mut self, index: usize) {
        let terminating = self.terminating.remove(index);
        debug!(
            record_id = terminating.record.id(),
            mission_id = terminating.mission_id,
            "ability terminated"
        );
        self.store.delete(terminating.mission_id);
        self.notify_destroyed(terminating.mission_id);
    }

    fn issue_foreground(&mut self, record_id: RecordId) {
        let scheduler = Arc::clone(&self.scheduler);
        if let Some(record) = self.find_record_mut(record_id) {
            record.set_state(AbilityState::Foregrounding);
            scheduler.schedule(record_id, LifecycleCommand::Foreground);
        }
    }

    fn issue_background(&mut self, record_id: RecordId) {
        let scheduler = Arc::clone(&self.scheduler);
        if let Some(record) = self.find_record_mut(record_id) {
            record.set_state(AbilityState::Backgrounding);
            scheduler.schedule(record_id, LifecycleCommand::Background);
        }
    }

    fn issue_deferred_terminate(&mut self, index: usize) {
        let record = &mut self.terminating[index].record;
        record.set_state(AbilityState::Terminating);
        record.pending_state = PendingState::None;
        let record_id = record.id();
        self.scheduler.schedule(record_id, LifecycleCommand::Terminate);
    }

    // ---------------------------------------------------------------------
    // Process attach / app state / death
    // ---------------------------------------------------------------------

    /// The remote process attached its scheduler; push the loading record
    /// on toward foreground.
    pub fn on_ability_request_done(&mut self, record_id: RecordId) -> Result<()> {
        let scheduler = Arc::clone(&self.scheduler);
        let Some(record) = self.find_record_mut(record_id) else {
            return Err(AmsError::RecordNotFound(record_id));
        };
        record.loaded = true;
        if record.state() == AbilityState::Initial {
            record.set_state(AbilityState::Foregrounding);
            scheduler.schedule(record_id, LifecycleCommand::Foreground);
        }
        Ok(())
    }

    pub fn on_app_state_changed(&mut self, bundle_name: &str, state: AppState) {
        debug!(bundle_name, ?state, "app state changed");
        for mission in self.missions.values_mut() {
            let record = mission.record_mut();
            if record.app_info.bundle_name == bundle_name {
                record.app_state = state;
            }
        }
        for terminating in &mut self.terminating {
            if terminating.record.app_info.bundle_name == bundle_name {
                terminating.record.app_state = state;
            }
        }
    }

    /// Unexpected process death is a first-class event with defined
    /// reconciliation, not an error path.
    pub fn on_ability_died(&mut self, record_id: RecordId) {
        if let Some(index) = self
            .terminating
            .iter()
            .position(|t| t.record.id() == record_id)
        {
            // Death confirms the destruction we were waiting for.
            self.complete_terminate_and_update_mission(index);
            return;
        }
        let Some(mission_id) = self.mission_id_of_record(record_id) else {
            warn!(record_id, "death report for unknown record");
            return;
        };
        let (is_data, is_launcher, loaded) = {
            let Some(mission) = self.missions.get(&mission_id) else {
                return;
            };
            let record = mission.record();
            (record.is_data_ability(), record.is_launcher(), record.loaded)
        };
        if is_data {
            debug!(record_id, "data ability death ignored");
            return;
        }
        if !loaded {
            debug!(record_id, "process already detached");
            return;
        }
        info!(record_id, mission_id, is_launcher, "ability died");
        if is_launcher {
            self.handle_launcher_died(mission_id);
        } else {
            self.handle_ability_died_by_default(mission_id);
        }
    }

    fn handle_launcher_died(&mut self, mission_id: MissionId) {
        let (is_root, was_foreground) = {
            let Some(mission) = self.missions.get(&mission_id) else {
                return;
            };
            (
                mission.list() == Some(self.launcher_list),
                mission.record().state().is_foreground(),
            )
        };
        if is_root && was_foreground {
            info!(mission_id, "foreground launcher died, restarting");
            if let Some(mission) = self.missions.get_mut(&mission_id) {
                mission.record_mut().clear_process_linkage();
            }
            self.back_to_launcher();
        } else {
            self.handle_ability_died_by_default(mission_id);
        }
    }

    /// A dead ability's mission is retained for recent-tasks reattachment
    /// unless it asked to be removed after terminate, is excluded from
    /// missions, or its bundle is pending uninstall.
    fn handle_ability_died_by_default(&mut self, mission_id: MissionId) {
        let (remove, was_foreground) = {
            let Some(mission) = self.missions.get(&mission_id) else {
                return;
            };
            let record = mission.record();
            (
                record.info.remove_mission_after_terminate
                    || record.info.exclude_from_missions
                    || mission.uninstall_pending,
                record.state().is_foreground(),
            )
        };
        if remove {
            self.destroy_mission(mission_id, false);
        } else {
            if let Some(mission) = self.missions.get_mut(&mission_id) {
                mission.record_mut().clear_process_linkage();
            }
            self.notify_changed(mission_id);
        }
        if was_foreground {
            self.back_to_launcher();
        }
    }

    /// Brings the launcher-root mission back to the foreground, reloading
    /// its process if it is gone.
    pub fn back_to_launcher(&mut self) {
        let Some(mission_id) = self.lists.get(&self.launcher_list).and_then(MissionList::top)
        else {
            warn!("no launcher mission to restore");
            return;
        };
        self.move_mission_list_to_top(self.launcher_list);
        let scheduler = Arc::clone(&self.scheduler);
        let Some(mission) = self.missions.get_mut(&mission_id) else {
            return;
        };
        let record = mission.record_mut();
        let record_id = record.id();
        if !record.loaded {
            debug!(record_id, "reloading launcher");
            scheduler.schedule(
                record_id,
                LifecycleCommand::Load {
                    want: record.want.clone(),
                    ability: record.info.clone(),
                },
            );
        } else if record.state().in_transition() {
            record.pending_state = PendingState::Foreground;
        } else if record.state() != AbilityState::Foreground {
            record.set_state(AbilityState::Foregrounding);
            scheduler.schedule(record_id, LifecycleCommand::Foreground);
        }
    }

    // ---------------------------------------------------------------------
    // Timeouts
    // ---------------------------------------------------------------------

    pub fn on_time_out(&mut self, msg: TimeoutMessage, record_id: RecordId) {
        match msg {
            TimeoutMessage::Load => self.handle_load_timeout(record_id),
            TimeoutMessage::Foreground => self.handle_foreground_timeout(record_id),
            TimeoutMessage::SpecifiedStart => self.handle_specified_timeout(),
        }
    }

    fn handle_load_timeout(&mut self, record_id: RecordId) {
        let Some(mission_id) = self.mission_id_of_record(record_id) else {
            warn!(record_id, "load timeout for unknown record");
            return;
        };
        let cancel = {
            let Some(mission) = self.missions.get(&mission_id) else {
                return;
            };
            let record = mission.record();
            if record.loaded {
                debug!(record_id, "stale load timeout ignored");
                return;
            }
            warn!(record_id, mission_id, "ability load timed out");
            record.starting_window && record.state() != AbilityState::Foregrounding
        };
        if cancel {
            if let Some(window) = &self.window {
                window.cancel_starting_window(record_id);
            }
        }
        // The process never came up; fall through to default teardown.
        self.destroy_mission(mission_id, false);
        self.back_to_launcher();
    }

    fn handle_foreground_timeout(&mut self, record_id: RecordId) {
        let Some(mission_id) = self.mission_id_of_record(record_id) else {
            warn!(record_id, "foreground timeout for unknown record");
            return;
        };
        let cancel = {
            let Some(mission) = self.missions.get_mut(&mission_id) else {
                return;
            };
            let record = mission.record_mut();
            if record.state() != AbilityState::Foregrounding {
                debug!(record_id, "stale foreground timeout ignored");
                return;
            }
            warn!(record_id, mission_id, "ability foreground timed out");
            record.set_state(AbilityState::Background);
            record.pending_state = PendingState::None;
            let cancel = record.starting_window;
            record.starting_window = false;
            cancel
        };
        if cancel {
            if let Some(window) = &self.window {
                window.cancel_starting_window(record_id);
            }
        }
        self.notify_changed(mission_id);
        self.back_to_launcher();
        self.start_waiting_ability();
    }

    fn handle_specified_timeout(&mut self) {
        if let Some(request) = self.waiting_queue.pop_front() {
            warn!(want = %request.want, "specified ability start timed out");
        }
        self.start_waiting_ability();
    }

    // ---------------------------------------------------------------------
    // SPECIFIED resolution phase 2
    // ---------------------------------------------------------------------

    /// The application answered which instance the waiting want should
    /// join. A matching (flag, element) pair is a reuse; anything else
    /// creates a new mission carrying the flag.
    pub fn on_accept_want_response(&mut self, want: Want, flag: &str) {
        let Some(mut request) = self.waiting_queue.pop_front() else {
            debug!("accept-want response with no waiting ability");
            return;
        };
        if let Some(mission_id) = self.get_mission_by_specified_flag(&want, flag) {
            debug!(mission_id, flag, "specified want joins existing mission");
            if let Err(e) = self.foreground_resolved_mission(mission_id, &request, true) {
                warn!(error = %e, "failed to resume specified mission");
            }
            self.start_waiting_ability();
            return;
        }
        request.specified_flag = if flag.is_empty() {
            None
        } else {
            Some(flag.to_string())
        };
        if let Err(e) = self.start_ability_locked(request) {
            warn!(error = %e, "failed to start accepted specified ability");
        }
        self.start_waiting_ability();
    }

    /// The application declined or failed to answer; drop the waiting
    /// request and move on.
    pub fn on_start_specified_failed(&mut self, want: &Want) {
        if let Some(front) = self.waiting_queue.front() {
            if front.want.same_element(want) {
                self.waiting_queue.pop_front();
            }
        }
        self.start_waiting_ability();
    }

    /// Drives the next waiting request, unless the current top ability is
    /// still mid-foregrounding.
    pub fn start_waiting_ability(&mut self) {
        if let Some(top) = self.get_current_top_ability() {
            if let Some(record) = self.find_record(top) {
                if record.state() == AbilityState::Foregrounding {
                    return;
                }
            }
        }
        let Some(front) = self.waiting_queue.front() else {
            return;
        };
        if front.specified_flag.is_none() {
            let want = front.want.clone();
            self.scheduler.start_specified_ability(&want);
        } else if let Some(request) = self.waiting_queue.pop_front() {
            if let Err(e) = self.start_ability_locked(request) {
                warn!(error = %e, "failed to start waiting ability");
            }
        }
    }

    // ---------------------------------------------------------------------
    // Mission queries & mutations
    // ---------------------------------------------------------------------

    pub fn get_mission_infos(&self, num_max: i32) -> Result<Vec<MissionInfo>> {
        if num_max < 0 {
            return Err(AmsError::InvalidValue("numMax must not be negative"));
        }
        let mut infos = Vec::new();
        for mission_id in self.missions_in_mru_order() {
            if infos.len() >= num_max as usize {
                break;
            }
            let Some(mission) = self.missions.get(&mission_id) else {
                continue;
            };
            let record = mission.record();
            if record.is_launcher() || record.info.exclude_from_missions || mission.uninstall_pending
            {
                continue;
            }
            infos.push(self.build_mission_info(mission));
        }
        Ok(infos)
    }

    pub fn get_mission_info_by_id(&self, mission_id: MissionId) -> Result<MissionInfo> {
        self.missions
            .get(&mission_id)
            .map(|m| self.build_mission_info(m))
            .ok_or(AmsError::MissionNotFound(mission_id))
    }

    pub fn clear_mission(&mut self, mission_id: MissionId) -> Result<()> {
        let Some(mission) = self.missions.get(&mission_id) else {
            return Err(AmsError::MissionNotFound(mission_id));
        };
        if mission.locked {
            return Err(AmsError::InvalidValue("mission is locked"));
        }
        if mission.list() == Some(self.launcher_list) {
            return Err(AmsError::InvalidValue("launcher mission cannot be cleared"));
        }
        info!(mission_id, "clearing mission");
        self.destroy_mission(mission_id, true);
        Ok(())
    }

    pub fn clear_all_missions(&mut self) {
        let targets: Vec<MissionId> = self
            .missions
            .iter()
            .filter(|(_, m)| !m.locked && m.list() != Some(self.launcher_list))
            .map(|(&id, _)| id)
            .collect();
        info!(count = targets.len(), "clearing all missions");
        for mission_id in targets {
            self.destroy_mission(mission_id, true);
        }
    }

    pub fn move_mission_to_front(&mut self, mission_id: MissionId) -> Result<()> {
        if !self.missions.contains_key(&mission_id) {
            return Err(AmsError::MissionNotFound(mission_id));
        }
        self.ensure_mission_in_current(mission_id);
        self.promote_mission(mission_id);
        let scheduler = Arc::clone(&self.scheduler);
        let Some(mission) = self.missions.get_mut(&mission_id) else {
            return Err(AmsError::MissionNotFound(mission_id));
        };
        let record = mission.record_mut();
        let record_id = record.id();
        if !record.loaded {
            scheduler.schedule(
                record_id,
                LifecycleCommand::Load {
                    want: record.want.clone(),
                    ability: record.info.clone(),
                },
            );
        } else if record.state().in_transition() {
            record.pending_state = PendingState::Foreground;
        } else if record.state() != AbilityState::Foreground {
            record.set_state(AbilityState::Foregrounding);
            scheduler.schedule(record_id, LifecycleCommand::Foreground);
        }
        Ok(())
    }

    pub fn set_mission_locked_state(&mut self, mission_id: MissionId, locked: bool) -> Result<()> {
        let Some(mission) = self.missions.get_mut(&mission_id) else {
            return Err(AmsError::MissionNotFound(mission_id));
        };
        mission.locked = locked;
        if let Some(mut inner) = self.store.get(mission_id) {
            inner.locked = locked;
            self.store.update(inner);
        }
        Ok(())
    }

    /// Marks matching missions for deferred removal instead of mutating
    /// lists that may be mid-iteration in a concurrent dispatch.
    pub fn add_uninstall_tags(&mut self, bundle_name: &str, uid: i32) {
        let mut tagged = 0usize;
        for mission in self.missions.values_mut() {
            let matches = {
                let record = mission.record();
                record.app_info.bundle_name == bundle_name && record.app_info.uid == uid
            };
            if matches {
                mission.uninstall_pending = true;
                mission.record_mut().uninstalling = true;
                tagged += 1;
            }
        }
        for terminating in &mut self.terminating {
            if terminating.record.app_info.bundle_name == bundle_name
                && terminating.record.app_info.uid == uid
            {
                terminating.record.uninstalling = true;
            }
        }
        info!(bundle_name, uid, tagged, "tagged missions for uninstall");
    }

    pub fn is_valid_mission_ids(&self, mission_ids: &[MissionId]) -> Vec<(MissionId, bool)> {
        mission_ids
            .iter()
            .map(|&id| (id, self.missions.contains_key(&id)))
            .collect()
    }

    pub fn get_current_top_ability(&self) -> Option<RecordId> {
        for &list_id in &self.current_lists {
            if let Some(mission_id) = self.lists.get(&list_id).and_then(MissionList::top) {
                return self.missions.get(&mission_id).map(|m| m.record().id());
            }
        }
        None
    }

    pub fn get_ability_record_by_id(&self, record_id: RecordId) -> Option<&AbilityRecord> {
        self.find_record(record_id)
    }

    pub fn get_ability_record_by_name(&self, want: &Want) -> Option<RecordId> {
        self.missions
            .values()
            .map(Mission::record)
            .find(|r| r.matches_want(want))
            .map(AbilityRecord::id)
    }

    pub fn get_foreground_abilities(&self) -> Vec<RecordId> {
        self.missions
            .values()
            .map(Mission::record)
            .filter(|r| r.state().is_foreground())
            .map(AbilityRecord::id)
            .collect()
    }

    /// Pulls a backgrounding ability's mission out of the way so the next
    /// mission in the stack shows. Harmless to call twice.
    pub fn remove_backgrounding_ability(&mut self, record_id: RecordId) {
        let Some(mission_id) = self.mission_id_of_record(record_id) else {
            debug!(record_id, "backgrounding ability already removed");
            return;
        };
        let backgrounding = self
            .missions
            .get(&mission_id)
            .map(|m| {
                let r = m.record();
                r.state() == AbilityState::Backgrounding
                    || r.pending_state == PendingState::Background
            })
            .unwrap_or(false);
        if !backgrounding {
            debug!(record_id, "ability is not backgrounding");
            return;
        }
        self.relocate_mission_to_default(mission_id);
    }

    /// User-switch support: push every foreground ability to background.
    pub fn pause_manager(&mut self) {
        info!(user_id = self.user_id, "pausing mission list manager");
        let foreground: Vec<RecordId> = self.get_foreground_abilities();
        let scheduler = Arc::clone(&self.scheduler);
        for record_id in foreground {
            let Some(record) = self.find_record_mut(record_id) else {
                continue;
            };
            match record.state() {
                AbilityState::Foregrounding => {
                    record.pending_state = PendingState::Background;
                }
                AbilityState::Foreground => {
                    record.set_state(AbilityState::Backgrounding);
                    scheduler.schedule(record_id, LifecycleCommand::Background);
                }
                _ => {}
            }
        }
    }

    pub fn mission_id_of_record(&self, record_id: RecordId) -> Option<MissionId> {
        self.missions
            .iter()
            .find(|(_, m)| m.record().id() == record_id)
            .map(|(&id, _)| id)
    }

    pub fn mission_list_kind(&self, mission_id: MissionId) -> Option<MissionListType> {
        let list_id = self.missions.get(&mission_id)?.list()?;
        self.lists.get(&list_id).map(MissionList::kind)
    }

    pub fn mission_count(&self) -> usize {
        self.missions.len()
    }

    pub fn waiting_ability_count(&self) -> usize {
        self.waiting_queue.len()
    }

    pub fn terminating_count(&self) -> usize {
        self.terminating.len()
    }

    pub fn dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "User ID #{}", self.user_id);
        let mut order: Vec<ListId> = self.current_lists.iter().copied().collect();
        order.push(self.default_standard_list);
        order.push(self.default_single_list);
        for list_id in order {
            let Some(list) = self.lists.get(&list_id) else {
                continue;
            };
            let _ = writeln!(out, "  MissionList [{:?}] #{}", list.kind(), list.id());
            for mission_id in list.iter() {
                if let Some(mission) = self.missions.get(&mission_id) {
                    let record = mission.record();
                    let _ = writeln!(
                        out,
                        "    Mission #{} [{}] state: {}{}",
                        mission_id,
                        mission.name(),
                        record.reported_state(),
                        if mission.locked { " locked" } else { "" }
                    );
                }
            }
        }
        for terminating in &self.terminating {
            let _ = writeln!(
                out,
                "  Terminating record #{} (mission #{})",
                terminating.record.id(),
                terminating.mission_id
            );
        }
        out
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    fn create_list(&mut self, kind: MissionListType) -> ListId {
        let list_id = self.next_list_id;
        self.next_list_id += 1;
        self.lists.insert(list_id, MissionList::new(list_id, kind));
        list_id
    }

    fn alloc_record_id(&mut self) -> RecordId {
        let id = self.next_record_id;
        self.next_record_id += 1;
        id
    }

    fn missions_in_mru_order(&self) -> Vec<MissionId> {
        let mut order: Vec<MissionId> = Vec::new();
        let mut list_order: Vec<ListId> = self.current_lists.iter().copied().collect();
        list_order.push(self.default_standard_list);
        list_order.push(self.default_single_list);
        for list_id in list_order {
            if let Some(list) = self.lists.get(&list_id) {
                order.extend(list.iter());
            }
        }
        order
    }

    fn build_mission_info(&self, mission: &Mission) -> MissionInfo {
        let record = mission.record();
        let time = self
            .store
            .get(mission.id())
            .map(|inner| inner.time)
            .unwrap_or(record.start_time);
        MissionInfo {
            mission_id: mission.id(),
            mission_name: mission.name().to_string(),
            bundle_name: record.info.bundle_name.clone(),
            ability_name: record.info.name.clone(),
            time,
            running: record.loaded,
            locked: mission.locked,
            ability_state: record.reported_state(),
        }
    }

    fn locate_record(&self, record_id: RecordId) -> Option<RecordLocation> {
        if let Some(mission_id) = self.mission_id_of_record(record_id) {
            return Some(RecordLocation::Mission(mission_id));
        }
        self.terminating
            .iter()
            .position(|t| t.record.id() == record_id)
            .map(RecordLocation::Terminating)
    }

    fn find_record(&self, record_id: RecordId) -> Option<&AbilityRecord> {
        self.missions
            .values()
            .map(Mission::record)
            .find(|r| r.id() == record_id)
            .or_else(|| {
                self.terminating
                    .iter()
                    .map(|t| &t.record)
                    .find(|r| r.id() == record_id)
            })
    }

    fn find_record_mut(&mut self, record_id: RecordId) -> Option<&mut AbilityRecord> {
        if self
            .missions
            .values()
            .any(|m| m.record().id() == record_id)
        {
            return self
                .missions
                .values_mut()
                .map(Mission::record_mut)
                .find(|r| r.id() == record_id);
        }
        self.terminating
            .iter_mut()
            .map(|t| &mut t.record)
            .find(|r| r.id() == record_id)
    }

    fn notify_created(&self, mission_id: MissionId) {
        if let Some(controller) = &self.listener_controller {
            controller.notify_mission_created(mission_id);
        }
    }

    fn notify_changed(&self, mission_id: MissionId) {
        if let Some(controller) = &self.listener_controller {
            controller.notify_mission_changed(mission_id);
        }
    }

    fn notify_destroyed(&self, mission_id: MissionId) {
        if let Some(controller) = &self.listener_controller {
            controller.notify_mission_destroyed(mission_id);
        }
    }
}
