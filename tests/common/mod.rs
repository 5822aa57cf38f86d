//! Shared fakes for manager integration tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Once};

use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

use ability_missions::{
    AbilityInfo, AbilityRequest, AbilityScheduler, AbilityType, ApplicationInfo, InnerMissionInfo,
    LaunchMode, LifecycleCommand, MissionCollaborators, MissionConfig, MissionId, MissionListener,
    MissionListManager, MissionStore, RecordId, ResourceReporter, Want, WindowHandler,
};

/// Records every lifecycle command instead of reaching a real process.
#[derive(Default)]
pub struct RecordingScheduler {
    pub commands: Mutex<Vec<(RecordId, LifecycleCommand)>>,
    pub specified_requests: Mutex<Vec<Want>>,
}

impl RecordingScheduler {
    pub fn commands_for(&self, record: RecordId) -> Vec<LifecycleCommand> {
        self.commands
            .lock()
            .iter()
            .filter(|(id, _)| *id == record)
            .map(|(_, cmd)| cmd.clone())
            .collect()
    }

    pub fn last_command(&self) -> Option<(RecordId, LifecycleCommand)> {
        self.commands.lock().last().cloned()
    }

    pub fn command_count(&self) -> usize {
        self.commands.lock().len()
    }
}

impl AbilityScheduler for RecordingScheduler {
    fn schedule(&self, record: RecordId, command: LifecycleCommand) {
        self.commands.lock().push((record, command));
    }

    fn start_specified_ability(&self, want: &Want) {
        self.specified_requests.lock().push(want.clone());
    }
}

pub struct InMemoryStore {
    next_id: AtomicI32,
    infos: Mutex<HashMap<MissionId, InnerMissionInfo>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            next_id: AtomicI32::new(1),
            infos: Mutex::new(HashMap::new()),
        }
    }
}

impl InMemoryStore {
    pub fn len(&self) -> usize {
        self.infos.lock().len()
    }

    pub fn contains(&self, mission_id: MissionId) -> bool {
        self.infos.lock().contains_key(&mission_id)
    }
}

impl MissionStore for InMemoryStore {
    fn generate_mission_id(&self) -> MissionId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn get(&self, mission_id: MissionId) -> Option<InnerMissionInfo> {
        self.infos.lock().get(&mission_id).cloned()
    }

    fn update(&self, info: InnerMissionInfo) {
        self.infos.lock().insert(info.mission_id, info);
    }

    fn delete(&self, mission_id: MissionId) {
        self.infos.lock().remove(&mission_id);
    }
}

#[derive(Default)]
pub struct CountingListener {
    pub created: AtomicUsize,
    pub changed: AtomicUsize,
    pub destroyed: AtomicUsize,
}

impl MissionListener for CountingListener {
    fn on_mission_created(&self, _mission_id: MissionId) {
        self.created.fetch_add(1, Ordering::SeqCst);
    }

    fn on_mission_changed(&self, _mission_id: MissionId) {
        self.changed.fetch_add(1, Ordering::SeqCst);
    }

    fn on_mission_destroyed(&self, _mission_id: MissionId) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeWindowHandler {
    pub cancelled: Mutex<Vec<RecordId>>,
}

impl WindowHandler for FakeWindowHandler {
    fn cancel_starting_window(&self, record: RecordId) {
        self.cancelled.lock().push(record);
    }
}

#[derive(Default)]
pub struct NullReporter;

impl ResourceReporter for NullReporter {
    fn report_ability_start(&self, _bundle_name: &str, _ability_name: &str) {}
}

pub struct Harness {
    pub manager: MissionListManager,
    pub scheduler: Arc<RecordingScheduler>,
    pub store: Arc<InMemoryStore>,
    pub window: Arc<FakeWindowHandler>,
}

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn harness() -> Harness {
    init_tracing();
    let scheduler = Arc::new(RecordingScheduler::default());
    let store = Arc::new(InMemoryStore::default());
    let window = Arc::new(FakeWindowHandler::default());
    let collaborators = MissionCollaborators {
        scheduler: scheduler.clone(),
        store: store.clone(),
        window: Some(window.clone()),
        reporter: Some(Arc::new(NullReporter)),
    };
    let mut manager = MissionListManager::new(100, MissionConfig::default(), collaborators)
        .expect("default config is valid");
    manager.init();
    Harness {
        manager,
        scheduler,
        store,
        window,
    }
}

pub fn harness_with_config(config: MissionConfig) -> Harness {
    init_tracing();
    let scheduler = Arc::new(RecordingScheduler::default());
    let store = Arc::new(InMemoryStore::default());
    let window = Arc::new(FakeWindowHandler::default());
    let collaborators = MissionCollaborators {
        scheduler: scheduler.clone(),
        store: store.clone(),
        window: Some(window.clone()),
        reporter: None,
    };
    let mut manager =
        MissionListManager::new(100, config, collaborators).expect("config is valid");
    manager.init();
    Harness {
        manager,
        scheduler,
        store,
        window,
    }
}

pub fn request(bundle: &str, ability: &str, mode: LaunchMode) -> AbilityRequest {
    AbilityRequest {
        want: Want::new(bundle, ability).with_module("entry"),
        ability_info: AbilityInfo {
            bundle_name: bundle.to_string(),
            module_name: "entry".to_string(),
            name: ability.to_string(),
            launch_mode: mode,
            ability_type: AbilityType::Page,
            is_stage_based_model: true,
            ..AbilityInfo::default()
        },
        app_info: ApplicationInfo {
            bundle_name: bundle.to_string(),
            uid: 20_000,
            is_launcher_app: false,
        },
        caller: None,
        specified_flag: None,
    }
}

pub fn launcher_request() -> AbilityRequest {
    let mut req = request("com.ohos.launcher", "MainAbility", LaunchMode::Singleton);
    req.app_info.is_launcher_app = true;
    req
}

impl Harness {
    /// Starts an ability and walks it through load and foreground so it ends
    /// up Foreground with a live process. Returns its record id.
    pub fn start_to_foreground(&mut self, req: AbilityRequest) -> RecordId {
        self.manager.start_ability(req.clone()).expect("start");
        let record_id = self
            .manager
            .get_ability_record_by_name(&req.want)
            .expect("record exists");
        let record = self
            .manager
            .get_ability_record_by_id(record_id)
            .expect("record exists");
        if !record.loaded {
            self.manager
                .on_ability_request_done(record_id)
                .expect("attach");
        }
        let record = self
            .manager
            .get_ability_record_by_id(record_id)
            .expect("record exists");
        if record.state() == ability_missions::AbilityState::Foregrounding {
            self.manager
                .dispatch_foreground(record_id, true, None)
                .expect("foreground done");
        }
        record_id
    }
}
