//! Mission bookkeeping: missions, the lists that order them and the
//! manager that schedules lifecycle transitions over them.

mod info;
mod list;
mod manager;
#[allow(clippy::module_inception)]
mod mission;

pub use info::{InnerMissionInfo, MissionInfo};
pub use list::{ListId, MissionList, MissionListType};
pub use manager::{MissionCollaborators, MissionListManager, TimeoutMessage};
pub use mission::{Mission, MissionId};
