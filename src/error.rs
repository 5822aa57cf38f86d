use thiserror::Error;

use crate::ability::RecordId;
use crate::mission::MissionId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmsError {
    #[error("invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("internal inconsistency: {0}")]
    Inner(&'static str),

    #[error("mission not found: {0}")]
    MissionNotFound(MissionId),

    #[error("ability record not found: {0}")]
    RecordNotFound(RecordId),

    #[error("manager not initialized")]
    NotInitialized,

    #[error("mission count reached the configured limit")]
    ReachToLimit,

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AmsError>;
