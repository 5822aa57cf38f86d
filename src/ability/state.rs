use serde::{Deserialize, Serialize};

/// Lifecycle state of one ability instance.
///
/// Stage-model abilities move between Foreground/Background through the
/// transient Foregrounding/Backgrounding states; the non-stage model
/// reports Active/Inactive instead. Terminating is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbilityState {
    #[default]
    Initial,
    Foregrounding,
    Foreground,
    Backgrounding,
    Background,
    Active,
    Inactive,
    Terminating,
}

impl AbilityState {
    pub fn allowed_transitions(&self) -> &'static [AbilityState] {
        use AbilityState::*;
        match self {
            Initial => &[Foregrounding, Terminating],
            // Foreground failure demotes straight to Background.
            Foregrounding => &[Foreground, Background, Terminating],
            // A reused foreground ability re-foregrounds to deliver a new want.
            Foreground => &[Foregrounding, Backgrounding, Terminating],
            Backgrounding => &[Background, Terminating],
            Background => &[Foregrounding, Terminating],
            Active => &[Inactive, Terminating],
            Inactive => &[Active, Terminating],
            Terminating => &[],
        }
    }

    pub fn can_transition_to(&self, target: AbilityState) -> bool {
        self.allowed_transitions().contains(&target)
    }

    /// True while a remote round-trip is outstanding for this state.
    pub fn in_transition(&self) -> bool {
        matches!(self, AbilityState::Foregrounding | AbilityState::Backgrounding)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AbilityState::Terminating)
    }

    pub fn is_foreground(&self) -> bool {
        matches!(self, AbilityState::Foreground | AbilityState::Foregrounding)
    }
}

impl std::fmt::Display for AbilityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Initial => "Initial",
            Self::Foregrounding => "Foregrounding",
            Self::Foreground => "Foreground",
            Self::Backgrounding => "Backgrounding",
            Self::Background => "Background",
            Self::Active => "Active",
            Self::Inactive => "Inactive",
            Self::Terminating => "Terminating",
        };
        write!(f, "{}", s)
    }
}

/// The transition a record wants to make once its in-flight one settles.
/// At most one remote command is outstanding per record; a second request
/// lands here instead of issuing a duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PendingState {
    #[default]
    None,
    Foreground,
    Background,
}

/// Why a foreground request failed on the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForegroundFailure {
    /// The window subsystem froze; starting-window bookkeeping is kept so a
    /// retry can reuse it.
    WindowFreeze,
    InvalidWindowMode,
    Generic,
}

/// Completion reported by the remote ability process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Foreground,
    ForegroundFailed(ForegroundFailure),
    Background,
    Terminated,
}
