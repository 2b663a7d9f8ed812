/// Shutdown sequence states, in the order a clean run visits them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Running,
    WarningIssued,
    SavingState,
    StoppingProcess,
    AwaitingExit,
    BackingUp,
    Completed,
    Failed,
}

impl LifecycleState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// States in which world data may already be flushed to disk
    pub fn is_draining(&self) -> bool {
        matches!(
            self,
            Self::SavingState | Self::StoppingProcess | Self::AwaitingExit
        )
    }

    /// States a fault may leave through a backup, provided the server is
    /// known to be gone. `Running` covers a server that was already down
    /// when the sequence started.
    pub fn allows_salvage(&self) -> bool {
        *self == Self::Running || self.is_draining()
    }

    /// Next state of a clean run
    pub fn successor(&self) -> Option<Self> {
        match self {
            Self::Running => Some(Self::WarningIssued),
            Self::WarningIssued => Some(Self::SavingState),
            Self::SavingState => Some(Self::StoppingProcess),
            Self::StoppingProcess => Some(Self::AwaitingExit),
            Self::AwaitingExit => Some(Self::BackingUp),
            Self::BackingUp => Some(Self::Completed),
            Self::Completed | Self::Failed => None,
        }
    }

    /// Forward-only rules: the clean successor, `Failed` from any
    /// non-terminal state, and a jump to `BackingUp` from a salvage state
    /// once the server is known to have exited.
    pub fn can_transition_to(&self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }

        self.successor() == Some(next)
            || next == Self::Failed
            || (next == Self::BackingUp && self.allows_salvage())
    }
}
