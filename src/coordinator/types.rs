use super::LifecycleState;
use crate::app::{EXIT_BACKUP_FAILED, EXIT_OK, EXIT_SEQUENCE_FAILED};
use crate::backup::BackupOutcome;
use crate::notice::TerminationNotice;

/// What started the shutdown sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Daemon mode: the metadata service announced a termination
    Notice(TerminationNotice),
    /// Active mode: an operator asked for an immediate drain
    Operator,
}

impl Trigger {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Notice(_) => "notice",
            Self::Operator => "operator",
        }
    }
}

/// Result of one shutdown sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceReport {
    pub final_state: LifecycleState,
    /// Every state entered, starting with `Running`
    pub history: Vec<LifecycleState>,
    pub backup: Option<BackupOutcome>,
    /// Fault that sent the sequence to `Failed`
    pub fault: Option<String>,
}

impl SequenceReport {
    pub fn backup_succeeded(&self) -> bool {
        matches!(self.backup, Some(BackupOutcome::Success))
    }

    pub fn backup_attempts(&self) -> usize {
        self.history
            .iter()
            .filter(|state| **state == LifecycleState::BackingUp)
            .count()
    }

    pub fn exit_code(&self) -> i32 {
        match self.final_state {
            LifecycleState::Completed if self.backup_succeeded() => EXIT_OK,
            LifecycleState::Completed => EXIT_BACKUP_FAILED,
            _ => EXIT_SEQUENCE_FAILED,
        }
    }
}
