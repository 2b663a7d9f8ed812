use super::{LifecycleState, SequenceReport};
use crate::backup::{BackupOutcome, BackupTrigger};
use crate::config::ShutdownConfig;
use crate::control::{ControlChannel, ServerProcessHandle};
use crate::error::{GuardError, Result};
use crate::notify::Notifier;
use std::sync::Arc;
use tracing::info;

/// Drives one managed server from `Running` to a terminal state.
///
/// The collaborators are injected so the same machine serves the daemon and
/// active entry points, and tests can substitute fakes. `run` consumes the
/// coordinator: one coordinator, one sequence.
pub struct LifecycleCoordinator {
    pub(super) channel: Arc<dyn ControlChannel>,
    pub(super) notifier: Notifier,
    pub(super) backup: Arc<dyn BackupTrigger>,
    pub(super) timings: ShutdownConfig,

    // Sequence progress
    pub(super) state: LifecycleState,
    pub(super) history: Vec<LifecycleState>,
    pub(super) process: Option<ServerProcessHandle>,
    pub(super) exit_confirmed: bool,
    pub(super) backup_outcome: Option<BackupOutcome>,
    pub(super) fault: Option<String>,
}

impl LifecycleCoordinator {
    pub fn new(
        channel: Arc<dyn ControlChannel>,
        backup: Arc<dyn BackupTrigger>,
        timings: ShutdownConfig,
    ) -> Self {
        Self {
            notifier: Notifier::new(Arc::clone(&channel)),
            channel,
            backup,
            timings,
            state: LifecycleState::Running,
            history: vec![LifecycleState::Running],
            process: None,
            exit_confirmed: false,
            backup_outcome: None,
            fault: None,
        }
    }

    /// Move to `next`, rejecting anything the state rules forbid
    pub(super) fn advance(&mut self, next: LifecycleState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(GuardError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        info!("Lifecycle {:?} -> {:?}", self.state, next);
        self.state = next;
        self.history.push(next);
        Ok(())
    }

    pub(super) fn report(&self) -> SequenceReport {
        SequenceReport {
            final_state: self.state,
            history: self.history.clone(),
            backup: self.backup_outcome.clone(),
            fault: self.fault.clone(),
        }
    }
}
