use super::{LifecycleCoordinator, LifecycleState, SequenceReport, Trigger};
use crate::backup::{BackupMode, BackupOutcome};
use crate::control::{ConsoleCommand, ServerProcessHandle};
use crate::error::{GuardError, Result};
use crate::notify::NotificationMessage;
use chrono::Utc;
use tokio::time::sleep;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Liveness checks between progress lines while waiting for exit
const EXIT_PROGRESS_EVERY: u64 = 30;

impl LifecycleCoordinator {
    /// Run the shutdown sequence to a terminal state.
    ///
    /// Nothing in here observes cancellation: once players have been warned
    /// the sequence always runs to `Completed` or `Failed`.
    pub async fn run(mut self, trigger: Trigger) -> SequenceReport {
        let span = info_span!(
            "lifecycle",
            sequence_id = %Uuid::new_v4(),
            trigger = trigger.label()
        );

        async move {
            if let Trigger::Notice(notice) = &trigger {
                info!(
                    "Shutdown sequence starting for {} ({}s before the instance is reclaimed)",
                    notice,
                    notice.time_remaining(Utc::now()).num_seconds()
                );
            } else {
                info!("Shutdown sequence starting on operator request");
            }

            if let Err(fault) = self.drive(&trigger).await {
                self.fail(fault).await;
            }

            self.restore_autosave().await;
            self.announce_outcome().await;

            let report = self.report();
            info!(
                final_state = ?report.final_state,
                exit_code = report.exit_code(),
                "Shutdown sequence finished"
            );
            report
        }
        .instrument(span)
        .await
    }

    async fn drive(&mut self, trigger: &Trigger) -> Result<()> {
        let Some(process) = self.channel.locate_process().await? else {
            warn!(
                "No server session behind '{}', the server is already down",
                self.channel.target()
            );
            self.exit_confirmed = true;
            return Err(GuardError::channel_unavailable(
                self.channel.target(),
                "no server session",
            ));
        };
        info!("Managing server {} via '{}'", process, self.channel.target());
        self.process = Some(process);

        self.advance(LifecycleState::WarningIssued)?;
        for message in warning_messages(trigger, self.timings.warning_delay_secs) {
            self.notifier.notify(&message).await;
        }
        sleep(self.timings.warning_delay()).await;

        self.advance(LifecycleState::SavingState)?;
        self.notifier
            .notify(&NotificationMessage::warning("Saving the world, hold still"))
            .await;
        self.send(ConsoleCommand::SaveOff).await?;
        sleep(self.timings.grace_delay()).await;
        self.send(ConsoleCommand::SaveAll).await?;
        // save-all returns before the flush finishes and never says when it has
        sleep(self.timings.grace_delay()).await;

        self.advance(LifecycleState::StoppingProcess)?;
        self.notifier
            .notify(&NotificationMessage::warning("Server stopping now"))
            .await;
        self.send(ConsoleCommand::Stop).await?;

        self.advance(LifecycleState::AwaitingExit)?;
        self.await_exit(process).await;

        self.advance(LifecycleState::BackingUp)?;
        self.run_backup().await;

        self.advance(LifecycleState::Completed)
    }

    pub(super) async fn send(&self, command: ConsoleCommand) -> Result<()> {
        info!("Console <- {}", command);
        self.channel.send_command(command.as_str()).await
    }

    /// No timeout: backing up a half-written world is worse than waiting
    async fn await_exit(&mut self, process: ServerProcessHandle) {
        let interval = self.timings.exit_poll_interval();
        let mut checks: u64 = 0;

        while process.is_alive(self.channel.as_ref()) {
            checks += 1;
            if checks % EXIT_PROGRESS_EVERY == 0 {
                info!("Still waiting for server {} to exit ({} checks)", process, checks);
            } else {
                debug!("Server {} still alive", process);
            }
            sleep(interval).await;
        }

        self.exit_confirmed = true;
        info!("Server {} has exited", process);
    }

    async fn run_backup(&mut self) {
        if self.backup_outcome.is_some() {
            warn!("Backup already attempted for this sequence, not repeating");
            return;
        }

        let outcome = self.backup.invoke(BackupMode::PreShutdown).await;
        match &outcome {
            BackupOutcome::Success => info!("Pre-shutdown backup succeeded"),
            BackupOutcome::Failure(reason) => error!("Pre-shutdown backup failed: {}", reason),
        }
        self.backup_outcome = Some(outcome);
    }

    fn server_has_exited(&self) -> bool {
        self.exit_confirmed
            || self
                .process
                .map(|process| !process.is_alive(self.channel.as_ref()))
                .unwrap_or(false)
    }

    async fn fail(&mut self, fault: GuardError) {
        error!(state = ?self.state, "Shutdown sequence fault: {}", fault);
        self.fault = Some(fault.to_string());

        // Data the server already flushed should not be stranded
        if self.state.allows_salvage() && self.server_has_exited() {
            warn!("Server exited before the fault, backing up what it flushed");
            match self.advance(LifecycleState::BackingUp) {
                Ok(()) => self.run_backup().await,
                Err(e) => error!("Cannot enter backup after fault: {}", e),
            }
        }

        if let Err(e) = self.advance(LifecycleState::Failed) {
            error!("Cannot mark sequence failed: {}", e);
        }
    }

    /// Idempotent, so it is safe on paths that never disabled saving
    pub(super) async fn restore_autosave(&self) {
        if let Err(e) = self.send(ConsoleCommand::SaveOn).await {
            warn!("Could not re-enable automatic saving: {}", e);
        }
    }

    async fn announce_outcome(&self) {
        let message = match (&self.state, &self.backup_outcome) {
            (LifecycleState::Completed, Some(BackupOutcome::Success)) => {
                NotificationMessage::info("Server stopped and the world is backed up")
            }
            (LifecycleState::Completed, Some(BackupOutcome::Failure(reason))) => {
                NotificationMessage::critical(format!(
                    "Server stopped but the backup failed: {}",
                    reason
                ))
            }
            _ => NotificationMessage::critical(format!(
                "Shutdown did not complete cleanly: {}",
                self.fault.as_deref().unwrap_or("unknown fault")
            )),
        };
        self.notifier.notify(&message).await;
    }
}

fn warning_messages(trigger: &Trigger, delay_secs: u64) -> [NotificationMessage; 2] {
    let first = match trigger {
        Trigger::Notice(notice) => format!(
            "This server's host is being reclaimed ({}). Shutting down in {} seconds!",
            notice.action, delay_secs
        ),
        Trigger::Operator => format!("Server shutting down in {} seconds!", delay_secs),
    };

    [
        NotificationMessage::warning(first),
        NotificationMessage::warning(
            "Find somewhere safe and log out. The world will be saved and backed up.",
        ),
    ]
}
