use super::LifecycleCoordinator;
use crate::backup::{BackupMode, BackupOutcome};
use crate::control::ConsoleCommand;
use crate::error::Result;
use crate::notify::NotificationMessage;
use tokio::time::sleep;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

impl LifecycleCoordinator {
    /// Archive the world while the server keeps running.
    ///
    /// Saving is paused around the archive and always re-enabled afterwards.
    /// The lifecycle state is left at `Running`.
    pub async fn run_scheduled_backup(self) -> BackupOutcome {
        let span = info_span!("scheduled_backup", sequence_id = %Uuid::new_v4());

        async move {
            info!("Scheduled backup starting");
            self.notifier
                .notify(&NotificationMessage::info(
                    "Starting a world backup, expect a little lag",
                ))
                .await;

            let outcome = match self.pause_saves().await {
                Ok(()) => self.backup.invoke(BackupMode::Scheduled).await,
                Err(e) => {
                    error!("Could not pause saving for backup: {}", e);
                    BackupOutcome::Failure(e.to_string())
                }
            };

            self.restore_autosave().await;

            let message = match &outcome {
                BackupOutcome::Success => NotificationMessage::info("World backup complete"),
                BackupOutcome::Failure(reason) => {
                    NotificationMessage::critical(format!("World backup failed: {}", reason))
                }
            };
            self.notifier.notify(&message).await;

            info!(success = outcome.is_success(), "Scheduled backup finished");
            outcome
        }
        .instrument(span)
        .await
    }

    async fn pause_saves(&self) -> Result<()> {
        self.send(ConsoleCommand::SaveOff).await?;
        self.send(ConsoleCommand::SaveAll).await?;
        sleep(self.timings.grace_delay()).await;
        Ok(())
    }
}
