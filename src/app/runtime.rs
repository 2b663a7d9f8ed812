use super::{InstanceLock, RunMode, EXIT_BACKUP_FAILED, EXIT_OK};
use crate::backup::{BackupTrigger, CommandBackupTrigger};
use crate::config::GuardConfig;
use crate::control::{ControlChannel, TmuxControlChannel};
use crate::coordinator::{LifecycleCoordinator, SequenceReport, Trigger};
use crate::error::Result;
use crate::metadata::{HttpMetadataSource, MetadataSource, TerminationPoller};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Wires the configured transports into a coordinator for one server root
pub struct GuardApp {
    config: GuardConfig,
    server_root: PathBuf,
}

impl GuardApp {
    pub fn new(config: GuardConfig, server_root: PathBuf) -> Self {
        Self {
            config,
            server_root,
        }
    }

    pub fn server_root(&self) -> &Path {
        &self.server_root
    }

    /// Run one entry point to completion and return the process exit code
    pub async fn run(&self, mode: RunMode) -> Result<i32> {
        let lock = InstanceLock::acquire(&self.server_root, mode)?;
        info!(
            "Guarding {} in {:?} mode (lock {})",
            self.server_root.display(),
            mode,
            lock.path().display()
        );

        // Only the daemon's poll loop observes this token; every other wait
        // runs to completion once it has started.
        let cancel = CancellationToken::new();
        setup_signal_handlers(&cancel);

        let coordinator = self.build_coordinator();
        let exit_code = match mode {
            RunMode::Active => coordinator.run(Trigger::Operator).await.exit_code(),
            RunMode::Backup => match coordinator.run_scheduled_backup().await.into_result() {
                Ok(()) => EXIT_OK,
                Err(e) => {
                    error!("{}", e);
                    EXIT_BACKUP_FAILED
                }
            },
            RunMode::Daemon => {
                let source = HttpMetadataSource::new(&self.config.metadata)?;
                info!("Polling termination notices from {}", source.endpoint());
                let poller = TerminationPoller::new(source, self.config.metadata.poll_interval());

                match guard_until_notice(poller, coordinator, &cancel).await {
                    Some(report) => report.exit_code(),
                    None => {
                        info!("Daemon stopped before any termination notice");
                        EXIT_OK
                    }
                }
            }
        };

        drop(lock);
        Ok(exit_code)
    }

    fn build_coordinator(&self) -> LifecycleCoordinator {
        let channel: Arc<dyn ControlChannel> = Arc::new(TmuxControlChannel::new(
            &self.config.control,
            &self.server_root,
        ));
        let backup: Arc<dyn BackupTrigger> = Arc::new(CommandBackupTrigger::new(
            &self.config.backup,
            &self.server_root,
        ));

        LifecycleCoordinator::new(channel, backup, self.config.shutdown.clone())
    }
}

/// Daemon entry point: hand the first notice to the coordinator.
/// Returns `None` when cancelled before any notice arrived.
pub async fn guard_until_notice<S: MetadataSource>(
    poller: TerminationPoller<S>,
    coordinator: LifecycleCoordinator,
    cancel: &CancellationToken,
) -> Option<SequenceReport> {
    let notice = poller.wait_for_notice(cancel).await?;
    Some(coordinator.run(Trigger::Notice(notice)).await)
}

/// Route SIGTERM and SIGINT to `cancel`.
///
/// The handlers stay installed for the life of the process, so signals that
/// arrive during a shutdown sequence are logged and otherwise ignored.
fn setup_signal_handlers(cancel: &CancellationToken) {
    #[cfg(unix)]
    {
        let token = cancel.clone();
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::spawn(async move {
                    while sigterm.recv().await.is_some() {
                        on_signal("SIGTERM", &token);
                    }
                });
            }
            Err(e) => warn!("Failed to register SIGTERM handler: {}", e),
        }
    }

    let token = cancel.clone();
    tokio::spawn(async move {
        while signal::ctrl_c().await.is_ok() {
            on_signal("SIGINT", &token);
        }
    });
}

fn on_signal(name: &str, cancel: &CancellationToken) {
    if cancel.is_cancelled() {
        info!("Received {} again, already stopping", name);
    } else {
        info!(
            "Received {}; polling stops, a shutdown sequence in progress runs to completion",
            name
        );
        cancel.cancel();
    }
}
