use crate::config::BackupConfig;
use crate::error::GuardError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, error, info};

/// When the backup runs relative to the server's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupMode {
    /// Server keeps running; saves are paused around the archive
    Scheduled,
    /// Server has already exited
    PreShutdown,
}

impl fmt::Display for BackupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scheduled => f.write_str("scheduled"),
            Self::PreShutdown => f.write_str("pre-shutdown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    Success,
    Failure(String),
}

impl BackupOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn into_result(self) -> Result<(), GuardError> {
        match self {
            Self::Success => Ok(()),
            Self::Failure(reason) => Err(GuardError::BackupFailure { reason }),
        }
    }
}

/// External archival operation, atomic from the caller's point of view
#[async_trait::async_trait]
pub trait BackupTrigger: Send + Sync {
    async fn invoke(&self, mode: BackupMode) -> BackupOutcome;
}

/// Runs the backup agent as `<command> <args..> <action>` in the server root
pub struct CommandBackupTrigger {
    command: String,
    args: Vec<String>,
    scheduled_action: String,
    pre_shutdown_action: String,
    working_dir: PathBuf,
}

impl CommandBackupTrigger {
    pub fn new(config: &BackupConfig, server_root: &Path) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            scheduled_action: config.scheduled_action.clone(),
            pre_shutdown_action: config.pre_shutdown_action.clone(),
            working_dir: server_root.to_path_buf(),
        }
    }

    fn action(&self, mode: BackupMode) -> &str {
        match mode {
            BackupMode::Scheduled => &self.scheduled_action,
            BackupMode::PreShutdown => &self.pre_shutdown_action,
        }
    }
}

fn last_line(output: &[u8]) -> Option<String> {
    String::from_utf8_lossy(output)
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

#[async_trait::async_trait]
impl BackupTrigger for CommandBackupTrigger {
    async fn invoke(&self, mode: BackupMode) -> BackupOutcome {
        let action = self.action(mode);
        info!("Running {} backup: {} {}", mode, self.command, action);

        let output = Command::new(&self.command)
            .args(&self.args)
            .arg(action)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .output()
            .await;

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                error!("Failed to start backup agent '{}': {}", self.command, e);
                return BackupOutcome::Failure(format!("failed to start {}: {}", self.command, e));
            }
        };

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            debug!("backup: {}", line);
        }

        if output.status.success() {
            info!("{} backup finished", mode);
            return BackupOutcome::Success;
        }

        let detail = last_line(&output.stderr)
            .or_else(|| last_line(&output.stdout))
            .unwrap_or_else(|| "no output".to_string());
        let reason = format!("{} {} exited with {}: {}", self.command, action, output.status, detail);
        error!("{} backup failed: {}", mode, reason);
        BackupOutcome::Failure(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell_trigger(script: &str, dir: &Path) -> CommandBackupTrigger {
        // `sh -c <script> <action>` puts the action in $0
        let config = BackupConfig {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            scheduled_action: "backup".to_string(),
            pre_shutdown_action: "backup_current".to_string(),
        };
        CommandBackupTrigger::new(&config, dir)
    }

    #[tokio::test]
    async fn test_zero_exit_is_success() {
        let dir = tempfile::tempdir().unwrap();
        let trigger = shell_trigger("echo \"$0\" > action.txt", dir.path());

        let outcome = trigger.invoke(BackupMode::PreShutdown).await;

        assert_eq!(outcome, BackupOutcome::Success);
        let action = std::fs::read_to_string(dir.path().join("action.txt")).unwrap();
        assert_eq!(action.trim(), "backup_current");
    }

    #[tokio::test]
    async fn test_scheduled_mode_uses_scheduled_action() {
        let dir = tempfile::tempdir().unwrap();
        let trigger = shell_trigger("echo \"$0\" > action.txt", dir.path());

        assert!(trigger.invoke(BackupMode::Scheduled).await.is_success());
        let action = std::fs::read_to_string(dir.path().join("action.txt")).unwrap();
        assert_eq!(action.trim(), "backup");
    }

    #[tokio::test]
    async fn test_nonzero_exit_reports_last_stderr_line() {
        let dir = tempfile::tempdir().unwrap();
        let trigger = shell_trigger("echo uploading; echo 'disk full' >&2; exit 3", dir.path());

        match trigger.invoke(BackupMode::PreShutdown).await {
            BackupOutcome::Failure(reason) => {
                assert!(reason.contains("disk full"), "reason: {}", reason);
                assert!(reason.contains('3'), "reason: {}", reason);
            }
            BackupOutcome::Success => panic!("Expected backup failure"),
        }
    }

    #[tokio::test]
    async fn test_missing_agent_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let config = BackupConfig {
            command: "/nonexistent/prospector".to_string(),
            args: Vec::new(),
            scheduled_action: "backup".to_string(),
            pre_shutdown_action: "backup_current".to_string(),
        };
        let trigger = CommandBackupTrigger::new(&config, dir.path());

        let outcome = trigger.invoke(BackupMode::PreShutdown).await;
        assert!(!outcome.is_success());
    }

    #[test]
    fn test_failure_converts_to_backup_error() {
        let err = BackupOutcome::Failure("disk full".to_string())
            .into_result()
            .unwrap_err();
        assert!(matches!(err, GuardError::BackupFailure { ref reason } if reason == "disk full"));
        assert!(BackupOutcome::Success.into_result().is_ok());
    }
}
