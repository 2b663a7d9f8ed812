use super::*;
use crate::backup::{BackupMode, BackupOutcome, BackupTrigger};
use crate::config::{GuardConfig, ShutdownConfig};
use crate::control::MockControlChannel;
use crate::coordinator::{LifecycleCoordinator, LifecycleState};
use crate::error::{GuardError, Result};
use crate::metadata::{MetadataSource, TerminationPoller};
use crate::notice::TerminationNotice;
use clap::ValueEnum;
use parking_lot::Mutex;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Answers "no notice" until `notice_on_call`, then returns a stop notice
struct CountingSource {
    notice_on_call: Option<u32>,
    calls: Arc<Mutex<u32>>,
}

#[async_trait::async_trait]
impl MetadataSource for CountingSource {
    async fn fetch_notice(&self) -> Result<Option<TerminationNotice>> {
        let mut calls = self.calls.lock();
        *calls += 1;
        if Some(*calls) == self.notice_on_call {
            TerminationNotice::from_json(r#"{"action":"stop","time":"2030-01-01T00:00:00Z"}"#)
                .map(Some)
        } else {
            Ok(None)
        }
    }
}

#[derive(Default)]
struct CountingBackup {
    modes: Mutex<Vec<BackupMode>>,
}

#[async_trait::async_trait]
impl BackupTrigger for CountingBackup {
    async fn invoke(&self, mode: BackupMode) -> BackupOutcome {
        self.modes.lock().push(mode);
        BackupOutcome::Success
    }
}

fn create_test_timings() -> ShutdownConfig {
    ShutdownConfig {
        warning_delay_secs: 30,
        grace_delay_secs: 15,
        exit_poll_interval_millis: 1000,
    }
}

fn write_lock(root: &Path, pid: u32) {
    std::fs::write(
        root.join(".spotguard.lock"),
        format!(
            r#"{{"pid":{},"mode":"daemon","started_at":"2030-01-01T00:00:00Z"}}"#,
            pid
        ),
    )
    .unwrap();
}

#[test]
fn test_lock_is_exclusive_and_released_on_drop() {
    let dir = tempfile::tempdir().unwrap();

    let lock = InstanceLock::acquire(dir.path(), RunMode::Daemon).unwrap();
    assert!(lock.path().exists());

    let content = std::fs::read_to_string(lock.path()).unwrap();
    assert!(content.contains(&format!("\"pid\": {}", std::process::id())));
    assert!(content.contains("\"daemon\""));

    match InstanceLock::acquire(dir.path(), RunMode::Active) {
        Err(GuardError::AlreadyRunning { pid, .. }) => assert_eq!(pid, std::process::id()),
        other => panic!("expected AlreadyRunning, got {:?}", other),
    }

    let path = lock.path().to_path_buf();
    drop(lock);
    assert!(!path.exists());

    InstanceLock::acquire(dir.path(), RunMode::Active).unwrap();
}

#[test]
fn test_held_lock_wins_even_while_its_details_are_unwritten() {
    let dir = tempfile::tempdir().unwrap();
    let held = InstanceLock::acquire(dir.path(), RunMode::Daemon).unwrap();
    // Looks like an owner caught between creating and filling the file
    std::fs::write(held.path(), "").unwrap();

    let err = InstanceLock::acquire(dir.path(), RunMode::Backup).unwrap_err();
    assert!(matches!(err, GuardError::AlreadyRunning { pid: 0, .. }));
    assert!(held.path().exists());
}

#[test]
fn test_lock_file_naming_a_live_pid_without_an_owner_is_taken_over() {
    let dir = tempfile::tempdir().unwrap();
    // pid 1 is alive, but nobody holds the file lock
    write_lock(dir.path(), 1);

    let lock = InstanceLock::acquire(dir.path(), RunMode::Backup).unwrap();
    let content = std::fs::read_to_string(lock.path()).unwrap();
    assert!(content.contains(&format!("\"pid\": {}", std::process::id())));
    assert!(content.contains("\"backup\""));
}

#[test]
fn test_concurrent_guards_yield_exactly_one_owner() {
    let dir = tempfile::tempdir().unwrap();
    let root = Arc::new(dir.path().to_path_buf());
    let barrier = Arc::new(std::sync::Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let root = Arc::clone(&root);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                InstanceLock::acquire(&root, RunMode::Daemon)
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let owners = results.iter().filter(|result| result.is_ok()).count();
    assert_eq!(owners, 1);
    assert!(results
        .iter()
        .filter_map(|result| result.as_ref().err())
        .all(|err| matches!(err, GuardError::AlreadyRunning { .. })));
}

#[test]
fn test_stale_lock_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let mut child = std::process::Command::new("true").spawn().unwrap();
    let dead_pid = child.id();
    child.wait().unwrap();
    write_lock(dir.path(), dead_pid);

    let lock = InstanceLock::acquire(dir.path(), RunMode::Daemon).unwrap();
    let content = std::fs::read_to_string(lock.path()).unwrap();
    assert!(content.contains(&format!("\"pid\": {}", std::process::id())));
}

#[test]
fn test_unreadable_lock_is_treated_as_stale() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".spotguard.lock"), "not json").unwrap();

    assert!(InstanceLock::acquire(dir.path(), RunMode::Active).is_ok());
}

#[test]
fn test_run_mode_parses_from_cli_names() {
    assert_eq!(RunMode::from_str("daemon", true).unwrap(), RunMode::Daemon);
    assert_eq!(RunMode::from_str("ACTIVE", true).unwrap(), RunMode::Active);
    assert_eq!(RunMode::from_str("backup", false).unwrap(), RunMode::Backup);
    assert!(RunMode::from_str("hibernate", true).is_err());
}

#[tokio::test(start_paused = true)]
async fn test_notice_hands_off_to_coordinator() {
    let calls = Arc::new(Mutex::new(0));
    let source = CountingSource {
        notice_on_call: Some(3),
        calls: calls.clone(),
    };
    let channel = Arc::new(MockControlChannel::new().alive_for(2));
    let backup = Arc::new(CountingBackup::default());
    let coordinator =
        LifecycleCoordinator::new(channel.clone(), backup.clone(), create_test_timings());
    let poller = TerminationPoller::new(source, Duration::from_secs(5));

    let started = tokio::time::Instant::now();
    let report = guard_until_notice(poller, coordinator, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(*calls.lock(), 3);
    assert_eq!(report.final_state, LifecycleState::Completed);
    assert_eq!(report.exit_code(), EXIT_OK);
    assert_eq!(*backup.modes.lock(), vec![BackupMode::PreShutdown]);
    assert_eq!(
        channel.console_commands(),
        vec!["save-off", "save-all", "stop", "save-on"]
    );

    // Warnings go out on the poll that saw the notice, 10s in
    let timeline = channel.timeline();
    assert_eq!(timeline[0].0, Duration::from_secs(10));
    assert!(timeline[0].1.contains("Shutting down in 30 seconds"));
    // 10s of polling + 30s warning + 2 x 15s grace + 2 x 1s exit polls
    assert_eq!(started.elapsed(), Duration::from_secs(72));
}

#[tokio::test(start_paused = true)]
async fn test_no_notice_never_touches_the_server() {
    let calls = Arc::new(Mutex::new(0));
    let source = CountingSource {
        notice_on_call: None,
        calls: calls.clone(),
    };
    let channel = Arc::new(MockControlChannel::new());
    let backup = Arc::new(CountingBackup::default());
    let coordinator =
        LifecycleCoordinator::new(channel.clone(), backup.clone(), create_test_timings());
    let poller = TerminationPoller::new(source, Duration::from_secs(5));

    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(120)).await;
        canceller.cancel();
    });

    let report = guard_until_notice(poller, coordinator, &cancel).await;

    assert!(report.is_none());
    assert!(*calls.lock() >= 24);
    assert!(channel.commands().is_empty());
    assert_eq!(channel.liveness_checks(), 0);
    assert!(backup.modes.lock().is_empty());
}

/// Server root with a stand-in tmux, a pid file naming an exited process and
/// a backup agent that records the action it was given
fn prepare_server_root(root: &Path, backup_exit: i32) -> GuardConfig {
    let log = root.join("tmux.log");
    let tmux = root.join("fake-tmux");
    std::fs::write(
        &tmux,
        format!("#!/bin/sh\necho \"$@\" >> '{}'\n", log.display()),
    )
    .unwrap();
    std::fs::set_permissions(&tmux, std::fs::Permissions::from_mode(0o755)).unwrap();

    let mut child = std::process::Command::new("true").spawn().unwrap();
    let dead_pid = child.id();
    child.wait().unwrap();
    std::fs::write(root.join("server.pid"), format!("{}\n", dead_pid)).unwrap();

    let mut config = GuardConfig::default();
    config.control.tmux_binary = tmux.to_string_lossy().into_owned();
    config.control.pid_file = Some("server.pid".to_string());
    config.shutdown = ShutdownConfig {
        warning_delay_secs: 0,
        grace_delay_secs: 0,
        exit_poll_interval_millis: 10,
    };
    config.backup.command = "sh".to_string();
    config.backup.args = vec![
        "-c".to_string(),
        format!("echo \"$0\" > backup.log; exit {}", backup_exit),
    ];
    config
}

#[tokio::test]
async fn test_active_mode_drains_stops_and_backs_up() {
    let dir = tempfile::tempdir().unwrap();
    let config = prepare_server_root(dir.path(), 0);
    let app = GuardApp::new(config, dir.path().to_path_buf());

    let exit_code = app.run(RunMode::Active).await.unwrap();

    assert_eq!(exit_code, EXIT_OK);
    let backup_log = std::fs::read_to_string(dir.path().join("backup.log")).unwrap();
    assert_eq!(backup_log.trim(), "backup_current");

    let tmux_log = std::fs::read_to_string(dir.path().join("tmux.log")).unwrap();
    let sent: Vec<&str> = tmux_log
        .lines()
        .filter_map(|line| line.strip_prefix("send-keys -t minecraft -l "))
        .filter(|text| !text.starts_with("tellraw") && !text.starts_with("say"))
        .collect();
    assert_eq!(sent, vec!["save-off", "save-all", "stop", "save-on"]);
    assert!(!dir.path().join(".spotguard.lock").exists());
}

#[tokio::test]
async fn test_active_mode_backs_up_when_session_is_gone() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = prepare_server_root(dir.path(), 0);
    // tmux exits nonzero for every call: the session no longer exists
    config.control.tmux_binary = "false".to_string();
    config.control.pid_file = None;
    let app = GuardApp::new(config, dir.path().to_path_buf());

    let exit_code = app.run(RunMode::Active).await.unwrap();

    assert_eq!(exit_code, EXIT_SEQUENCE_FAILED);
    let backup_log = std::fs::read_to_string(dir.path().join("backup.log")).unwrap();
    assert_eq!(backup_log.trim(), "backup_current");
}

#[tokio::test]
async fn test_backup_mode_reports_agent_failure() {
    let dir = tempfile::tempdir().unwrap();
    let config = prepare_server_root(dir.path(), 2);
    let app = GuardApp::new(config, dir.path().to_path_buf());

    let exit_code = app.run(RunMode::Backup).await.unwrap();

    assert_eq!(exit_code, EXIT_BACKUP_FAILED);
    let backup_log = std::fs::read_to_string(dir.path().join("backup.log")).unwrap();
    assert_eq!(backup_log.trim(), "backup");

    let tmux_log = std::fs::read_to_string(dir.path().join("tmux.log")).unwrap();
    assert!(!tmux_log.contains("-l stop"));
    assert!(tmux_log.contains("-l save-on"));
}

#[tokio::test]
async fn test_second_guard_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let config = prepare_server_root(dir.path(), 0);
    let _held = InstanceLock::acquire(dir.path(), RunMode::Daemon).unwrap();
    let app = GuardApp::new(config, dir.path().to_path_buf());

    let err = app.run(RunMode::Active).await.unwrap_err();

    assert!(matches!(err, GuardError::AlreadyRunning { .. }));
    assert!(!dir.path().join("tmux.log").exists());
}
