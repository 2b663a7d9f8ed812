use super::{process_exists, ControlChannel, ServerProcessHandle};
use crate::config::ControlConfig;
use crate::error::{GuardError, Result};
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Drives a server console running inside a tmux session or pane
pub struct TmuxControlChannel {
    tmux_binary: String,
    target: String,
    pid_file: Option<PathBuf>,
}

impl TmuxControlChannel {
    pub fn new(config: &ControlConfig, server_root: &Path) -> Self {
        Self {
            tmux_binary: config.tmux_binary.clone(),
            target: config.target.clone(),
            pid_file: config.pid_path(server_root),
        }
    }

    fn unavailable<S: Into<String>>(&self, message: S) -> GuardError {
        GuardError::channel_unavailable(self.target.clone(), message.into())
    }

    async fn tmux_output(&self, args: &[&str]) -> Result<Output> {
        Command::new(&self.tmux_binary)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| self.unavailable(format!("failed to run {}: {}", self.tmux_binary, e)))
    }

    /// Run a tmux subcommand and return its stdout
    async fn tmux(&self, args: &[&str]) -> Result<String> {
        let output = self.tmux_output(args).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.unavailable(format!(
                "{} {} exited with {}: {}",
                self.tmux_binary,
                args.first().copied().unwrap_or_default(),
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn read_pid_file(&self, path: &Path) -> Result<u32> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| self.unavailable(format!("cannot read {}: {}", path.display(), e)))?;

        parse_pid(&contents)
            .ok_or_else(|| self.unavailable(format!("{} does not hold a pid", path.display())))
    }

    /// Pid of the process running in the target pane. `None` when tmux
    /// reports no such session or pane.
    async fn locate_pane_process(&self) -> Result<Option<u32>> {
        let output = self
            .tmux_output(&[
                "display-message",
                "-p",
                "-t",
                &self.target,
                "#{pane_pid} #{pane_current_command}",
            ])
            .await?;

        if !output.status.success() {
            info!(
                target_pane = %self.target,
                "tmux has no such session: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Ok(None);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let (pane_pid, command) = parse_pane_info(&stdout)
            .ok_or_else(|| self.unavailable(format!("unexpected pane info '{}'", stdout.trim())))?;

        if !is_shell(command) {
            return Ok(Some(pane_pid));
        }

        // The server was started from the pane's shell, which never exits on its own
        match first_child(pane_pid).await {
            Some(child) => {
                info!(
                    target_pane = %self.target,
                    "Pane runs {} (pid {}), managing its child pid {}",
                    command, pane_pid, child
                );
                Ok(Some(child))
            }
            None => {
                warn!(
                    target_pane = %self.target,
                    "Pane runs shell {} (pid {}) with no child process; its exit will not \
                     be observed, set control.pid_file to the server's pid file",
                    command, pane_pid
                );
                Ok(Some(pane_pid))
            }
        }
    }
}

/// Split `display-message` output of the form `<pid> <command>`
fn parse_pane_info(text: &str) -> Option<(u32, &str)> {
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let pid = parse_pid(parts.next()?)?;
    Some((pid, parts.next().unwrap_or("").trim()))
}

fn is_shell(command: &str) -> bool {
    matches!(
        command.trim_start_matches('-'),
        "sh" | "bash" | "dash" | "ash" | "zsh" | "ksh" | "fish"
    )
}

/// First child of `pid` as listed by procfs
async fn first_child(pid: u32) -> Option<u32> {
    let children = tokio::fs::read_to_string(format!("/proc/{pid}/task/{pid}/children"))
        .await
        .ok()?;
    children.split_whitespace().find_map(parse_pid)
}

fn parse_pid(text: &str) -> Option<u32> {
    text.trim().parse::<u32>().ok().filter(|pid| *pid > 0)
}

/// Keep a command on a single console line
fn single_line(command: &str) -> String {
    command.replace(['\r', '\n'], " ")
}

#[async_trait::async_trait]
impl ControlChannel for TmuxControlChannel {
    fn target(&self) -> &str {
        &self.target
    }

    async fn send_command(&self, command: &str) -> Result<()> {
        let line = single_line(command);
        debug!(target_pane = %self.target, "sending console command: {}", line);

        // -l sends the text literally so words like "Enter" are not taken as key names
        self.tmux(&["send-keys", "-t", &self.target, "-l", &line])
            .await?;
        self.tmux(&["send-keys", "-t", &self.target, "Enter"]).await?;
        Ok(())
    }

    async fn locate_process(&self) -> Result<Option<ServerProcessHandle>> {
        let pid = match &self.pid_file {
            Some(path) => match self.read_pid_file(path).await {
                Ok(pid) => Some(pid),
                Err(e) => {
                    warn!("{}, falling back to the tmux pane", e);
                    self.locate_pane_process().await?
                }
            },
            None => self.locate_pane_process().await?,
        };

        debug!(target_pane = %self.target, ?pid, "located server process");
        Ok(pid.map(ServerProcessHandle::new))
    }

    fn is_process_alive(&self, pid: u32) -> bool {
        process_exists(pid)
    }
}
