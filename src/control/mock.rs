use super::{ControlChannel, ServerProcessHandle};
use crate::error::{GuardError, Result};
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// In-memory control channel for exercising the lifecycle without a server.
///
/// Records every command, reports the process alive for a scripted number of
/// liveness checks, and can fail selected commands with `ChannelUnavailable`.
pub struct MockControlChannel {
    target: String,
    pid: u32,
    created: Instant,
    commands: Mutex<Vec<(Duration, String)>>,
    alive_checks_remaining: Mutex<u32>,
    liveness_checks: Mutex<u32>,
    failing_prefixes: Vec<String>,
    locate_fails: bool,
    session_gone: bool,
}

impl MockControlChannel {
    /// Channel whose process exits as soon as it is checked
    pub fn new() -> Self {
        Self {
            target: "mock".to_string(),
            pid: 4242,
            created: Instant::now(),
            commands: Mutex::new(Vec::new()),
            alive_checks_remaining: Mutex::new(0),
            liveness_checks: Mutex::new(0),
            failing_prefixes: Vec::new(),
            locate_fails: false,
            session_gone: false,
        }
    }

    /// Report the process alive for the next `checks` liveness checks
    pub fn alive_for(self, checks: u32) -> Self {
        *self.alive_checks_remaining.lock() = checks;
        self
    }

    /// Fail any command starting with `prefix`
    pub fn failing_on(mut self, prefix: &str) -> Self {
        self.failing_prefixes.push(prefix.to_string());
        self
    }

    /// Fail process lookup
    pub fn without_process(mut self) -> Self {
        self.locate_fails = true;
        self
    }

    /// Report the console session as gone: the server is no longer running
    pub fn without_session(mut self) -> Self {
        self.session_gone = true;
        self
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Commands delivered so far, in order
    pub fn commands(&self) -> Vec<String> {
        self.commands
            .lock()
            .iter()
            .map(|(_, command)| command.clone())
            .collect()
    }

    /// Commands with their delivery time relative to channel creation
    pub fn timeline(&self) -> Vec<(Duration, String)> {
        self.commands.lock().clone()
    }

    /// Commands delivered so far, without player broadcasts
    pub fn console_commands(&self) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|command| !command.starts_with("say ") && !command.starts_with("tellraw "))
            .collect()
    }

    pub fn liveness_checks(&self) -> u32 {
        *self.liveness_checks.lock()
    }
}

impl Default for MockControlChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ControlChannel for MockControlChannel {
    fn target(&self) -> &str {
        &self.target
    }

    async fn send_command(&self, command: &str) -> Result<()> {
        if self
            .failing_prefixes
            .iter()
            .any(|prefix| command.starts_with(prefix.as_str()))
        {
            return Err(GuardError::channel_unavailable(
                self.target.clone(),
                format!("refusing '{}'", command),
            ));
        }

        debug!("Mock console received: {}", command);
        self.commands
            .lock()
            .push((self.created.elapsed(), command.to_string()));
        Ok(())
    }

    async fn locate_process(&self) -> Result<Option<ServerProcessHandle>> {
        if self.locate_fails {
            return Err(GuardError::channel_unavailable(
                self.target.as_str(),
                "transport down",
            ));
        }
        if self.session_gone {
            return Ok(None);
        }
        Ok(Some(ServerProcessHandle::new(self.pid)))
    }

    fn is_process_alive(&self, pid: u32) -> bool {
        *self.liveness_checks.lock() += 1;
        if pid != self.pid {
            return false;
        }

        let mut remaining = self.alive_checks_remaining.lock();
        if *remaining == 0 {
            false
        } else {
            *remaining -= 1;
            true
        }
    }
}
