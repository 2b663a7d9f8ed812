use crate::error::Result;
use std::fmt;

/// The managed server process, as located through a control channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerProcessHandle {
    pid: u32,
}

impl ServerProcessHandle {
    pub fn new(pid: u32) -> Self {
        Self { pid }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Liveness as reported by the channel that owns this handle
    pub fn is_alive(&self, channel: &dyn ControlChannel) -> bool {
        channel.is_process_alive(self.pid)
    }
}

impl fmt::Display for ServerProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid {}", self.pid)
    }
}

/// Console access to the managed server.
///
/// Commands are fire-and-forget: a successful `send_command` only means the
/// text reached the console, not that the server acted on it.
#[async_trait::async_trait]
pub trait ControlChannel: Send + Sync {
    /// Session or pane identifier, for logging
    fn target(&self) -> &str;

    /// Inject one console line. Fails with `ChannelUnavailable` when the
    /// target cannot be reached.
    async fn send_command(&self, command: &str) -> Result<()>;

    /// Resolve the server process behind the console. `Ok(None)` means the
    /// console session no longer exists, so no server is running behind it.
    async fn locate_process(&self) -> Result<Option<ServerProcessHandle>>;

    fn is_process_alive(&self, pid: u32) -> bool;
}
