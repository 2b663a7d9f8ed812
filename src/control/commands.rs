use std::fmt;

/// Server console commands used while draining the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Disable automatic world saves
    SaveOff,
    /// Flush all loaded chunks to disk
    SaveAll,
    /// Re-enable automatic world saves
    SaveOn,
    Stop,
}

impl ConsoleCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SaveOff => "save-off",
            Self::SaveAll => "save-all",
            Self::SaveOn => "save-on",
            Self::Stop => "stop",
        }
    }
}

impl fmt::Display for ConsoleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
