use crate::coordinator::LifecycleState;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GuardError {
    #[error("Metadata endpoint unreachable: {message}")]
    MetadataUnreachable { message: String },

    #[error("Metadata response could not be parsed: {message}")]
    MetadataParse { message: String },

    #[error("Control channel unavailable for '{target}': {message}")]
    ChannelUnavailable { target: String, message: String },

    #[error("Backup failed: {reason}")]
    BackupFailure { reason: String },

    #[error("Invalid lifecycle transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: LifecycleState,
        to: LifecycleState,
    },

    #[error("Another guard (pid {pid}) already holds {}", path.display())]
    AlreadyRunning { path: PathBuf, pid: u32 },

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("System error: {message}")]
    System { message: String },
}

impl GuardError {
    pub fn metadata_unreachable<S: Into<String>>(message: S) -> Self {
        Self::MetadataUnreachable {
            message: message.into(),
        }
    }

    pub fn metadata_parse<S: Into<String>>(message: S) -> Self {
        Self::MetadataParse {
            message: message.into(),
        }
    }

    pub fn channel_unavailable<S: Into<String>>(target: S, message: S) -> Self {
        Self::ChannelUnavailable {
            target: target.into(),
            message: message.into(),
        }
    }

    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    /// Errors absorbed by the poll loop and retried on the next cycle
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GuardError::MetadataUnreachable { .. } | GuardError::MetadataParse { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, GuardError>;
