use clap::ValueEnum;
use serde::{Deserialize, Serialize};

pub const EXIT_OK: i32 = 0;
pub const EXIT_BACKUP_FAILED: i32 = 1;
pub const EXIT_SEQUENCE_FAILED: i32 = 2;
pub const EXIT_STARTUP_FAILED: i32 = 3;
pub const EXIT_ALREADY_RUNNING: i32 = 4;

/// Entry point into the lifecycle machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Poll instance metadata and drain the server when a notice appears
    Daemon,
    /// Drain, stop and back up the server right now
    Active,
    /// Back up while the server keeps running
    Backup,
}
