mod lock;
mod runtime;
mod types;

#[cfg(test)]
mod tests;

pub use lock::InstanceLock;
pub use runtime::{guard_until_notice, GuardApp};
pub use types::{
    RunMode, EXIT_ALREADY_RUNNING, EXIT_BACKUP_FAILED, EXIT_OK, EXIT_SEQUENCE_FAILED,
    EXIT_STARTUP_FAILED,
};
