pub mod app;
pub mod backup;
pub mod config;
pub mod control;
pub mod coordinator;
pub mod error;
pub mod metadata;
pub mod notice;
pub mod notify;

pub use app::{guard_until_notice, GuardApp, InstanceLock, RunMode};
pub use backup::{BackupMode, BackupOutcome, BackupTrigger, CommandBackupTrigger};
pub use config::GuardConfig;
pub use control::{ControlChannel, MockControlChannel, ServerProcessHandle, TmuxControlChannel};
pub use coordinator::{LifecycleCoordinator, LifecycleState, SequenceReport, Trigger};
pub use error::{GuardError, Result};
pub use metadata::{HttpMetadataSource, MetadataSource, TerminationPoller};
pub use notice::{TerminationAction, TerminationNotice};
pub use notify::{NotificationMessage, Notifier, Severity};
