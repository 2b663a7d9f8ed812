use crate::error::Result;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Name of the optional config file looked up inside the server root
pub const DEFAULT_CONFIG_FILE: &str = "spotguard.toml";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct GuardConfig {
    pub metadata: MetadataConfig,
    pub shutdown: ShutdownConfig,
    pub control: ControlConfig,
    pub backup: BackupConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MetadataConfig {
    /// Instance-action endpoint; 404 means no termination is scheduled
    #[serde(default = "default_metadata_endpoint")]
    pub endpoint: String,

    /// Seconds between metadata polls
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// IMDSv2 token endpoint; when unset requests are sent without a token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ShutdownConfig {
    /// Window between the player warnings and the first save command
    #[serde(default = "default_warning_delay_secs")]
    pub warning_delay_secs: u64,

    /// Pause between save-off, save-all and stop
    #[serde(default = "default_grace_delay_secs")]
    pub grace_delay_secs: u64,

    /// Liveness check cadence while waiting for the server to exit
    #[serde(default = "default_exit_poll_interval_millis")]
    pub exit_poll_interval_millis: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ControlConfig {
    /// tmux executable used to inject console commands
    #[serde(default = "default_tmux_binary")]
    pub tmux_binary: String,

    /// tmux session or pane running the server console
    #[serde(default = "default_control_target")]
    pub target: String,

    /// File holding the server pid, relative to the server root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid_file: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct BackupConfig {
    /// Backup agent executable
    #[serde(default = "default_backup_command")]
    pub command: String,

    /// Arguments placed before the action, e.g. `--cfg /minecraft/prospector.cfg`
    #[serde(default)]
    pub args: Vec<String>,

    /// Action for backups taken while the server keeps running
    #[serde(default = "default_scheduled_action")]
    pub scheduled_action: String,

    /// Action for backups taken after the server has exited
    #[serde(default = "default_pre_shutdown_action")]
    pub pre_shutdown_action: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct LoggingConfig {
    /// Append log output to this file in addition to stderr
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl MetadataConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl ShutdownConfig {
    pub fn warning_delay(&self) -> Duration {
        Duration::from_secs(self.warning_delay_secs)
    }

    pub fn grace_delay(&self) -> Duration {
        Duration::from_secs(self.grace_delay_secs)
    }

    pub fn exit_poll_interval(&self) -> Duration {
        Duration::from_millis(self.exit_poll_interval_millis)
    }
}

impl ControlConfig {
    /// Absolute pid file location, if one is configured
    pub fn pid_path(&self, server_root: &Path) -> Option<PathBuf> {
        self.pid_file.as_ref().map(|file| server_root.join(file))
    }
}

impl GuardConfig {
    /// Load configuration for a server root, using `<root>/spotguard.toml` if present
    pub fn load_for_root(server_root: &Path) -> Result<Self> {
        Self::load_from_file(server_root.join(DEFAULT_CONFIG_FILE))
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("metadata.endpoint", default_metadata_endpoint())?
            .set_default("metadata.poll_interval_secs", default_poll_interval_secs())?
            .set_default(
                "metadata.request_timeout_secs",
                default_request_timeout_secs(),
            )?
            .set_default("shutdown.warning_delay_secs", default_warning_delay_secs())?
            .set_default("shutdown.grace_delay_secs", default_grace_delay_secs())?
            .set_default(
                "shutdown.exit_poll_interval_millis",
                default_exit_poll_interval_millis(),
            )?
            .set_default("control.tmux_binary", default_tmux_binary())?
            .set_default("control.target", default_control_target())?
            .set_default("backup.command", default_backup_command())?
            .set_default("backup.args", Vec::<String>::new())?
            .set_default("backup.scheduled_action", default_scheduled_action())?
            .set_default(
                "backup.pre_shutdown_action",
                default_pre_shutdown_action(),
            )?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // SPOTGUARD_SHUTDOWN__WARNING_DELAY_SECS=60 and friends
            .add_source(
                Environment::with_prefix("SPOTGUARD")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: GuardConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.metadata.endpoint.trim().is_empty() {
            return Err(ConfigError::Message(
                "Metadata endpoint must not be empty".to_string(),
            ));
        }

        if self.metadata.poll_interval_secs == 0 {
            return Err(ConfigError::Message(
                "Metadata poll_interval_secs must be greater than 0".to_string(),
            ));
        }

        if self.shutdown.exit_poll_interval_millis == 0 {
            return Err(ConfigError::Message(
                "Shutdown exit_poll_interval_millis must be greater than 0".to_string(),
            ));
        }

        if self.control.target.trim().is_empty() {
            return Err(ConfigError::Message(
                "Control target must not be empty".to_string(),
            ));
        }

        if self.backup.command.trim().is_empty() {
            return Err(ConfigError::Message(
                "Backup command must not be empty".to_string(),
            ));
        }

        if self.backup.scheduled_action.trim().is_empty()
            || self.backup.pre_shutdown_action.trim().is_empty()
        {
            return Err(ConfigError::Message(
                "Backup actions must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            metadata: MetadataConfig {
                endpoint: default_metadata_endpoint(),
                poll_interval_secs: default_poll_interval_secs(),
                request_timeout_secs: default_request_timeout_secs(),
                token_endpoint: None,
            },
            shutdown: ShutdownConfig::default(),
            control: ControlConfig {
                tmux_binary: default_tmux_binary(),
                target: default_control_target(),
                pid_file: None,
            },
            backup: BackupConfig {
                command: default_backup_command(),
                args: Vec::new(),
                scheduled_action: default_scheduled_action(),
                pre_shutdown_action: default_pre_shutdown_action(),
            },
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            warning_delay_secs: default_warning_delay_secs(),
            grace_delay_secs: default_grace_delay_secs(),
            exit_poll_interval_millis: default_exit_poll_interval_millis(),
        }
    }
}

// Default value functions
fn default_metadata_endpoint() -> String {
    "http://169.254.169.254/latest/meta-data/spot/instance-action".to_string()
}
fn default_poll_interval_secs() -> u64 {
    5
}
fn default_request_timeout_secs() -> u64 {
    2
}

fn default_warning_delay_secs() -> u64 {
    30
}
fn default_grace_delay_secs() -> u64 {
    15
}
fn default_exit_poll_interval_millis() -> u64 {
    1000
}

fn default_tmux_binary() -> String {
    "tmux".to_string()
}
fn default_control_target() -> String {
    "minecraft".to_string()
}

fn default_backup_command() -> String {
    "prospector".to_string()
}
fn default_scheduled_action() -> String {
    "backup".to_string()
}
fn default_pre_shutdown_action() -> String {
    "backup_current".to_string()
}
