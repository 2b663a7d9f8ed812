use crate::error::{GuardError, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fmt;

/// What the cloud provider is about to do to the instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationAction {
    Stop,
    Terminate,
    Hibernate,
}

impl TerminationAction {
    pub fn parse(action: &str) -> Option<Self> {
        match action.trim().to_ascii_lowercase().as_str() {
            "stop" => Some(Self::Stop),
            "terminate" => Some(Self::Terminate),
            "hibernate" => Some(Self::Hibernate),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Terminate => "terminate",
            Self::Hibernate => "hibernate",
        }
    }
}

impl fmt::Display for TerminationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Imminent-termination notice read from the instance metadata service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminationNotice {
    pub action: TerminationAction,
    pub scheduled_time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct RawNotice {
    action: String,
    time: DateTime<Utc>,
}

impl TerminationNotice {
    /// Parse an instance-action body such as
    /// `{"action": "stop", "time": "2030-01-01T00:00:00Z"}`
    pub fn from_json(body: &str) -> Result<Self> {
        let raw: RawNotice = serde_json::from_str(body)
            .map_err(|e| GuardError::metadata_parse(e.to_string()))?;

        let action = TerminationAction::parse(&raw.action).ok_or_else(|| {
            GuardError::metadata_parse(format!("unrecognized action '{}'", raw.action))
        })?;

        Ok(Self {
            action,
            scheduled_time: raw.time,
        })
    }

    /// Time left until the scheduled action, zero if it has already passed
    pub fn time_remaining(&self, now: DateTime<Utc>) -> chrono::Duration {
        (self.scheduled_time - now).max(chrono::Duration::zero())
    }
}

impl fmt::Display for TerminationNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} scheduled at {}",
            self.action,
            self.scheduled_time.to_rfc3339()
        )
    }
}
