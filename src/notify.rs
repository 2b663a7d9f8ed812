use crate::control::ControlChannel;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Presentation hint for player broadcasts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMessage {
    pub text: String,
    pub severity: Severity,
}

impl NotificationMessage {
    pub fn new<S: Into<String>>(text: S, severity: Severity) -> Self {
        Self {
            text: text.into(),
            severity,
        }
    }

    pub fn info<S: Into<String>>(text: S) -> Self {
        Self::new(text, Severity::Info)
    }

    pub fn warning<S: Into<String>>(text: S) -> Self {
        Self::new(text, Severity::Warning)
    }

    pub fn critical<S: Into<String>>(text: S) -> Self {
        Self::new(text, Severity::Critical)
    }

    /// Console line that broadcasts this message to every player
    pub fn console_command(&self) -> String {
        match self.severity {
            Severity::Info => format!("say {}", self.text),
            Severity::Warning => format!(
                "tellraw @a {}",
                json!({ "text": format!("[Server] {}", self.text), "color": "gold" })
            ),
            Severity::Critical => format!(
                "tellraw @a {}",
                json!({ "text": format!("[Server] {}", self.text), "color": "red", "bold": true })
            ),
        }
    }
}

/// Best-effort player broadcasts over the control channel
#[derive(Clone)]
pub struct Notifier {
    channel: Arc<dyn ControlChannel>,
}

impl Notifier {
    pub fn new(channel: Arc<dyn ControlChannel>) -> Self {
        Self { channel }
    }

    /// Delivery failures are logged and swallowed. Returns whether the
    /// broadcast reached the console.
    pub async fn notify(&self, message: &NotificationMessage) -> bool {
        info!(severity = ?message.severity, "Broadcast: {}", message.text);

        match self.channel.send_command(&message.console_command()).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Broadcast to players failed: {}", e);
                false
            }
        }
    }
}
