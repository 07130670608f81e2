// Notification events surfaced to the caller
use serde::Serialize;
use uuid::Uuid;

/// Ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub message: String,
    pub mission_id: Uuid,
    pub mission_image_id: Option<Uuid>,
}

impl Notification {
    pub fn new(
        level: NotificationLevel,
        title: impl Into<String>,
        message: impl Into<String>,
        mission_id: Uuid,
        mission_image_id: Option<Uuid>,
    ) -> Self {
        Self {
            level,
            title: title.into(),
            message: message.into(),
            mission_id,
            mission_image_id,
        }
    }

    /// Raise the level (never lowering it), retitle, and append `detail` to the message
    pub fn escalate(mut self, level: NotificationLevel, title: impl Into<String>, detail: &str) -> Self {
        if level > self.level {
            self.level = level;
            self.title = title.into();
        }
        self.message = format!("{}. {}", self.message, detail);
        self
    }
}
