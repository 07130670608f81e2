// Notification sink backed by tracing, and a broadcast cache invalidator
use crate::application::notifications::{CacheInvalidator, NotificationSink};
use crate::domain::notification::{Notification, NotificationLevel};
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn notify(&self, n: Notification) {
        let image = n.mission_image_id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string());
        match n.level {
            NotificationLevel::Success => tracing::info!(
                mission_id = %n.mission_id,
                mission_image_id = %image,
                "{}: {}",
                n.title,
                n.message
            ),
            NotificationLevel::Warning => tracing::warn!(
                mission_id = %n.mission_id,
                mission_image_id = %image,
                "{}: {}",
                n.title,
                n.message
            ),
            NotificationLevel::Error => tracing::error!(
                mission_id = %n.mission_id,
                mission_image_id = %image,
                "{}: {}",
                n.title,
                n.message
            ),
        }
    }
}

/// Publishes invalidated mission ids to every subscriber
#[derive(Debug, Clone)]
pub struct BroadcastInvalidator {
    sender: broadcast::Sender<Uuid>,
}

impl BroadcastInvalidator {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Uuid> {
        self.sender.subscribe()
    }
}

impl CacheInvalidator for BroadcastInvalidator {
    fn invalidate(&self, mission_id: Uuid) {
        // No subscribers is not an error
        let _ = self.sender.send(mission_id);
    }
}
