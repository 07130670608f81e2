// Fire-and-forget sinks for notifications and cache invalidation
use crate::domain::notification::Notification;
use uuid::Uuid;

/// Observational only; implementations must never fail the caller
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

pub trait CacheInvalidator: Send + Sync {
    /// Signal that reads for this mission must be refreshed
    fn invalidate(&self, mission_id: Uuid);
}
