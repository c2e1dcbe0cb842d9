use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    DeliveryCreated,
    DeliveryAssigned,
    StatusChanged,
    DeliveryCompleted,
    DeliveryFailed,
}

impl NotificationType {
    pub const fn as_str(self) -> &'static str {
        match self {
            NotificationType::DeliveryCreated => "delivery_created",
            NotificationType::DeliveryAssigned => "delivery_assigned",
            NotificationType::StatusChanged => "status_changed",
            NotificationType::DeliveryCompleted => "delivery_completed",
            NotificationType::DeliveryFailed => "delivery_failed",
        }
    }
}

/// A message addressed to the creator of a delivery.
///
/// Ids come from a single increasing counter, so they double as stream cursors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: u64,
    pub recipient: Uuid,
    pub delivery: Uuid,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}
