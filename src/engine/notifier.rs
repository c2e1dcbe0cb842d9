use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::models::delivery::{Delivery, DeliveryStatus};
use crate::models::notification::{Notification, NotificationType};
use crate::models::user::User;
use crate::state::AppState;
use crate::store::notifications::NewNotification;

const STATUS_UPDATED_TITLE: &str = "Delivery Status Updated";

/// Persists a notification for the delivery's creator.
///
/// A delivery without a recorded creator yields `None`; the state change that
/// triggered the call stands either way.
pub fn emit(
    state: &AppState,
    delivery: &Delivery,
    notification_type: NotificationType,
    title: &str,
    message: String,
    metadata: Map<String, Value>,
) -> Option<Notification> {
    let Some(recipient) = delivery.created_by else {
        warn!(
            delivery_id = %delivery.id,
            notification_type = notification_type.as_str(),
            "delivery has no creator; skipping notification"
        );
        return None;
    };

    let notification = state.notifications.append(NewNotification {
        recipient,
        delivery: delivery.id,
        notification_type,
        title: title.to_string(),
        message,
        metadata,
    });

    state
        .metrics
        .notifications_emitted_total
        .with_label_values(&[notification_type.as_str()])
        .inc();

    info!(
        notification_id = notification.id,
        delivery_id = %delivery.id,
        recipient = %recipient,
        notification_type = notification_type.as_str(),
        "notification emitted"
    );

    Some(notification)
}

pub fn notify_created(state: &AppState, delivery: &Delivery) -> Option<Notification> {
    emit(
        state,
        delivery,
        NotificationType::DeliveryCreated,
        "Delivery Requested",
        format!(
            "Your delivery request for {} has been received.",
            delivery.product_label()
        ),
        metadata(json!({ "status": delivery.status })),
    )
}

pub fn notify_assigned(state: &AppState, delivery: &Delivery, assignee: &User) -> Option<Notification> {
    let assignee_name = assignee.full_name();

    emit(
        state,
        delivery,
        NotificationType::DeliveryAssigned,
        "Delivery Assigned",
        format!(
            "Your delivery for {} has been assigned to {}",
            delivery.product_label(),
            assignee_name
        ),
        metadata(json!({
            "assigned_to": assignee.id,
            "assignee_name": assignee_name,
        })),
    )
}

pub fn notify_status_changed(
    state: &AppState,
    delivery: &Delivery,
    old_status: DeliveryStatus,
    new_status: DeliveryStatus,
) -> Option<Notification> {
    let (notification_type, message) = status_template(delivery, new_status);

    emit(
        state,
        delivery,
        notification_type,
        STATUS_UPDATED_TITLE,
        message,
        metadata(json!({
            "old_status": old_status,
            "new_status": new_status,
        })),
    )
}

pub fn status_template(delivery: &Delivery, new_status: DeliveryStatus) -> (NotificationType, String) {
    let product = delivery.product_label();

    match new_status {
        DeliveryStatus::InTransit => (
            NotificationType::StatusChanged,
            format!("Your delivery #{product} is now in transit."),
        ),
        DeliveryStatus::Completed => (
            NotificationType::DeliveryCompleted,
            format!("Your delivery #{product} has been completed successfully!"),
        ),
        DeliveryStatus::Failed => (
            NotificationType::DeliveryFailed,
            format!("Your delivery #{product} has failed. Please contact support."),
        ),
        other => (
            NotificationType::StatusChanged,
            format!("Your delivery status changed to {other}"),
        ),
    }
}

fn metadata(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use serde_json::Map;
    use uuid::Uuid;

    use super::{emit, notify_assigned, notify_status_changed, status_template};
    use crate::config::Config;
    use crate::models::delivery::{Delivery, DeliveryStatus};
    use crate::models::notification::NotificationType;
    use crate::models::user::{Role, User};
    use crate::state::AppState;

    fn delivery(created_by: Option<Uuid>) -> Delivery {
        Delivery {
            id: Uuid::new_v4(),
            idempotency_key: None,
            product_name: Some("Laptop".to_string()),
            delivery_address: None,
            status: DeliveryStatus::InTransit,
            delivery_date: NaiveDate::from_ymd_opt(2026, 2, 5).unwrap(),
            assigned_to: None,
            created_by,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn missing_creator_emits_nothing() {
        let (state, _rx) = AppState::new(&Config::default());

        let result = emit(
            &state,
            &delivery(None),
            NotificationType::StatusChanged,
            "t",
            "m".to_string(),
            Map::new(),
        );

        assert!(result.is_none());
        assert!(state.notifications.is_empty());
    }

    #[test]
    fn status_change_records_old_and_new_status() {
        let (state, _rx) = AppState::new(&Config::default());
        let creator = Uuid::new_v4();
        let delivery = delivery(Some(creator));

        let notification = notify_status_changed(
            &state,
            &delivery,
            DeliveryStatus::InTransit,
            DeliveryStatus::Completed,
        )
        .unwrap();

        assert_eq!(notification.recipient, creator);
        assert_eq!(notification.notification_type, NotificationType::DeliveryCompleted);
        assert_eq!(notification.title, "Delivery Status Updated");
        assert_eq!(notification.metadata["old_status"], "IN_TRANSIT");
        assert_eq!(notification.metadata["new_status"], "COMPLETED");
        assert!(!notification.is_read);
    }

    #[test]
    fn templates_follow_target_status() {
        let delivery = delivery(Some(Uuid::new_v4()));

        let (kind, message) = status_template(&delivery, DeliveryStatus::InTransit);
        assert_eq!(kind, NotificationType::StatusChanged);
        assert_eq!(message, "Your delivery #Laptop is now in transit.");

        let (kind, _) = status_template(&delivery, DeliveryStatus::Failed);
        assert_eq!(kind, NotificationType::DeliveryFailed);

        let (kind, message) = status_template(&delivery, DeliveryStatus::Assigned);
        assert_eq!(kind, NotificationType::StatusChanged);
        assert_eq!(message, "Your delivery status changed to ASSIGNED");
    }

    #[test]
    fn assignment_message_names_the_assignee() {
        let (state, _rx) = AppState::new(&Config::default());
        let delivery = delivery(Some(Uuid::new_v4()));
        let admin = User::new("Ada", "Lovelace", "ada@test.com", Role::Admin);

        let notification = notify_assigned(&state, &delivery, &admin).unwrap();

        assert_eq!(notification.notification_type, NotificationType::DeliveryAssigned);
        assert_eq!(
            notification.message,
            "Your delivery for Laptop has been assigned to Ada Lovelace"
        );
        assert_eq!(notification.metadata["assignee_name"], "Ada Lovelace");
    }
}
