use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::{Map, Value};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::models::notification::{Notification, NotificationType};

pub struct NewNotification {
    pub recipient: Uuid,
    pub delivery: Uuid,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub metadata: Map<String, Value>,
}

/// Append-only notification log, partitioned by recipient.
///
/// Ids are drawn while the recipient's shard is write-locked, so each
/// recipient's list is always sorted by id and a reader can never observe a
/// larger id before a smaller one for the same recipient.
///
/// Appends only wake subscribers waiting on the same recipient.
pub struct NotificationStore {
    next_id: AtomicU64,
    by_recipient: DashMap<Uuid, Vec<Notification>>,
    wakers: DashMap<Uuid, Arc<Notify>>,
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            by_recipient: DashMap::new(),
            wakers: DashMap::new(),
        }
    }

    pub fn append(&self, new: NewNotification) -> Notification {
        let notification = {
            let mut entries = self.by_recipient.entry(new.recipient).or_default();
            let notification = Notification {
                id: self.next_id.fetch_add(1, Ordering::SeqCst),
                recipient: new.recipient,
                delivery: new.delivery,
                notification_type: new.notification_type,
                title: new.title,
                message: new.message,
                is_read: false,
                metadata: new.metadata,
                created_at: Utc::now(),
            };
            entries.push(notification.clone());
            notification
        };

        if let Some(waker) = self.wakers.get(&notification.recipient) {
            waker.notify_waiters();
        }
        notification
    }

    /// Unread notifications for `recipient` with an id strictly greater than `after`, oldest first.
    pub fn unread_after(&self, recipient: &Uuid, after: u64) -> Vec<Notification> {
        let Some(entries) = self.by_recipient.get(recipient) else {
            return Vec::new();
        };

        let start = entries.partition_point(|n| n.id <= after);
        entries[start..]
            .iter()
            .filter(|n| !n.is_read)
            .cloned()
            .collect()
    }

    pub fn for_recipient(&self, recipient: &Uuid) -> Vec<Notification> {
        self.by_recipient
            .get(recipient)
            .map(|entries| entries.value().clone())
            .unwrap_or_default()
    }

    pub fn mark_read(&self, recipient: &Uuid, id: u64) -> bool {
        let Some(mut entries) = self.by_recipient.get_mut(recipient) else {
            return false;
        };

        match entries.binary_search_by_key(&id, |n| n.id) {
            Ok(index) => {
                entries[index].is_read = true;
                true
            }
            Err(_) => false,
        }
    }

    pub fn len(&self) -> usize {
        self.by_recipient.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wakeup for appends addressed to `recipient`. Enable a `notified()`
    /// future before querying to avoid missed wakeups.
    pub fn waker(&self, recipient: &Uuid) -> Arc<Notify> {
        Arc::clone(self.wakers.entry(*recipient).or_default().value())
    }
}
