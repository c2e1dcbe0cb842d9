//! Cursor-based notification subscriptions.
//!
//! A [`Subscription`] tracks the last notification id handed to one
//! connection. [`Subscription::next_batch`] returns everything unread past
//! the cursor, waiting up to a timeout when there is nothing yet; an empty
//! batch means "still alive, nothing new". Dropping a subscription ends it.
//! A [`SubscriptionHandle`] or the service-wide shutdown signal can also
//! cancel it, and the cancellation is observed immediately, even mid-wait.

use std::sync::Arc;
use std::time::Duration;

use prometheus::IntGauge;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::notification::Notification;
use crate::state::AppState;
use crate::store::notifications::NotificationStore;

/// Cancels a [`Subscription`] from outside the task that polls it.
///
/// The SSE route does not hold one: dropping the response body drops the
/// subscription, which ends its wait on the spot. Handles serve callers that
/// drive a subscription from another task.
#[derive(Clone)]
pub struct SubscriptionHandle {
    cancel: Arc<watch::Sender<bool>>,
}

impl SubscriptionHandle {
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }
}

pub struct Subscription {
    recipient: Uuid,
    cursor: u64,
    store: Arc<NotificationStore>,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
    shutdown: watch::Receiver<bool>,
    active: IntGauge,
}

impl Subscription {
    pub fn open(state: &AppState, recipient: Uuid, last_id: u64) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let active = state.metrics.notification_streams_active.clone();
        active.inc();

        info!(recipient = %recipient, last_id, "notification stream opened");

        Self {
            recipient,
            cursor: last_id,
            store: Arc::clone(&state.notifications),
            cancel_tx: Arc::new(cancel_tx),
            cancel_rx,
            shutdown: state.shutdown_signal(),
            active,
        }
    }

    pub fn handle(&self) -> SubscriptionHandle {
        SubscriptionHandle {
            cancel: Arc::clone(&self.cancel_tx),
        }
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow() || *self.shutdown.borrow()
    }

    /// Next batch of unread notifications past the cursor, oldest first.
    ///
    /// Returns `None` once cancelled. Otherwise waits until something arrives
    /// for this recipient or `wait` elapses, in which case the batch is empty.
    /// A wakeup that turns up nothing unread keeps waiting for the same deadline.
    pub async fn next_batch(&mut self, wait: Duration) -> Option<Vec<Notification>> {
        let deadline = Instant::now() + wait;
        let waker = self.store.waker(&self.recipient);

        loop {
            if self.is_cancelled() {
                return None;
            }

            let appended = waker.notified();
            tokio::pin!(appended);
            appended.as_mut().enable();

            let batch = self.poll();
            if !batch.is_empty() {
                return Some(batch);
            }

            tokio::select! {
                _ = wait_cancelled(&mut self.cancel_rx) => return None,
                _ = wait_cancelled(&mut self.shutdown) => return None,
                _ = &mut appended => {}
                _ = tokio::time::sleep_until(deadline) => return Some(Vec::new()),
            }
        }
    }

    fn poll(&mut self) -> Vec<Notification> {
        let batch = self.store.unread_after(&self.recipient, self.cursor);
        if let Some(last) = batch.last() {
            self.cursor = last.id;
            debug!(recipient = %self.recipient, count = batch.len(), cursor = self.cursor, "notification batch ready");
        }
        batch
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.active.dec();
        info!(recipient = %self.recipient, cursor = self.cursor, "notification stream closed");
    }
}

async fn wait_cancelled(rx: &mut watch::Receiver<bool>) {
    // A dropped sender counts as cancellation too.
    let _ = rx.wait_for(|cancelled| *cancelled).await;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{NaiveDate, Utc};
    use serde_json::Map;
    use uuid::Uuid;

    use super::Subscription;
    use crate::config::Config;
    use crate::engine::notifier::emit;
    use crate::models::delivery::{Delivery, DeliveryStatus};
    use crate::models::notification::NotificationType;
    use crate::state::AppState;

    fn delivery_for(creator: Uuid) -> Delivery {
        Delivery {
            id: Uuid::new_v4(),
            idempotency_key: None,
            product_name: Some("Laptop".to_string()),
            delivery_address: None,
            status: DeliveryStatus::Created,
            delivery_date: NaiveDate::from_ymd_opt(2026, 2, 5).unwrap(),
            assigned_to: None,
            created_by: Some(creator),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn push(state: &AppState, creator: Uuid, title: &str) -> u64 {
        emit(
            state,
            &delivery_for(creator),
            NotificationType::StatusChanged,
            title,
            title.to_string(),
            Map::new(),
        )
        .unwrap()
        .id
    }

    #[tokio::test]
    async fn delivers_in_order_and_never_twice() {
        let (state, _rx) = AppState::new(&Config::default());
        let user = Uuid::new_v4();
        let first = push(&state, user, "one");
        let second = push(&state, user, "two");
        push(&state, Uuid::new_v4(), "other user");

        let mut sub = Subscription::open(&state, user, 0);

        let batch = sub.next_batch(Duration::from_millis(10)).await.unwrap();
        let ids: Vec<u64> = batch.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![first, second]);
        assert_eq!(sub.cursor(), second);

        let batch = sub.next_batch(Duration::from_millis(10)).await.unwrap();
        assert!(batch.is_empty());

        let third = push(&state, user, "three");
        let batch = sub.next_batch(Duration::from_millis(10)).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, third);
    }

    #[tokio::test]
    async fn cursor_skips_already_seen_history() {
        let (state, _rx) = AppState::new(&Config::default());
        let user = Uuid::new_v4();
        let first = push(&state, user, "one");
        let second = push(&state, user, "two");

        let mut sub = Subscription::open(&state, user, first);
        let batch = sub.next_batch(Duration::from_millis(10)).await.unwrap();

        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, second);
    }

    #[tokio::test]
    async fn append_wakes_a_waiting_subscriber() {
        let (state, _rx) = AppState::new(&Config::default());
        let state = Arc::new(state);
        let user = Uuid::new_v4();
        let mut sub = Subscription::open(&state, user, 0);

        let writer = {
            let state = state.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                push(&state, user, "late")
            })
        };

        let batch = tokio::time::timeout(
            Duration::from_secs(2),
            sub.next_batch(Duration::from_secs(30)),
        )
        .await
        .expect("append should wake the subscriber")
        .unwrap();

        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, writer.await.unwrap());
    }

    #[tokio::test]
    async fn other_recipients_do_not_cut_an_idle_wait() {
        let (state, _rx) = AppState::new(&Config::default());
        let state = Arc::new(state);
        let idle = Uuid::new_v4();
        let busy = Uuid::new_v4();
        let mut sub = Subscription::open(&state, idle, 0);

        let writer = {
            let state = state.clone();
            tokio::spawn(async move {
                for n in 0..20 {
                    push(&state, busy, &format!("busy {n}"));
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
        };

        let result = tokio::time::timeout(
            Duration::from_millis(400),
            sub.next_batch(Duration::from_secs(2)),
        )
        .await;

        assert!(result.is_err(), "idle subscriber returned early: {result:?}");
        writer.await.unwrap();
        assert_eq!(sub.cursor(), 0);
    }

    #[tokio::test]
    async fn wakeup_with_nothing_unread_waits_out_the_interval() {
        let (state, _rx) = AppState::new(&Config::default());
        let state = Arc::new(state);
        let user = Uuid::new_v4();
        let mut sub = Subscription::open(&state, user, 0);

        let writer = {
            let state = state.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                let id = push(&state, user, "read straight away");
                state.notifications.mark_read(&user, id);
            })
        };

        let started = std::time::Instant::now();
        let batch = sub.next_batch(Duration::from_millis(300)).await.unwrap();

        assert!(batch.is_empty());
        assert!(started.elapsed() >= Duration::from_millis(250));
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn dropping_a_waiting_subscription_releases_it() {
        let (state, _rx) = AppState::new(&Config::default());
        let gauge = state.metrics.notification_streams_active.clone();
        let mut sub = Subscription::open(&state, Uuid::new_v4(), 0);

        let waited = tokio::time::timeout(
            Duration::from_millis(20),
            sub.next_batch(Duration::from_secs(30)),
        )
        .await;
        assert!(waited.is_err());
        assert_eq!(gauge.get(), 1);

        drop(sub);
        assert_eq!(gauge.get(), 0);
    }

    #[tokio::test]
    async fn handle_cancels_a_pending_wait() {
        let (state, _rx) = AppState::new(&Config::default());
        let mut sub = Subscription::open(&state, Uuid::new_v4(), 0);
        let handle = sub.handle();

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            sub.next_batch(Duration::from_secs(30)),
        )
        .await
        .expect("cancel should end the wait");

        assert!(result.is_none());
        assert!(sub.is_cancelled());
        canceller.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_ends_every_subscription() {
        let (state, _rx) = AppState::new(&Config::default());
        let mut a = Subscription::open(&state, Uuid::new_v4(), 0);
        let mut b = Subscription::open(&state, Uuid::new_v4(), 0);

        state.shutdown();

        assert!(a.next_batch(Duration::from_secs(30)).await.is_none());
        assert!(b.next_batch(Duration::from_secs(30)).await.is_none());
    }

    #[tokio::test]
    async fn active_gauge_tracks_open_subscriptions() {
        let (state, _rx) = AppState::new(&Config::default());
        let gauge = state.metrics.notification_streams_active.clone();

        let sub = Subscription::open(&state, Uuid::new_v4(), 0);
        assert_eq!(gauge.get(), 1);

        drop(sub);
        assert_eq!(gauge.get(), 0);
    }
}
