use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;
use uuid::Uuid;

use crate::api::rest::auth::Caller;
use crate::engine::stream::Subscription;
use crate::error::AppError;
use crate::models::notification::{Notification, NotificationType};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/stream", get(stream_notifications))
        .route("/notifications/:id/read", post(mark_read))
}

#[derive(Deserialize)]
pub struct StreamParams {
    #[serde(default)]
    pub last_id: u64,
}

#[derive(Serialize)]
struct StreamPayload<'a> {
    id: u64,
    delivery: Uuid,
    #[serde(rename = "type")]
    notification_type: NotificationType,
    title: &'a str,
    message: &'a str,
    metadata: &'a Map<String, Value>,
    created_at: DateTime<Utc>,
}

struct StreamState {
    subscription: Subscription,
    pending: VecDeque<Notification>,
    greeted: bool,
    poll_interval: Duration,
}

async fn stream_notifications(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Query(params): Query<StreamParams>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = Subscription::open(&state, caller.id, params.last_id);
    Sse::new(event_stream(subscription, state.config.stream_poll_interval))
}

/// Server-sent events for one subscription: a `connected` comment, then one
/// `notification` event per record and a `heartbeat` comment for each idle poll.
/// Dropping the stream (client gone) drops the subscription with it.
fn event_stream(
    subscription: Subscription,
    poll_interval: Duration,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let initial = StreamState {
        subscription,
        pending: VecDeque::new(),
        greeted: false,
        poll_interval,
    };

    stream::unfold(initial, |mut st| async move {
        if !st.greeted {
            st.greeted = true;
            return Some((Ok(Event::default().comment("connected")), st));
        }

        loop {
            if let Some(notification) = st.pending.pop_front() {
                match notification_event(&notification) {
                    Some(event) => return Some((Ok(event), st)),
                    None => continue,
                }
            }

            let batch = st.subscription.next_batch(st.poll_interval).await?;
            if batch.is_empty() {
                return Some((Ok(Event::default().comment("heartbeat")), st));
            }
            st.pending.extend(batch);
        }
    })
}

fn notification_event(notification: &Notification) -> Option<Event> {
    let payload = StreamPayload {
        id: notification.id,
        delivery: notification.delivery,
        notification_type: notification.notification_type,
        title: &notification.title,
        message: &notification.message,
        metadata: &notification.metadata,
        created_at: notification.created_at,
    };

    match serde_json::to_string(&payload) {
        Ok(json) => Some(
            Event::default()
                .event("notification")
                .id(notification.id.to_string())
                .data(json),
        ),
        Err(err) => {
            warn!(notification_id = notification.id, error = %err, "failed to serialize notification for stream");
            None
        }
    }
}

async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
) -> Json<Vec<Notification>> {
    Json(state.notifications.for_recipient(&caller.id))
}

async fn mark_read(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(id): Path<u64>,
) -> Result<StatusCode, AppError> {
    if state.notifications.mark_read(&caller.id, id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("Notification not found".to_string()))
    }
}
