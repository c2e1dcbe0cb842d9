use std::time::Instant;

use chrono::{NaiveDate, Utc};
use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::idempotency::fingerprint;
use crate::engine::notifier;
use crate::engine::state_machine;
use crate::error::{AppError, FieldErrors};
use crate::models::delivery::{Delivery, DeliveryStatus};
use crate::models::user::{Role, User};
use crate::state::AppState;
use crate::store::deliveries::DUPLICATE_REQUEST;

const MAX_TEXT_LEN: usize = 255;

pub(crate) const PERMISSION_DENIED: &str = "You do not have permission to perform this action";

#[derive(Debug, Clone, PartialEq)]
pub struct NewDelivery {
    pub delivery_date: NaiveDate,
    pub product_name: Option<String>,
    pub delivery_address: Option<String>,
}

pub(crate) fn require_role(caller: &User, allowed: &[Role]) -> Result<(), AppError> {
    if allowed.contains(&caller.role) {
        Ok(())
    } else {
        Err(AppError::Forbidden(PERMISSION_DENIED.to_string()))
    }
}

/// Creates a delivery from a raw request body.
///
/// The whole body is fingerprinted; a second identical request from the same
/// partner is rejected as a duplicate with no new row and no notification.
pub fn create_delivery(state: &AppState, creator: &User, payload: &Value) -> Result<Delivery, AppError> {
    require_role(creator, &[Role::Partner])?;

    let request = match parse_new_delivery(payload) {
        Ok(request) => request,
        Err(err) => {
            state
                .metrics
                .deliveries_created_total
                .with_label_values(&["invalid"])
                .inc();
            return Err(err);
        }
    };

    let key = fingerprint(&creator.id, payload);
    if let Some(existing) = state.deliveries.find_by_key(&key) {
        return Err(duplicate(state, &creator.id, Some(existing)));
    }

    let now = Utc::now();
    let delivery = Delivery {
        id: Uuid::new_v4(),
        idempotency_key: Some(key),
        product_name: request.product_name,
        delivery_address: request.delivery_address,
        status: DeliveryStatus::Created,
        delivery_date: request.delivery_date,
        assigned_to: None,
        created_by: Some(creator.id),
        created_at: now,
        updated_at: now,
    };

    let delivery = match state.deliveries.insert(delivery) {
        Ok(delivery) => delivery,
        Err(AppError::Conflict(_)) => return Err(duplicate(state, &creator.id, None)),
        Err(err) => return Err(err),
    };

    state
        .metrics
        .deliveries_created_total
        .with_label_values(&["created"])
        .inc();
    info!(
        delivery_id = %delivery.id,
        created_by = %creator.id,
        delivery_date = %delivery.delivery_date,
        "delivery created"
    );

    notifier::notify_created(state, &delivery);
    Ok(delivery)
}

fn duplicate(state: &AppState, creator: &Uuid, existing: Option<Uuid>) -> AppError {
    state
        .metrics
        .deliveries_created_total
        .with_label_values(&["duplicate"])
        .inc();
    warn!(created_by = %creator, existing = ?existing, "duplicate delivery request rejected");
    AppError::Conflict(DUPLICATE_REQUEST.to_string())
}

pub fn parse_new_delivery(payload: &Value) -> Result<NewDelivery, AppError> {
    let Some(body) = payload.as_object() else {
        return Err(AppError::Validation(
            "request body must be a JSON object".to_string(),
        ));
    };

    let mut errors = FieldErrors::new();

    let delivery_date = match body.get("delivery_date") {
        None | Some(Value::Null) => {
            field_error(&mut errors, "delivery_date", "This field is required.");
            None
        }
        Some(Value::String(raw)) => match NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
            Ok(date) => Some(date),
            Err(_) => {
                field_error(
                    &mut errors,
                    "delivery_date",
                    "Date has wrong format. Use YYYY-MM-DD.",
                );
                None
            }
        },
        Some(_) => {
            field_error(
                &mut errors,
                "delivery_date",
                "Date has wrong format. Use YYYY-MM-DD.",
            );
            None
        }
    };

    let product_name = optional_text(body, "product_name", &mut errors);
    let delivery_address = optional_text(body, "delivery_address", &mut errors);

    match delivery_date {
        Some(delivery_date) if errors.is_empty() => Ok(NewDelivery {
            delivery_date,
            product_name,
            delivery_address,
        }),
        _ => Err(AppError::InvalidFields(errors)),
    }
}

fn optional_text(body: &Map<String, Value>, field: &str, errors: &mut FieldErrors) -> Option<String> {
    match body.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) if text.chars().count() > MAX_TEXT_LEN => {
            field_error(
                errors,
                field,
                "Ensure this field has no more than 255 characters.",
            );
            None
        }
        Some(Value::String(text)) => Some(text.clone()),
        Some(_) => {
            field_error(errors, field, "Not a valid string.");
            None
        }
    }
}

fn field_error(errors: &mut FieldErrors, field: &str, message: &str) {
    errors
        .entry(field.to_string())
        .or_default()
        .push(message.to_string());
}

/// Moves a delivery to `target` under its row lock and notifies the creator.
pub async fn transition(
    state: &AppState,
    delivery_id: &Uuid,
    target: DeliveryStatus,
) -> Result<Delivery, AppError> {
    transition_with(state, delivery_id, target, None).await
}

/// Lock, validate, write and notify as one unit.
///
/// The row guard is held until the notification is persisted. If the calling
/// future is dropped before the write, the guard is released and the row is
/// untouched; the write itself is a single assignment.
pub(crate) async fn transition_with(
    state: &AppState,
    delivery_id: &Uuid,
    target: DeliveryStatus,
    assignee: Option<&User>,
) -> Result<Delivery, AppError> {
    let start = Instant::now();
    let result = apply_locked(state, delivery_id, target, assignee).await;

    let outcome = match &result {
        Ok(_) => "success",
        Err(AppError::LockTimeout) => "conflict",
        Err(AppError::NotFound(_)) => "not_found",
        Err(_) => "rejected",
    };
    state
        .metrics
        .transition_latency_seconds
        .with_label_values(&[outcome])
        .observe(start.elapsed().as_secs_f64());
    state
        .metrics
        .transitions_total
        .with_label_values(&[outcome])
        .inc();

    if let Err(err) = &result {
        warn!(delivery_id = %delivery_id, to = %target, error = %err, "transition rejected");
    }

    result
}

async fn apply_locked(
    state: &AppState,
    delivery_id: &Uuid,
    target: DeliveryStatus,
    assignee: Option<&User>,
) -> Result<Delivery, AppError> {
    let mut row = state.deliveries.lock(delivery_id).await?;
    let old_status = row.status;

    let updated = state_machine::apply(&row, target, assignee.map(|user| user.id))?;
    *row = updated.clone();

    info!(
        delivery_id = %updated.id,
        from = %old_status,
        to = %target,
        assigned_to = ?updated.assigned_to,
        "delivery status changed"
    );

    match assignee {
        Some(user) => notifier::notify_assigned(state, &updated, user),
        None => notifier::notify_status_changed(state, &updated, old_status, target),
    };

    drop(row);
    Ok(updated)
}

/// Handles a status update request from an admin.
///
/// Checks run in a fixed order: field present, delivery exists, delivery not
/// terminal, target reachable. A target that names no status is judged
/// against the row like any other disallowed one.
pub async fn update_status(
    state: &AppState,
    caller: &User,
    delivery_id: &Uuid,
    status: Option<&str>,
) -> Result<Delivery, AppError> {
    require_role(caller, &[Role::Admin, Role::SuperAdmin])?;

    let raw = status
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .ok_or(AppError::MissingField("status"))?;
    let target = match raw.parse::<DeliveryStatus>() {
        Ok(target) => target,
        Err(_) => {
            let current = state.deliveries.lock(delivery_id).await?.status;
            let err = state_machine::reject_unknown(current, raw);
            state
                .metrics
                .transitions_total
                .with_label_values(&["rejected"])
                .inc();
            warn!(delivery_id = %delivery_id, to = raw, error = %err, "transition rejected");
            return Err(err);
        }
    };

    transition(state, delivery_id, target).await
}
