use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::api::rest::auth::Caller;
use crate::engine::assignment::assign_delivery;
use crate::engine::lifecycle::{create_delivery, update_status};
use crate::engine::queries::{get_delivery, list_deliveries, DeliveryView, ListParams, Page};
use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/deliveries", post(request_delivery).get(list))
        .route("/deliveries/:id", get(fetch))
        .route("/deliveries/:id/assign", patch(assign))
        .route("/deliveries/:id/status", patch(change_status))
}

#[derive(Deserialize)]
pub struct AssignRequest {
    #[serde(default)]
    pub assigned_to: Option<Value>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    #[serde(default)]
    pub status: Option<String>,
}

/// Ids that do not parse can name no delivery.
fn delivery_id(raw: &str) -> Result<Uuid, AppError> {
    raw.parse()
        .map_err(|_| AppError::NotFound("Delivery not found".to_string()))
}

async fn request_delivery(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<DeliveryView>), AppError> {
    let delivery = create_delivery(&state, &caller, &payload)?;
    Ok((
        StatusCode::CREATED,
        Json(DeliveryView::resolve(&state, delivery)),
    ))
}

async fn list(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Query(params): Query<ListParams>,
) -> Result<Json<Page<DeliveryView>>, AppError> {
    let page = list_deliveries(&state, &caller, &params).await?;
    Ok(Json(page))
}

async fn fetch(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> Result<Json<DeliveryView>, AppError> {
    let view = get_delivery(&state, &caller, &delivery_id(&id)?).await?;
    Ok(Json(view))
}

async fn assign(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(id): Path<String>,
    Json(payload): Json<AssignRequest>,
) -> Result<Json<DeliveryView>, AppError> {
    // Clients send the id either as a string or as a bare JSON value.
    let assigned_to = match payload.assigned_to {
        None | Some(Value::Null) => None,
        Some(Value::String(raw)) => Some(raw),
        Some(other) => Some(other.to_string()),
    };

    let delivery =
        assign_delivery(&state, &caller, &delivery_id(&id)?, assigned_to.as_deref()).await?;
    Ok(Json(DeliveryView::resolve(&state, delivery)))
}

async fn change_status(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(id): Path<String>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<DeliveryView>, AppError> {
    let delivery =
        update_status(&state, &caller, &delivery_id(&id)?, payload.status.as_deref()).await?;
    Ok(Json(DeliveryView::resolve(&state, delivery)))
}
