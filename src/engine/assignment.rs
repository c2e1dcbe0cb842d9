use tracing::info;
use uuid::Uuid;

use crate::engine::lifecycle::{require_role, transition_with};
use crate::error::AppError;
use crate::models::delivery::{Delivery, DeliveryStatus};
use crate::models::user::{Role, User};
use crate::state::AppState;

/// Assigns a delivery to an admin, moving it from CREATED to ASSIGNED.
///
/// Checks run in a fixed order: field present, delivery exists, assignee
/// exists, assignee is an admin. The transition then re-checks the workflow
/// table under the row lock, so an already assigned or finished delivery is
/// rejected there.
pub async fn assign_delivery(
    state: &AppState,
    caller: &User,
    delivery_id: &Uuid,
    assigned_to: Option<&str>,
) -> Result<Delivery, AppError> {
    require_role(caller, &[Role::SuperAdmin])?;

    let raw = assigned_to
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .ok_or(AppError::MissingField("assigned_to"))?;

    if !state.deliveries.contains(delivery_id) {
        return Err(AppError::NotFound("Delivery not found".to_string()));
    }

    let assignee = raw
        .parse::<Uuid>()
        .ok()
        .and_then(|id| state.users.get(&id))
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if assignee.role != Role::Admin {
        return Err(AppError::ForbiddenAssignee);
    }

    let delivery =
        transition_with(state, delivery_id, DeliveryStatus::Assigned, Some(&assignee)).await?;

    info!(
        delivery_id = %delivery.id,
        assigned_to = %assignee.id,
        assigned_by = %caller.id,
        "delivery assigned"
    );

    state.mailer.send(
        &assignee.email,
        "New delivery assigned",
        format!(
            "Hello {}, delivery {} for {} on {} has been assigned to you.",
            assignee.full_name(),
            delivery.id,
            delivery.product_label(),
            delivery.delivery_date
        ),
    );

    Ok(delivery)
}
