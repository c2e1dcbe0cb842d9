use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::lifecycle::PERMISSION_DENIED;
use crate::error::AppError;
use crate::models::delivery::Delivery;
use crate::models::user::{Role, User};
use crate::state::AppState;

/// A delivery as shown to API clients, with party names resolved.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryView {
    #[serde(flatten)]
    pub delivery: Delivery,
    pub created_by_full_name: Option<String>,
    pub assigned_to_full_name: Option<String>,
}

impl DeliveryView {
    pub fn resolve(state: &AppState, delivery: Delivery) -> Self {
        Self::with_parties(
            delivery.created_by.and_then(|id| state.users.get(&id)).as_ref(),
            delivery.assigned_to.and_then(|id| state.users.get(&id)).as_ref(),
            delivery,
        )
    }

    fn with_parties(creator: Option<&User>, assignee: Option<&User>, delivery: Delivery) -> Self {
        Self {
            delivery,
            created_by_full_name: creator.map(User::full_name),
            assigned_to_full_name: assignee.map(User::full_name),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub role: Option<String>,
    pub search: Option<String>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub count: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub results: Vec<T>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListScope {
    Created,
    Assigned,
}

/// Lists the caller's deliveries, newest first.
///
/// `role=partner` selects deliveries the caller created, `role=admin` the ones
/// assigned to the caller.
pub async fn list_deliveries(
    state: &AppState,
    caller: &User,
    params: &ListParams,
) -> Result<Page<DeliveryView>, AppError> {
    let scope = match params.role.as_deref().map(str::trim) {
        None | Some("") => return Err(AppError::Validation("Please select a role".to_string())),
        Some("partner") => ListScope::Created,
        Some("admin") => ListScope::Assigned,
        Some(_) => {
            return Err(AppError::Validation(
                "Invalid role. Must be 'partner' or 'admin'".to_string(),
            ));
        }
    };

    let page_size = params
        .page_size
        .unwrap_or(state.config.page_size)
        .clamp(1, state.config.max_page_size);
    let page = params.page.unwrap_or(1);
    if page == 0 {
        return Err(AppError::NotFound("Invalid page.".to_string()));
    }

    let needle = params
        .search
        .as_deref()
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .map(str::to_lowercase);

    let mut matched: Vec<DeliveryView> = state
        .deliveries
        .snapshot()
        .await
        .into_iter()
        .filter(|delivery| match scope {
            ListScope::Created => delivery.created_by == Some(caller.id),
            ListScope::Assigned => delivery.assigned_to == Some(caller.id),
        })
        .map(|delivery| DeliveryView::resolve(state, delivery))
        .filter(|view| needle.as_deref().is_none_or(|term| matches_search(view, term)))
        .collect();

    matched.sort_by(|a, b| b.delivery.created_at.cmp(&a.delivery.created_at));

    let count = matched.len();
    let total_pages = count.div_ceil(page_size).max(1);
    if page > total_pages {
        return Err(AppError::NotFound("Invalid page.".to_string()));
    }

    let results = matched
        .into_iter()
        .skip((page - 1) * page_size)
        .take(page_size)
        .collect();

    Ok(Page {
        count,
        page,
        page_size,
        total_pages,
        results,
    })
}

/// Case-insensitive substring match over the descriptive fields and party names.
fn matches_search(view: &DeliveryView, term: &str) -> bool {
    let delivery = &view.delivery;
    let date = delivery.delivery_date.to_string();

    [
        delivery.product_name.as_deref(),
        Some(delivery.status.as_str()),
        Some(date.as_str()),
        delivery.delivery_address.as_deref(),
        view.created_by_full_name.as_deref(),
        view.assigned_to_full_name.as_deref(),
    ]
    .into_iter()
    .flatten()
    .any(|field| field.to_lowercase().contains(term))
}

/// Fetches one delivery visible to the caller: its creator, its assignee or a super admin.
pub async fn get_delivery(state: &AppState, caller: &User, id: &Uuid) -> Result<DeliveryView, AppError> {
    let delivery = state
        .deliveries
        .get(id)
        .await
        .ok_or_else(|| AppError::NotFound("Delivery not found".to_string()))?;

    let visible = caller.role == Role::SuperAdmin
        || delivery.created_by == Some(caller.id)
        || delivery.assigned_to == Some(caller.id);
    if !visible {
        return Err(AppError::Forbidden(PERMISSION_DENIED.to_string()));
    }

    Ok(DeliveryView::resolve(state, delivery))
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    use super::{matches_search, DeliveryView};
    use crate::models::delivery::{Delivery, DeliveryStatus};
    use crate::models::user::{Role, User};

    fn view() -> DeliveryView {
        let partner = User::new("Jane", "Smith", "jane@test.com", Role::Partner);
        let admin = User::new("John", "Doe", "john@test.com", Role::Admin);
        let delivery = Delivery {
            id: Uuid::new_v4(),
            idempotency_key: None,
            product_name: Some("Laptop Dell XPS 15".to_string()),
            delivery_address: Some("123 Main St, Kathmandu".to_string()),
            status: DeliveryStatus::InTransit,
            delivery_date: NaiveDate::from_ymd_opt(2026, 2, 5).unwrap(),
            assigned_to: Some(admin.id),
            created_by: Some(partner.id),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        DeliveryView::with_parties(Some(&partner), Some(&admin), delivery)
    }

    #[test]
    fn search_covers_every_field() {
        let view = view();

        for term in ["laptop", "in_transit", "2026-02", "kathmandu", "smith", "john"] {
            assert!(matches_search(&view, term), "{term} should match");
        }
        assert!(!matches_search(&view, "phone"));
    }

    #[test]
    fn view_serializes_flat_without_idempotency_key() {
        let mut view = view();
        view.delivery.idempotency_key = Some("secret".to_string());

        let value = serde_json::to_value(&view).unwrap();

        assert_eq!(value["status"], "IN_TRANSIT");
        assert_eq!(value["delivery_date"], "2026-02-05");
        assert_eq!(value["created_by_full_name"], "Jane Smith");
        assert_eq!(value["assigned_to_full_name"], "John Doe");
        assert!(value.get("idempotency_key").is_none());
    }
}
