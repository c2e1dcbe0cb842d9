use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Created,
    Assigned,
    InTransit,
    Completed,
    Failed,
}

impl DeliveryStatus {
    pub const ALL: [DeliveryStatus; 5] = [
        DeliveryStatus::Created,
        DeliveryStatus::Assigned,
        DeliveryStatus::InTransit,
        DeliveryStatus::Completed,
        DeliveryStatus::Failed,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Created => "CREATED",
            DeliveryStatus::Assigned => "ASSIGNED",
            DeliveryStatus::InTransit => "IN_TRANSIT",
            DeliveryStatus::Completed => "COMPLETED",
            DeliveryStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        DeliveryStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == raw)
            .ok_or_else(|| format!("unknown status: {raw}"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub idempotency_key: Option<String>,
    pub product_name: Option<String>,
    pub delivery_address: Option<String>,
    pub status: DeliveryStatus,
    pub delivery_date: NaiveDate,
    pub assigned_to: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Delivery {
    pub fn product_label(&self) -> &str {
        self.product_name.as_deref().unwrap_or("delivery")
    }
}
