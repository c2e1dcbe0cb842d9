use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::delivery::Delivery;

pub const DUPLICATE_REQUEST: &str = "duplicate";

type ScopedKey = (String, NaiveDate, Uuid);

/// Delivery rows, each behind its own async mutex.
///
/// A transition holds the row guard for its whole read-validate-write cycle,
/// so two updates of the same delivery never observe the same starting state.
/// Rows of different deliveries never contend.
pub struct DeliveryStore {
    rows: DashMap<Uuid, Arc<Mutex<Delivery>>>,
    keys: DashMap<String, Uuid>,
    scoped_keys: DashMap<ScopedKey, Uuid>,
    lock_timeout: Duration,
}

impl DeliveryStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            rows: DashMap::new(),
            keys: DashMap::new(),
            scoped_keys: DashMap::new(),
            lock_timeout,
        }
    }

    /// Inserts a new row, claiming its idempotency key first.
    ///
    /// The key index is the arbiter for concurrent creates: exactly one caller
    /// wins the vacant entry, every other caller gets a duplicate conflict.
    pub fn insert(&self, delivery: Delivery) -> Result<Delivery, AppError> {
        let Some(key) = delivery.idempotency_key.clone() else {
            self.rows
                .insert(delivery.id, Arc::new(Mutex::new(delivery.clone())));
            return Ok(delivery);
        };

        let claim = match self.keys.entry(key.clone()) {
            Entry::Occupied(_) => return Err(AppError::Conflict(DUPLICATE_REQUEST.to_string())),
            Entry::Vacant(slot) => slot,
        };

        if let Some(creator) = delivery.created_by {
            match self.scoped_keys.entry((key, delivery.delivery_date, creator)) {
                Entry::Occupied(_) => {
                    return Err(AppError::Conflict(DUPLICATE_REQUEST.to_string()));
                }
                Entry::Vacant(slot) => {
                    slot.insert(delivery.id);
                }
            }
        }

        self.rows
            .insert(delivery.id, Arc::new(Mutex::new(delivery.clone())));
        claim.insert(delivery.id);

        Ok(delivery)
    }

    pub fn find_by_key(&self, key: &str) -> Option<Uuid> {
        self.keys.get(key).map(|entry| *entry.value())
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.rows.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Acquires exclusive access to one row.
    ///
    /// Gives up after the configured lock timeout with a retryable error.
    pub async fn lock(&self, id: &Uuid) -> Result<OwnedMutexGuard<Delivery>, AppError> {
        let row = self
            .row(id)
            .ok_or_else(|| AppError::NotFound("Delivery not found".to_string()))?;

        tokio::time::timeout(self.lock_timeout, row.lock_owned())
            .await
            .map_err(|_| {
                tracing::warn!(delivery_id = %id, "timed out waiting for delivery lock");
                AppError::LockTimeout
            })
    }

    pub async fn get(&self, id: &Uuid) -> Option<Delivery> {
        let row = self.row(id)?;
        let guard = row.lock().await;
        Some(guard.clone())
    }

    pub async fn snapshot(&self) -> Vec<Delivery> {
        let rows: Vec<Arc<Mutex<Delivery>>> = self
            .rows
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut deliveries = Vec::with_capacity(rows.len());
        for row in rows {
            deliveries.push(row.lock().await.clone());
        }
        deliveries
    }

    fn row(&self, id: &Uuid) -> Option<Arc<Mutex<Delivery>>> {
        self.rows.get(id).map(|entry| Arc::clone(entry.value()))
    }
}
