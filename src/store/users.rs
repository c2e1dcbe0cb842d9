use std::path::Path;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::user::{Role, User};

/// In-memory stand-in for the identity service: users by id plus API tokens.
#[derive(Default)]
pub struct UserDirectory {
    users: DashMap<Uuid, User>,
    tokens: DashMap<String, Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct SeedUser {
    pub id: Option<Uuid>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,
    pub token: String,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user: User, token: impl Into<String>) -> Result<User, AppError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(AppError::Validation("token cannot be empty".to_string()));
        }
        match self.tokens.entry(token) {
            Entry::Occupied(_) => {
                return Err(AppError::Conflict(format!(
                    "token for {} is already in use",
                    user.email
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(user.id);
            }
        }

        self.users.insert(user.id, user.clone());
        Ok(user)
    }

    pub fn get(&self, id: &Uuid) -> Option<User> {
        self.users.get(id).map(|entry| entry.value().clone())
    }

    pub fn resolve(&self, token: &str) -> Option<User> {
        let id = *self.tokens.get(token)?.value();
        self.get(&id)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn seed(&self, entries: Vec<SeedUser>) -> Result<usize, AppError> {
        let count = entries.len();
        for entry in entries {
            let user = User {
                id: entry.id.unwrap_or_else(Uuid::new_v4),
                first_name: entry.first_name,
                last_name: entry.last_name,
                email: entry.email,
                role: entry.role,
                created_at: Utc::now(),
            };
            self.insert(user, entry.token)?;
        }
        Ok(count)
    }

    pub fn seed_from_file(&self, path: &Path) -> Result<usize, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            AppError::Internal(format!("failed to read {}: {err}", path.display()))
        })?;
        let entries: Vec<SeedUser> = serde_json::from_str(&raw).map_err(|err| {
            AppError::Internal(format!("invalid seed file {}: {err}", path.display()))
        })?;
        self.seed(entries)
    }
}
