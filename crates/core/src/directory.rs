use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::WorkflowError;
use crate::ids::UserId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub department: Option<String>,
}

impl UserProfile {
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let full = full.trim();
        if full.is_empty() {
            self.id.to_string()
        } else {
            full.to_string()
        }
    }
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("user directory unavailable: {0}")]
    Unavailable(String),
}

impl From<DirectoryError> for WorkflowError {
    fn from(error: DirectoryError) -> Self {
        Self::Internal(error.to_string())
    }
}

/// Lookup of people by id, used for display names in system messages.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user_by_id(&self, id: &UserId) -> Result<Option<UserProfile>, DirectoryError>;

    /// Display name, falling back to the raw id for unknown users.
    async fn display_name(&self, id: &UserId) -> Result<String, DirectoryError> {
        Ok(self
            .get_user_by_id(id)
            .await?
            .map(|profile| profile.display_name())
            .unwrap_or_else(|| id.to_string()))
    }
}

#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<UserId, UserProfile>>,
}

impl InMemoryUserDirectory {
    pub fn with_users(users: impl IntoIterator<Item = UserProfile>) -> Self {
        let users = users.into_iter().map(|user| (user.id.clone(), user)).collect();
        Self { users: RwLock::new(users) }
    }

    pub fn insert(&self, profile: UserProfile) -> Result<(), DirectoryError> {
        let mut users = self
            .users
            .write()
            .map_err(|_| DirectoryError::Unavailable("user directory lock poisoned".into()))?;
        users.insert(profile.id.clone(), profile);
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn get_user_by_id(&self, id: &UserId) -> Result<Option<UserProfile>, DirectoryError> {
        let users = self
            .users
            .read()
            .map_err(|_| DirectoryError::Unavailable("user directory lock poisoned".into()))?;
        Ok(users.get(id).cloned())
    }
}
