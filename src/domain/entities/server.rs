//! Server entity and repository trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::CoreError;

/// A tenant/community containing categories, channels, members, and roles.
///
/// The owner is immutable except by server deletion; ownership transfer is
/// not supported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub id: i64,

    pub name: String,

    /// User ID of the owner
    pub owner_id: i64,

    /// Public reference URL from the object-storage collaborator
    pub icon_url: Option<String>,

    /// Public reference URL from the object-storage collaborator
    pub banner_url: Option<String>,

    pub description: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl Server {
    pub fn is_owner(&self, user_id: i64) -> bool {
        self.owner_id == user_id
    }
}

/// Repository trait for Server data access operations.
#[async_trait]
pub trait ServerRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<Server>, CoreError>;

    async fn create(&self, server: &Server) -> Result<Server, CoreError>;

    /// Update name, icon, banner, or description.
    async fn update(&self, server: &Server) -> Result<Server, CoreError>;

    /// Delete the server and everything scoped to it.
    async fn delete(&self, id: i64) -> Result<(), CoreError>;
}
