//! Custom Role entity and repository trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::Capabilities;
use crate::shared::error::CoreError;

/// A named capability grant scoped to one server.
///
/// The capability bitset is explicit over all flags: a bit left clear by a
/// held role revokes the corresponding default for its holders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomRole {
    pub id: i64,

    pub server_id: i64,

    pub name: String,

    /// Display color as a hex string (e.g. "#5865f2")
    pub color: Option<String>,

    pub capabilities: Capabilities,

    /// Tie-break order among a member's roles; higher wins display
    pub position: i32,

    pub created_at: DateTime<Utc>,
}

/// Repository trait for CustomRole data access operations.
#[async_trait]
pub trait RoleRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<CustomRole>, CoreError>;

    async fn find_by_server(&self, server_id: i64) -> Result<Vec<CustomRole>, CoreError>;

    async fn create(&self, role: &CustomRole) -> Result<CustomRole, CoreError>;

    async fn update(&self, role: &CustomRole) -> Result<CustomRole, CoreError>;

    async fn delete(&self, id: i64) -> Result<(), CoreError>;
}
