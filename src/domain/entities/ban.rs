//! Server Ban entity and repository trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::CoreError;

/// A ban record for a user on one server.
///
/// A banned user's membership is removed and invite redemption is
/// refused until the ban is lifted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ban {
    pub id: i64,

    pub server_id: i64,

    pub user_id: i64,

    /// Actor who issued the ban
    pub banned_by: i64,

    pub reason: Option<String>,

    pub created_at: DateTime<Utc>,
}

/// Repository trait for Ban data access operations.
#[async_trait]
pub trait BanRepository: Send + Sync {
    async fn find(&self, server_id: i64, user_id: i64) -> Result<Option<Ban>, CoreError>;

    async fn find_by_server(&self, server_id: i64) -> Result<Vec<Ban>, CoreError>;

    async fn create(&self, ban: &Ban) -> Result<Ban, CoreError>;

    async fn delete(&self, server_id: i64, user_id: i64) -> Result<(), CoreError>;
}
