//! Channel Category entity and repository trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::shared::error::CoreError;

/// A named grouping of channels within a server.
///
/// `position` is an append-only ordering key: assignment takes
/// `max(existing) + 1` and values are never reused after deletion, so the
/// sequence may be sparse. Ties on read are broken by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,

    pub server_id: i64,

    pub name: String,

    pub position: i32,
}

/// Repository trait for Category data access operations.
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<Category>, CoreError>;

    async fn find_by_server(&self, server_id: i64) -> Result<Vec<Category>, CoreError>;

    /// Next append position for the server scope: `max(existing) + 1`,
    /// atomic with respect to concurrent creations.
    async fn next_position(&self, server_id: i64) -> Result<i32, CoreError>;

    async fn create(&self, category: &Category) -> Result<Category, CoreError>;

    /// Update name or position (last writer wins).
    async fn update(&self, category: &Category) -> Result<Category, CoreError>;

    /// Delete the category only; contained channels keep their identity
    /// and are reparented to top level by the caller.
    async fn delete(&self, id: i64) -> Result<(), CoreError>;
}
