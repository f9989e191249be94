//! Channel entity and repository trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::CoreError;

/// Channel type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Text,
    Voice,
    Stage,
    Announcement,
    Forum,
}

impl ChannelType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Text => "text",
            ChannelType::Voice => "voice",
            ChannelType::Stage => "stage",
            ChannelType::Announcement => "announcement",
            ChannelType::Forum => "forum",
        }
    }

    /// Whether messages can be sent in this channel type.
    pub const fn is_textual(&self) -> bool {
        matches!(
            self,
            ChannelType::Text | ChannelType::Announcement | ChannelType::Forum
        )
    }
}

/// A communication space within a server.
///
/// `position` is scoped to the containing category, or to the server when
/// `category_id` is null; uncategorized channels sort after all
/// categorized ones regardless of position value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: i64,

    pub server_id: i64,

    /// Containing category; cleared (not cascaded) when the category is
    /// deleted
    pub category_id: Option<i64>,

    pub name: String,

    pub kind: ChannelType,

    pub position: i32,

    pub topic: Option<String>,

    pub created_at: DateTime<Utc>,
}

/// Repository trait for Channel data access operations.
#[async_trait]
pub trait ChannelRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<Channel>, CoreError>;

    async fn find_by_server(&self, server_id: i64) -> Result<Vec<Channel>, CoreError>;

    /// Next append position within `(server_id, category_id)`:
    /// `max(existing) + 1`, atomic with respect to concurrent creations.
    async fn next_position(
        &self,
        server_id: i64,
        category_id: Option<i64>,
    ) -> Result<i32, CoreError>;

    async fn create(&self, channel: &Channel) -> Result<Channel, CoreError>;

    /// Update name, topic, category, or position (last writer wins).
    async fn update(&self, channel: &Channel) -> Result<Channel, CoreError>;

    async fn delete(&self, id: i64) -> Result<(), CoreError>;
}
