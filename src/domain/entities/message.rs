//! Message entity, draft type, and repository trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared::error::CoreError;

/// A text message in a channel.
///
/// `id` and `created_at` are assigned by the persistence collaborator;
/// `created_at` is the authoritative ordering timestamp. Immutable except
/// for content/edited_at/pinned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,

    pub channel_id: i64,

    pub author_id: i64,

    pub content: String,

    /// Authoritative ordering timestamp
    pub created_at: DateTime<Utc>,

    pub edited_at: Option<DateTime<Utc>>,

    /// Message this one replies to, within the same channel
    pub reply_to: Option<i64>,

    /// Thread root, when the message belongs to a thread
    pub thread_id: Option<i64>,

    #[serde(default)]
    pub pinned: bool,

    /// Client correlation id, echoed only by backends that support
    /// idempotency keys on insert; None otherwise
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
}

/// Insert payload for a new message. The collaborator assigns id and
/// created_at on insert.
#[derive(Debug, Clone)]
pub struct MessageDraft {
    pub channel_id: i64,
    pub author_id: i64,
    pub content: String,
    pub reply_to: Option<i64>,
    pub thread_id: Option<i64>,
    /// Locally generated key carried end-to-end for reconciliation
    pub correlation_id: Uuid,
}

/// Repository trait for Message data access operations.
#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<Message>, CoreError>;

    /// Most recent `limit` messages in a channel, returned in ascending
    /// `(created_at, id)` order.
    async fn find_recent(&self, channel_id: i64, limit: usize) -> Result<Vec<Message>, CoreError>;

    /// Insert a draft; the returned row carries the assigned id and
    /// authoritative created_at.
    async fn create(&self, draft: &MessageDraft) -> Result<Message, CoreError>;

    /// Replace content and stamp edited_at.
    async fn update_content(&self, id: i64, content: &str) -> Result<Message, CoreError>;

    async fn set_pinned(&self, id: i64, pinned: bool) -> Result<Message, CoreError>;

    async fn delete(&self, id: i64) -> Result<(), CoreError>;
}
