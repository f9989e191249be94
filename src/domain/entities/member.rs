//! Server Member entity and repository trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::Rank;
use crate::shared::error::CoreError;

/// A user's membership in one server.
///
/// Unique per `(server_id, user_id)`. Carries exactly one built-in rank
/// plus zero or more custom role references. Created on join or invite
/// redemption; destroyed on leave, kick, ban, or server deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub server_id: i64,

    pub user_id: i64,

    /// Built-in rank; owner rank exists only for the server owner
    pub rank: Rank,

    /// IDs of custom roles held by this member
    #[serde(default)]
    pub roles: Vec<i64>,

    /// Server-specific nickname
    pub nickname: Option<String>,

    pub joined_at: DateTime<Utc>,
}

impl Member {
    /// Create a plain member with no custom roles.
    pub fn new(server_id: i64, user_id: i64) -> Self {
        Self {
            server_id,
            user_id,
            rank: Rank::Member,
            roles: Vec::new(),
            nickname: None,
            joined_at: Utc::now(),
        }
    }

    pub fn has_role(&self, role_id: i64) -> bool {
        self.roles.contains(&role_id)
    }

    /// Display name (nickname or fallback to the provided username).
    pub fn display_name<'a>(&'a self, username: &'a str) -> &'a str {
        self.nickname.as_deref().unwrap_or(username)
    }
}

/// Repository trait for Member data access operations.
#[async_trait]
pub trait MemberRepository: Send + Sync {
    async fn find(&self, server_id: i64, user_id: i64) -> Result<Option<Member>, CoreError>;

    async fn find_by_server(&self, server_id: i64) -> Result<Vec<Member>, CoreError>;

    /// All memberships held by a user, across servers.
    async fn find_by_user(&self, user_id: i64) -> Result<Vec<Member>, CoreError>;

    async fn is_member(&self, server_id: i64, user_id: i64) -> Result<bool, CoreError>;

    async fn create(&self, member: &Member) -> Result<Member, CoreError>;

    /// Update rank, roles, or nickname.
    async fn update(&self, member: &Member) -> Result<Member, CoreError>;

    async fn delete(&self, server_id: i64, user_id: i64) -> Result<(), CoreError>;
}
