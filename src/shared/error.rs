//! Core Error Types
//!
//! Centralized error taxonomy shared by every component. All mutating
//! operations return a typed error to the caller; the core never maps
//! failures to a generic fault.

use std::fmt;

/// Kind of resource referenced by a [`CoreError::NotFound`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Server,
    Member,
    Role,
    Category,
    Channel,
    Invite,
    Message,
    User,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Server => "server",
            ResourceKind::Member => "member",
            ResourceKind::Role => "role",
            ResourceKind::Category => "category",
            ResourceKind::Channel => "channel",
            ResourceKind::Invite => "invite",
            ResourceKind::Message => "message",
            ResourceKind::User => "user",
        };
        write!(f, "{name}")
    }
}

/// Core error type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("{0} not found")]
    NotFound(ResourceKind),

    #[error("permission denied")]
    PermissionDenied,

    #[error("invite has expired")]
    InviteExpired,

    #[error("invite has reached its maximum uses")]
    InviteExhausted,

    #[error("failed to generate a unique invite code")]
    InviteGenerationExhausted,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// Transient failure at a collaborator boundary (persistence, feed).
    /// Retried only for idempotent reads and subscriptions; mutations
    /// surface it to the caller.
    #[error("collaborator failure: {0}")]
    Collaborator(String),
}

impl CoreError {
    /// Whether the guild session may transparently retry the failed call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Collaborator(_))
    }

    pub fn not_found(kind: ResourceKind) -> Self {
        CoreError::NotFound(kind)
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        CoreError::Conflict(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        CoreError::Validation(msg.into())
    }

    pub fn collaborator(msg: impl Into<String>) -> Self {
        CoreError::Collaborator(msg.into())
    }
}
