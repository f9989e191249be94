//! Built-in member ranks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Built-in rank held by every member, a strict total order:
/// owner > admin > moderator > member.
///
/// Closed union on purpose: permission resolution must be exhaustive,
/// and the compiler enforces it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Rank {
    #[default]
    Member,
    Moderator,
    Admin,
    Owner,
}

impl Rank {
    /// Owner and admin implicitly hold every capability.
    pub const fn has_full_capabilities(&self) -> bool {
        matches!(self, Rank::Owner | Rank::Admin)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Rank::Member => "member",
            Rank::Moderator => "moderator",
            Rank::Admin => "admin",
            Rank::Owner => "owner",
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
