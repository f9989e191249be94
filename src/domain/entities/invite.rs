//! Server Invite entity and repository trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::CoreError;

/// Alphabet for invite codes: 62 symbols, drawn uniformly.
pub const CODE_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// A redeemable token granting membership in a server.
///
/// Valid iff not expired and (max_uses is None or uses < max_uses).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invite {
    /// Short random code, collision-checked at creation
    pub code: String,

    pub server_id: i64,

    /// User ID of the creator
    pub creator_id: i64,

    /// None = unlimited
    pub max_uses: Option<i32>,

    /// Monotonic counter, never exceeds `max_uses`
    pub uses: i32,

    /// None = never expires
    pub expires_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl Invite {
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at < Utc::now())
    }

    pub fn is_exhausted(&self) -> bool {
        self.max_uses.is_some_and(|max| self.uses >= max)
    }

    pub fn is_valid(&self) -> bool {
        !self.is_expired() && !self.is_exhausted()
    }

    /// Remaining uses (None if unlimited).
    pub fn remaining_uses(&self) -> Option<i32> {
        self.max_uses.map(|max| (max - self.uses).max(0))
    }

    /// Draw a fresh random code of the given length from [`CODE_ALPHABET`].
    pub fn generate_code(length: usize) -> String {
        use rand::Rng;

        let mut rng = rand::rng();
        (0..length)
            .map(|_| {
                let idx = rng.random_range(0..CODE_ALPHABET.len());
                CODE_ALPHABET[idx] as char
            })
            .collect()
    }
}

/// Repository trait for Invite data access operations.
#[async_trait]
pub trait InviteRepository: Send + Sync {
    async fn find_by_code(&self, code: &str) -> Result<Option<Invite>, CoreError>;

    async fn find_by_server(&self, server_id: i64) -> Result<Vec<Invite>, CoreError>;

    async fn code_exists(&self, code: &str) -> Result<bool, CoreError>;

    async fn create(&self, invite: &Invite) -> Result<Invite, CoreError>;

    /// Atomically increment `uses` if below `max_uses` and return the
    /// updated row. This is the one compare-and-increment the core
    /// requires of its persistence collaborator; the counter must never
    /// exceed `max_uses` under concurrent redemption.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown code, `InviteExhausted` when the counter
    /// is already at its limit.
    async fn claim_use(&self, code: &str) -> Result<Invite, CoreError>;

    async fn delete(&self, code: &str) -> Result<(), CoreError>;

    /// Delete all expired invites, returning how many were removed.
    async fn delete_expired(&self) -> Result<u64, CoreError>;
}
