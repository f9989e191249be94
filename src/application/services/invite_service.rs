//! Invite Service
//!
//! Generates, validates, redeems, and revokes invite codes with
//! usage/expiry limits. Redemption is idempotent per user and the use
//! counter never exceeds its limit, even under concurrent redemption.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info};

use crate::config::InviteSettings;
use crate::domain::entities::{
    BanRepository, Invite, InviteRepository, Member, MemberRepository, RoleRepository,
    ServerRepository,
};
use crate::domain::services::PermissionService;
use crate::domain::value_objects::Capabilities;
use crate::shared::error::{CoreError, ResourceKind};

/// Invite lifecycle manager.
pub struct InviteService<I: ?Sized, S: ?Sized, M: ?Sized, R: ?Sized, B: ?Sized> {
    invite_repo: Arc<I>,
    server_repo: Arc<S>,
    member_repo: Arc<M>,
    role_repo: Arc<R>,
    ban_repo: Arc<B>,
    settings: InviteSettings,
}

impl<I, S, M, R, B> InviteService<I, S, M, R, B>
where
    I: InviteRepository + ?Sized,
    S: ServerRepository + ?Sized,
    M: MemberRepository + ?Sized,
    R: RoleRepository + ?Sized,
    B: BanRepository + ?Sized,
{
    pub fn new(
        invite_repo: Arc<I>,
        server_repo: Arc<S>,
        member_repo: Arc<M>,
        role_repo: Arc<R>,
        ban_repo: Arc<B>,
        settings: InviteSettings,
    ) -> Self {
        Self {
            invite_repo,
            server_repo,
            member_repo,
            role_repo,
            ban_repo,
            settings,
        }
    }

    /// Create an invite. Any member may invite; a non-member may not.
    ///
    /// The code is drawn from a 62-symbol alphabet and collision-checked
    /// against persistence; after the configured number of fresh draws
    /// the operation fails with `InviteGenerationExhausted`.
    pub async fn create_invite(
        &self,
        server_id: i64,
        creator_id: i64,
        max_uses: Option<i32>,
        ttl: Option<Duration>,
    ) -> Result<Invite, CoreError> {
        self.server_repo
            .find_by_id(server_id)
            .await?
            .ok_or(CoreError::NotFound(ResourceKind::Server))?;

        if !self.member_repo.is_member(server_id, creator_id).await? {
            return Err(CoreError::PermissionDenied);
        }

        if max_uses.is_some_and(|n| n < 1) {
            return Err(CoreError::validation("max_uses must be at least 1"));
        }
        if ttl.is_some_and(|d| d <= Duration::zero()) {
            return Err(CoreError::validation("ttl must be positive"));
        }

        let code = self.generate_unique_code().await?;
        let now = Utc::now();
        let invite = Invite {
            code,
            server_id,
            creator_id,
            max_uses,
            uses: 0,
            expires_at: ttl.map(|d| now + d),
            created_at: now,
        };

        let invite = self.invite_repo.create(&invite).await?;
        info!(server_id, creator_id, code = %invite.code, "invite created");
        Ok(invite)
    }

    async fn generate_unique_code(&self) -> Result<String, CoreError> {
        for attempt in 0..self.settings.max_generation_attempts {
            let code = Invite::generate_code(self.settings.code_length);
            if !self.invite_repo.code_exists(&code).await? {
                return Ok(code);
            }
            debug!(attempt, "invite code collision, redrawing");
        }
        Err(CoreError::InviteGenerationExhausted)
    }

    /// Redeem an invite, creating (or returning) the membership.
    ///
    /// Redemption by an existing member is idempotent: it returns the
    /// current membership and does not consume a use. Otherwise the use
    /// counter is claimed atomically at the persistence boundary before
    /// the member row is created.
    pub async fn redeem_invite(&self, code: &str, user_id: i64) -> Result<Member, CoreError> {
        let invite = self
            .invite_repo
            .find_by_code(code)
            .await?
            .ok_or(CoreError::NotFound(ResourceKind::Invite))?;

        if invite.is_expired() {
            return Err(CoreError::InviteExpired);
        }
        if invite.is_exhausted() {
            return Err(CoreError::InviteExhausted);
        }

        // Retried client requests must not double count.
        if let Some(existing) = self.member_repo.find(invite.server_id, user_id).await? {
            return Ok(existing);
        }

        if self.ban_repo.find(invite.server_id, user_id).await?.is_some() {
            return Err(CoreError::conflict("user is banned from this server"));
        }

        // Compare-and-increment: under concurrent redemption the counter
        // never exceeds max_uses, so the loser sees InviteExhausted here.
        let invite = self.invite_repo.claim_use(code).await?;

        let member = match self
            .member_repo
            .create(&Member::new(invite.server_id, user_id))
            .await
        {
            Ok(member) => member,
            // Lost a same-user race after the claim; the membership is
            // the outcome that matters.
            Err(CoreError::Conflict(_)) => self
                .member_repo
                .find(invite.server_id, user_id)
                .await?
                .ok_or(CoreError::NotFound(ResourceKind::Member))?,
            Err(err) => return Err(err),
        };

        info!(
            server_id = invite.server_id,
            user_id,
            code,
            uses = invite.uses,
            "invite redeemed"
        );
        Ok(member)
    }

    /// Revoke an invite. Requires `manage_server` or being its creator.
    pub async fn revoke_invite(&self, code: &str, actor_id: i64) -> Result<(), CoreError> {
        let invite = self
            .invite_repo
            .find_by_code(code)
            .await?
            .ok_or(CoreError::NotFound(ResourceKind::Invite))?;

        if invite.creator_id != actor_id {
            let server = self
                .server_repo
                .find_by_id(invite.server_id)
                .await?
                .ok_or(CoreError::NotFound(ResourceKind::Server))?;
            let actor = self
                .member_repo
                .find(invite.server_id, actor_id)
                .await?
                .ok_or(CoreError::PermissionDenied)?;
            let roles = self.role_repo.find_by_server(invite.server_id).await?;
            PermissionService::require(&actor, &server, &roles, Capabilities::MANAGE_SERVER)?;
        }

        self.invite_repo.delete(code).await?;
        info!(code, actor_id, "invite revoked");
        Ok(())
    }

    /// List a server's invites. Member-only.
    pub async fn server_invites(
        &self,
        server_id: i64,
        actor_id: i64,
    ) -> Result<Vec<Invite>, CoreError> {
        if !self.member_repo.is_member(server_id, actor_id).await? {
            return Err(CoreError::PermissionDenied);
        }
        self.invite_repo.find_by_server(server_id).await
    }

    /// Remove expired invites (maintenance task).
    pub async fn cleanup_expired(&self) -> Result<u64, CoreError> {
        let removed = self.invite_repo.delete_expired().await?;
        if removed > 0 {
            debug!(removed, "expired invites removed");
        }
        Ok(removed)
    }
}
