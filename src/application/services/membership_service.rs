//! Membership Service
//!
//! Server lifecycle, membership (join/leave/kick/ban), and rank/role
//! administration. Every mutation is capability-checked before it
//! touches the persistence collaborator.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use validator::Validate;

use crate::domain::entities::{
    Ban, BanRepository, CustomRole, Member, MemberRepository, RoleRepository, Server,
    ServerRepository,
};
use crate::domain::ports::ObjectStorage;
use crate::domain::services::{AdminCandidate, AdminPolicy, PermissionService};
use crate::domain::value_objects::{Capabilities, Rank};
use crate::shared::error::{CoreError, ResourceKind};
use crate::shared::snowflake::SnowflakeGenerator;
use crate::shared::validation::validation_error;

/// Request payload for creating a server.
#[derive(Debug, Clone, Validate)]
pub struct CreateServerPayload {
    #[validate(length(min = 1, max = 100, message = "must be 1-100 characters"))]
    pub name: String,
    #[validate(length(max = 1000, message = "must be at most 1000 characters"))]
    pub description: Option<String>,
}

/// Request payload for updating a server's profile.
#[derive(Debug, Clone, Default, Validate)]
pub struct UpdateServerPayload {
    #[validate(length(min = 1, max = 100, message = "must be 1-100 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 1000, message = "must be at most 1000 characters"))]
    pub description: Option<String>,
}

/// Request payload for creating or updating a custom role.
#[derive(Debug, Clone, Validate)]
pub struct RolePayload {
    #[validate(length(min = 1, max = 64, message = "must be 1-64 characters"))]
    pub name: String,
    pub color: Option<String>,
    pub capabilities: Capabilities,
}

/// Membership, moderation, and role administration.
pub struct MembershipService<S: ?Sized, M: ?Sized, R: ?Sized, B: ?Sized> {
    server_repo: Arc<S>,
    member_repo: Arc<M>,
    role_repo: Arc<R>,
    ban_repo: Arc<B>,
    id_generator: Arc<SnowflakeGenerator>,
    admin_policy: Arc<AdminPolicy>,
}

impl<S, M, R, B> MembershipService<S, M, R, B>
where
    S: ServerRepository + ?Sized,
    M: MemberRepository + ?Sized,
    R: RoleRepository + ?Sized,
    B: BanRepository + ?Sized,
{
    pub fn new(
        server_repo: Arc<S>,
        member_repo: Arc<M>,
        role_repo: Arc<R>,
        ban_repo: Arc<B>,
        id_generator: Arc<SnowflakeGenerator>,
        admin_policy: Arc<AdminPolicy>,
    ) -> Self {
        Self {
            server_repo,
            member_repo,
            role_repo,
            ban_repo,
            id_generator,
            admin_policy,
        }
    }

    async fn server(&self, server_id: i64) -> Result<Server, CoreError> {
        self.server_repo
            .find_by_id(server_id)
            .await?
            .ok_or(CoreError::NotFound(ResourceKind::Server))
    }

    async fn member(&self, server_id: i64, user_id: i64) -> Result<Member, CoreError> {
        self.member_repo
            .find(server_id, user_id)
            .await?
            .ok_or(CoreError::NotFound(ResourceKind::Member))
    }

    /// Create a server; the creator becomes its owner member.
    pub async fn create_server(
        &self,
        owner_id: i64,
        payload: CreateServerPayload,
    ) -> Result<(Server, Member), CoreError> {
        payload.validate().map_err(validation_error)?;

        let server = Server {
            id: self.id_generator.generate(),
            name: payload.name,
            owner_id,
            icon_url: None,
            banner_url: None,
            description: payload.description,
            created_at: Utc::now(),
        };
        let server = self.server_repo.create(&server).await?;

        let owner = Member {
            rank: Rank::Owner,
            ..Member::new(server.id, owner_id)
        };
        let owner = self.member_repo.create(&owner).await?;

        info!(server_id = server.id, owner_id, "server created");
        Ok((server, owner))
    }

    /// Delete a server. Allowed for the owner, or for a platform admin
    /// per the configured policy. This is the only path that removes an
    /// owner membership.
    pub async fn delete_server(
        &self,
        server_id: i64,
        actor_id: i64,
        actor_email: &str,
    ) -> Result<(), CoreError> {
        let server = self.server(server_id).await?;

        if !server.is_owner(actor_id) {
            let rank = self
                .member_repo
                .find(server_id, actor_id)
                .await?
                .map(|m| PermissionService::effective_rank(&m, &server));
            let candidate = AdminCandidate {
                user_id: actor_id,
                email: actor_email.to_string(),
                rank,
            };
            if !self.admin_policy.is_admin(&candidate) {
                return Err(CoreError::PermissionDenied);
            }
        }

        self.server_repo.delete(server_id).await?;
        info!(server_id, actor_id, "server deleted");
        Ok(())
    }

    /// Update server name/description. Requires `manage_server`.
    pub async fn update_server(
        &self,
        server_id: i64,
        actor_id: i64,
        payload: UpdateServerPayload,
    ) -> Result<Server, CoreError> {
        payload.validate().map_err(validation_error)?;

        let mut server = self.server(server_id).await?;
        let actor = self.member(server_id, actor_id).await?;
        let roles = self.role_repo.find_by_server(server_id).await?;
        PermissionService::require(&actor, &server, &roles, Capabilities::MANAGE_SERVER)?;

        if let Some(name) = payload.name {
            server.name = name;
        }
        if payload.description.is_some() {
            server.description = payload.description;
        }
        self.server_repo.update(&server).await
    }

    /// Upload a server icon through the object-storage collaborator and
    /// store only the returned reference URL. Requires `manage_server`.
    pub async fn set_server_icon<O>(
        &self,
        server_id: i64,
        actor_id: i64,
        storage: &O,
        bytes: Vec<u8>,
    ) -> Result<Server, CoreError>
    where
        O: ObjectStorage + ?Sized,
    {
        let mut server = self.server(server_id).await?;
        let actor = self.member(server_id, actor_id).await?;
        let roles = self.role_repo.find_by_server(server_id).await?;
        PermissionService::require(&actor, &server, &roles, Capabilities::MANAGE_SERVER)?;

        let key = format!("servers/{server_id}/icon");
        let url = storage.put(&key, bytes).await?;
        server.icon_url = Some(url);
        self.server_repo.update(&server).await
    }

    /// Add a user as a plain member. Fails `Conflict` on duplicate
    /// membership or an active ban.
    pub async fn join(&self, server_id: i64, user_id: i64) -> Result<Member, CoreError> {
        self.server(server_id).await?;

        if self.ban_repo.find(server_id, user_id).await?.is_some() {
            return Err(CoreError::conflict("user is banned from this server"));
        }
        if self.member_repo.is_member(server_id, user_id).await? {
            return Err(CoreError::conflict("already a member"));
        }

        let member = self.member_repo.create(&Member::new(server_id, user_id)).await?;
        info!(server_id, user_id, "member joined");
        Ok(member)
    }

    /// Leave a server. The owner cannot leave; the server must be
    /// deleted instead.
    pub async fn leave(&self, server_id: i64, user_id: i64) -> Result<(), CoreError> {
        let server = self.server(server_id).await?;
        if server.is_owner(user_id) {
            return Err(CoreError::conflict("owner cannot leave their own server"));
        }
        self.member(server_id, user_id).await?;
        self.member_repo.delete(server_id, user_id).await
    }

    /// Kick a member. Requires `kick_members` and a strictly higher rank
    /// than the target.
    pub async fn kick(
        &self,
        server_id: i64,
        actor_id: i64,
        target_id: i64,
    ) -> Result<(), CoreError> {
        let server = self.server(server_id).await?;
        let actor = self.member(server_id, actor_id).await?;
        let target = self.member(server_id, target_id).await?;
        let roles = self.role_repo.find_by_server(server_id).await?;

        PermissionService::check_moderation(
            &actor,
            &target,
            &server,
            &roles,
            Capabilities::KICK_MEMBERS,
        )?;

        self.member_repo.delete(server_id, target_id).await?;
        info!(server_id, actor_id, target_id, "member kicked");
        Ok(())
    }

    /// Ban a member: records the ban and removes the membership. The
    /// ban blocks rejoining until lifted.
    pub async fn ban(
        &self,
        server_id: i64,
        actor_id: i64,
        target_id: i64,
        reason: Option<String>,
    ) -> Result<Ban, CoreError> {
        let server = self.server(server_id).await?;
        let actor = self.member(server_id, actor_id).await?;
        let target = self.member(server_id, target_id).await?;
        let roles = self.role_repo.find_by_server(server_id).await?;

        PermissionService::check_moderation(
            &actor,
            &target,
            &server,
            &roles,
            Capabilities::BAN_MEMBERS,
        )?;

        let ban = Ban {
            id: self.id_generator.generate(),
            server_id,
            user_id: target_id,
            banned_by: actor_id,
            reason,
            created_at: Utc::now(),
        };
        let ban = self.ban_repo.create(&ban).await?;
        self.member_repo.delete(server_id, target_id).await?;
        info!(server_id, actor_id, target_id, "member banned");
        Ok(ban)
    }

    /// Lift a ban. Requires `ban_members`.
    pub async fn unban(
        &self,
        server_id: i64,
        actor_id: i64,
        target_id: i64,
    ) -> Result<(), CoreError> {
        let server = self.server(server_id).await?;
        let actor = self.member(server_id, actor_id).await?;
        let roles = self.role_repo.find_by_server(server_id).await?;
        PermissionService::require(&actor, &server, &roles, Capabilities::BAN_MEMBERS)?;

        if self.ban_repo.find(server_id, target_id).await?.is_none() {
            return Err(CoreError::conflict("user is not banned"));
        }
        self.ban_repo.delete(server_id, target_id).await
    }

    /// Change a member's built-in rank. The actor must hold
    /// `manage_roles` and strictly outrank both the current and the
    /// proposed rank; owner rank is never assignable.
    pub async fn set_rank(
        &self,
        server_id: i64,
        actor_id: i64,
        target_id: i64,
        rank: Rank,
    ) -> Result<Member, CoreError> {
        let server = self.server(server_id).await?;
        let actor = self.member(server_id, actor_id).await?;
        let mut target = self.member(server_id, target_id).await?;
        let roles = self.role_repo.find_by_server(server_id).await?;

        PermissionService::check_rank_change(&actor, &target, &server, &roles, rank)?;

        target.rank = rank;
        self.member_repo.update(&target).await
    }

    /// Grant a custom role to a member.
    pub async fn assign_role(
        &self,
        server_id: i64,
        actor_id: i64,
        target_id: i64,
        role_id: i64,
    ) -> Result<Member, CoreError> {
        let server = self.server(server_id).await?;
        let actor = self.member(server_id, actor_id).await?;
        let mut target = self.member(server_id, target_id).await?;
        let roles = self.role_repo.find_by_server(server_id).await?;

        PermissionService::check_role_edit(&actor, &target, &server, &roles)?;

        if !roles.iter().any(|r| r.id == role_id) {
            return Err(CoreError::NotFound(ResourceKind::Role));
        }
        if !target.has_role(role_id) {
            target.roles.push(role_id);
        }
        self.member_repo.update(&target).await
    }

    /// Take a custom role from a member.
    pub async fn remove_role(
        &self,
        server_id: i64,
        actor_id: i64,
        target_id: i64,
        role_id: i64,
    ) -> Result<Member, CoreError> {
        let server = self.server(server_id).await?;
        let actor = self.member(server_id, actor_id).await?;
        let mut target = self.member(server_id, target_id).await?;
        let roles = self.role_repo.find_by_server(server_id).await?;

        PermissionService::check_role_edit(&actor, &target, &server, &roles)?;

        target.roles.retain(|id| *id != role_id);
        self.member_repo.update(&target).await
    }

    /// Create a custom role. Requires `manage_roles`.
    pub async fn create_role(
        &self,
        server_id: i64,
        actor_id: i64,
        payload: RolePayload,
    ) -> Result<CustomRole, CoreError> {
        payload.validate().map_err(validation_error)?;

        let server = self.server(server_id).await?;
        let actor = self.member(server_id, actor_id).await?;
        let roles = self.role_repo.find_by_server(server_id).await?;
        PermissionService::require(&actor, &server, &roles, Capabilities::MANAGE_ROLES)?;

        let position = roles.iter().map(|r| r.position).max().unwrap_or(-1) + 1;
        let role = CustomRole {
            id: self.id_generator.generate(),
            server_id,
            name: payload.name,
            color: payload.color,
            capabilities: payload.capabilities,
            position,
            created_at: Utc::now(),
        };
        self.role_repo.create(&role).await
    }

    /// Update a custom role's name, color, or capabilities. Requires
    /// `manage_roles`.
    pub async fn update_role(
        &self,
        server_id: i64,
        actor_id: i64,
        role_id: i64,
        payload: RolePayload,
    ) -> Result<CustomRole, CoreError> {
        payload.validate().map_err(validation_error)?;

        let server = self.server(server_id).await?;
        let actor = self.member(server_id, actor_id).await?;
        let roles = self.role_repo.find_by_server(server_id).await?;
        PermissionService::require(&actor, &server, &roles, Capabilities::MANAGE_ROLES)?;

        let mut role = roles
            .into_iter()
            .find(|r| r.id == role_id)
            .ok_or(CoreError::NotFound(ResourceKind::Role))?;
        role.name = payload.name;
        role.color = payload.color;
        role.capabilities = payload.capabilities;
        self.role_repo.update(&role).await
    }

    /// Delete a custom role. Requires `manage_roles`. Members keep a
    /// dangling role id until their next role edit; resolution ignores
    /// ids with no backing role.
    pub async fn delete_role(
        &self,
        server_id: i64,
        actor_id: i64,
        role_id: i64,
    ) -> Result<(), CoreError> {
        let server = self.server(server_id).await?;
        let actor = self.member(server_id, actor_id).await?;
        let roles = self.role_repo.find_by_server(server_id).await?;
        PermissionService::require(&actor, &server, &roles, Capabilities::MANAGE_ROLES)?;

        if !roles.iter().any(|r| r.id == role_id) {
            return Err(CoreError::NotFound(ResourceKind::Role));
        }
        self.role_repo.delete(role_id).await
    }
}
