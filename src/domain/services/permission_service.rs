//! Capability resolution and escalation guards.

use crate::domain::entities::{CustomRole, Member, Server};
use crate::domain::value_objects::{Capabilities, Rank};
use crate::shared::error::CoreError;

/// Domain service resolving a member's effective capability set.
pub struct PermissionService;

impl PermissionService {
    /// Rank as enforced, not as stored: the server owner is always
    /// `Owner` even if the membership row disagrees.
    pub fn effective_rank(member: &Member, server: &Server) -> Rank {
        if server.is_owner(member.user_id) {
            Rank::Owner
        } else {
            member.rank
        }
    }

    /// Resolve the effective capability set for a member.
    ///
    /// Owner and admin hold everything. Moderators and plain members
    /// hold the permissive union of their custom roles' bits; the two
    /// defaults (send_messages, connect_voice) apply only while the
    /// member holds no custom role, since each role's bitset is explicit
    /// over all flags and a clear bit is a revocation.
    pub fn effective_capabilities(
        member: &Member,
        server: &Server,
        roles: &[CustomRole],
    ) -> Capabilities {
        if Self::effective_rank(member, server).has_full_capabilities() {
            return Capabilities::all();
        }

        let mut held = roles.iter().filter(|r| member.has_role(r.id)).peekable();
        if held.peek().is_none() {
            return Capabilities::defaults();
        }

        held.fold(Capabilities::empty(), |acc, role| {
            acc.union(role.capabilities)
        })
    }

    /// Fail with `PermissionDenied` unless the member holds `capability`.
    /// Every mutating operation calls this before touching state.
    pub fn require(
        member: &Member,
        server: &Server,
        roles: &[CustomRole],
        capability: i64,
    ) -> Result<(), CoreError> {
        if Self::effective_capabilities(member, server, roles).has(capability) {
            Ok(())
        } else {
            Err(CoreError::PermissionDenied)
        }
    }

    /// Guard for changing a member's rank.
    ///
    /// The actor must hold `manage_roles` and outrank both the target's
    /// current and proposed rank strictly. Owner rank is never
    /// assignable through this path.
    pub fn check_rank_change(
        actor: &Member,
        target: &Member,
        server: &Server,
        roles: &[CustomRole],
        proposed: Rank,
    ) -> Result<(), CoreError> {
        if proposed == Rank::Owner {
            return Err(CoreError::PermissionDenied);
        }

        Self::require(actor, server, roles, Capabilities::MANAGE_ROLES)?;

        let actor_rank = Self::effective_rank(actor, server);
        let target_rank = Self::effective_rank(target, server);

        if actor_rank > target_rank && actor_rank > proposed {
            Ok(())
        } else {
            Err(CoreError::PermissionDenied)
        }
    }

    /// Guard for editing a member's custom role set. Same hierarchy rule
    /// as rank changes, against the target's current rank.
    pub fn check_role_edit(
        actor: &Member,
        target: &Member,
        server: &Server,
        roles: &[CustomRole],
    ) -> Result<(), CoreError> {
        Self::require(actor, server, roles, Capabilities::MANAGE_ROLES)?;

        if Self::effective_rank(actor, server) > Self::effective_rank(target, server) {
            Ok(())
        } else {
            Err(CoreError::PermissionDenied)
        }
    }

    /// Guard for kick/ban: the required capability plus a strictly
    /// higher rank than the target.
    pub fn check_moderation(
        actor: &Member,
        target: &Member,
        server: &Server,
        roles: &[CustomRole],
        capability: i64,
    ) -> Result<(), CoreError> {
        Self::require(actor, server, roles, capability)?;

        if Self::effective_rank(actor, server) > Self::effective_rank(target, server) {
            Ok(())
        } else {
            Err(CoreError::PermissionDenied)
        }
    }
}
