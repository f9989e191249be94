//! Permission model scenarios: grants never exceed held roles, and the
//! escalation guard holds across service calls.

use pretty_assertions::assert_eq;
use test_case::test_case;

use guild_core::domain::entities::{CustomRole, Member, RoleRepository};
use guild_core::domain::services::PermissionService;
use guild_core::domain::value_objects::{Capabilities, Rank};
use guild_core::shared::error::CoreError;

use crate::common::{TestApp, ALICE, BOB, CAROL, OWNER};

#[test_case(Rank::Owner)]
#[test_case(Rank::Admin)]
#[tokio::test]
async fn test_staff_ranks_hold_the_full_capability_set(rank: Rank) {
    let app = TestApp::new().await;
    let owner = app.session(OWNER);
    owner
        .membership()
        .join(app.server.id, ALICE)
        .await
        .unwrap();
    if rank != Rank::Owner {
        owner
            .membership()
            .set_rank(app.server.id, OWNER, ALICE, rank)
            .await
            .unwrap();
    }

    let subject = if rank == Rank::Owner {
        Member {
            rank: Rank::Owner,
            ..Member::new(app.server.id, OWNER)
        }
    } else {
        Member {
            rank,
            ..Member::new(app.server.id, ALICE)
        }
    };
    let caps = PermissionService::effective_capabilities(&subject, &app.server, &[]);
    assert_eq!(caps, Capabilities::all());
}

#[tokio::test]
async fn test_effective_capabilities_never_exceed_held_grants() {
    let app = TestApp::new().await;
    let member = app
        .member_with_role(ALICE, Capabilities::SEND_MESSAGES | Capabilities::KICK_MEMBERS)
        .await;

    // An unheld all-capability role exists alongside.
    app.session(OWNER)
        .membership()
        .create_role(
            app.server.id,
            OWNER,
            guild_core::application::services::RolePayload {
                name: "unheld".into(),
                color: None,
                capabilities: Capabilities::all(),
            },
        )
        .await
        .unwrap();

    let roles: Vec<CustomRole> = app
        .platform
        .session_deps()
        .roles
        .find_by_server(app.server.id)
        .await
        .unwrap();
    let caps = PermissionService::effective_capabilities(&member, &app.server, &roles);
    assert!(caps.has(Capabilities::SEND_MESSAGES));
    assert!(caps.has(Capabilities::KICK_MEMBERS));
    assert!(!caps.has(Capabilities::MANAGE_SERVER));
    assert!(!caps.has(Capabilities::BAN_MEMBERS));
}

#[tokio::test]
async fn test_rank_change_cannot_reach_actor_level() {
    let app = TestApp::new().await;
    let owner = app.session(OWNER);
    for user in [ALICE, BOB] {
        owner.membership().join(app.server.id, user).await.unwrap();
    }
    owner
        .membership()
        .set_rank(app.server.id, OWNER, ALICE, Rank::Admin)
        .await
        .unwrap();

    // An admin can promote to moderator...
    owner
        .membership()
        .set_rank(app.server.id, ALICE, BOB, Rank::Moderator)
        .await
        .unwrap();

    // ...but not to admin (their own level), and never to owner.
    assert_eq!(
        owner
            .membership()
            .set_rank(app.server.id, ALICE, BOB, Rank::Admin)
            .await
            .unwrap_err(),
        CoreError::PermissionDenied
    );
    assert_eq!(
        owner
            .membership()
            .set_rank(app.server.id, OWNER, BOB, Rank::Owner)
            .await
            .unwrap_err(),
        CoreError::PermissionDenied
    );
}

#[tokio::test]
async fn test_rank_change_requires_manage_roles() {
    let app = TestApp::new().await;
    let owner = app.session(OWNER);
    for user in [ALICE, BOB] {
        owner.membership().join(app.server.id, user).await.unwrap();
    }

    // A plain member holds no manage_roles.
    assert_eq!(
        owner
            .membership()
            .set_rank(app.server.id, ALICE, BOB, Rank::Moderator)
            .await
            .unwrap_err(),
        CoreError::PermissionDenied
    );
}

#[tokio::test]
async fn test_moderation_hierarchy_binds_kick_and_ban() {
    let app = TestApp::new().await;
    let owner = app.session(OWNER);
    let membership = owner.membership();
    for user in [ALICE, BOB] {
        membership.join(app.server.id, user).await.unwrap();
    }
    membership
        .set_rank(app.server.id, OWNER, ALICE, Rank::Moderator)
        .await
        .unwrap();
    membership
        .set_rank(app.server.id, OWNER, BOB, Rank::Moderator)
        .await
        .unwrap();
    app.member_with_role(CAROL, Capabilities::KICK_MEMBERS).await;

    // A moderator cannot kick a peer moderator, whatever the bits say.
    assert_eq!(
        membership.kick(app.server.id, BOB, ALICE).await.unwrap_err(),
        CoreError::PermissionDenied
    );

    // The kick capability without a rank advantage is not enough.
    assert_eq!(
        membership
            .kick(app.server.id, CAROL, ALICE)
            .await
            .unwrap_err(),
        CoreError::PermissionDenied
    );

    // The owner outranks everyone.
    membership.kick(app.server.id, OWNER, BOB).await.unwrap();
    assert!(membership
        .ban(app.server.id, OWNER, ALICE, Some("spam".into()))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_owner_cannot_leave_but_members_can() {
    let app = TestApp::new().await;
    let owner = app.session(OWNER);
    owner.membership().join(app.server.id, ALICE).await.unwrap();

    assert!(matches!(
        owner.membership().leave(app.server.id, OWNER).await,
        Err(CoreError::Conflict(_))
    ));
    owner.membership().leave(app.server.id, ALICE).await.unwrap();
}

#[tokio::test]
async fn test_platform_admin_allowlist_can_delete_foreign_server() {
    let mut settings = guild_core::config::Settings::default();
    settings.authorization.admin_emails = vec![format!("user-{CAROL}@example.com")];
    let app = TestApp::with_settings(settings).await;

    // Carol is not even a member, but her email is allowlisted.
    app.session(CAROL)
        .membership()
        .delete_server(app.server.id, CAROL, &format!("user-{CAROL}@example.com"))
        .await
        .unwrap();

    // Bob is neither owner, admin, nor allowlisted.
    let app = TestApp::new().await;
    assert_eq!(
        app.session(BOB)
            .membership()
            .delete_server(app.server.id, BOB, &format!("user-{BOB}@example.com"))
            .await
            .unwrap_err(),
        CoreError::PermissionDenied
    );
}
