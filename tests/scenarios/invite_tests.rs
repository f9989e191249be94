//! Invite lifecycle scenarios: idempotent redemption, exhaustion under
//! concurrency, expiry, and revocation rights.

use chrono::{Duration, Utc};
use futures::future::join_all;
use pretty_assertions::assert_eq;

use guild_core::domain::entities::{Invite, InviteRepository};
use guild_core::domain::value_objects::Capabilities;
use guild_core::shared::error::{CoreError, ResourceKind};

use crate::common::{identity, TestApp, ALICE, BOB, CAROL, OWNER};

#[tokio::test]
async fn test_redeem_creates_membership() {
    let app = TestApp::new().await;
    let invites = app.platform.session(identity(OWNER));
    let invite = invites
        .invite_manager()
        .create_invite(app.server.id, OWNER, None, None)
        .await
        .unwrap();
    assert_eq!(invite.code.len(), 8);

    let member = invites
        .invite_manager()
        .redeem_invite(&invite.code, ALICE)
        .await
        .unwrap();
    assert_eq!(member.server_id, app.server.id);
    assert_eq!(member.user_id, ALICE);
}

#[tokio::test]
async fn test_double_redemption_counts_once() {
    let app = TestApp::new().await;
    let session = app.session(OWNER);
    let manager = session.invite_manager();
    let invite = manager
        .create_invite(app.server.id, OWNER, Some(5), None)
        .await
        .unwrap();

    let first = manager.redeem_invite(&invite.code, ALICE).await.unwrap();
    let second = manager.redeem_invite(&invite.code, ALICE).await.unwrap();

    assert_eq!(first.user_id, second.user_id);
    assert_eq!(first.joined_at, second.joined_at);

    let stored = app
        .platform
        .session_deps()
        .invites
        .find_by_code(&invite.code)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.uses, 1);
}

#[tokio::test]
async fn test_single_use_invite_rejects_second_user() {
    let app = TestApp::new().await;
    let session = app.session(OWNER);
    let manager = session.invite_manager();
    let invite = manager
        .create_invite(app.server.id, OWNER, Some(1), None)
        .await
        .unwrap();

    manager.redeem_invite(&invite.code, ALICE).await.unwrap();
    assert_eq!(
        manager.redeem_invite(&invite.code, BOB).await.unwrap_err(),
        CoreError::InviteExhausted
    );
}

#[tokio::test]
async fn test_concurrent_redemption_never_exceeds_max_uses() {
    let app = TestApp::new().await;
    let session = app.session(OWNER);
    let invite = session
        .invite_manager()
        .create_invite(app.server.id, OWNER, Some(3), None)
        .await
        .unwrap();

    let deps = app.platform.session_deps();
    let attempts = join_all((0..8).map(|i| {
        let session = app.session(100 + i);
        let code = invite.code.clone();
        async move {
            session
                .invite_manager()
                .redeem_invite(&code, 100 + i)
                .await
        }
    }))
    .await;

    let succeeded = attempts.iter().filter(|r| r.is_ok()).count();
    let exhausted = attempts
        .iter()
        .filter(|r| matches!(r, Err(CoreError::InviteExhausted)))
        .count();
    assert_eq!(succeeded, 3);
    assert_eq!(exhausted, 5);

    let stored = deps
        .invites
        .find_by_code(&invite.code)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.uses, 3);
}

#[tokio::test]
async fn test_expired_invite_is_rejected() {
    let app = TestApp::new().await;
    // Seed an already-expired invite straight through the port.
    let deps = app.platform.session_deps();
    let invite = Invite {
        code: "expired1".into(),
        server_id: app.server.id,
        creator_id: OWNER,
        max_uses: None,
        uses: 0,
        expires_at: Some(Utc::now() - Duration::seconds(5)),
        created_at: Utc::now() - Duration::hours(1),
    };
    deps.invites.create(&invite).await.unwrap();

    assert_eq!(
        app.session(OWNER)
            .invite_manager()
            .redeem_invite("expired1", ALICE)
            .await
            .unwrap_err(),
        CoreError::InviteExpired
    );
}

#[tokio::test]
async fn test_unknown_code_is_not_found() {
    let app = TestApp::new().await;
    assert_eq!(
        app.session(OWNER)
            .invite_manager()
            .redeem_invite("nosuch00", ALICE)
            .await
            .unwrap_err(),
        CoreError::NotFound(ResourceKind::Invite)
    );
}

#[tokio::test]
async fn test_banned_user_cannot_redeem() {
    let app = TestApp::new().await;
    let session = app.session(OWNER);
    session.membership().join(app.server.id, ALICE).await.unwrap();
    session
        .membership()
        .ban(app.server.id, OWNER, ALICE, None)
        .await
        .unwrap();

    let invite = session
        .invite_manager()
        .create_invite(app.server.id, OWNER, None, None)
        .await
        .unwrap();
    assert!(matches!(
        session
            .invite_manager()
            .redeem_invite(&invite.code, ALICE)
            .await,
        Err(CoreError::Conflict(_))
    ));
}

#[tokio::test]
async fn test_non_member_cannot_create_invites() {
    let app = TestApp::new().await;
    assert_eq!(
        app.session(ALICE)
            .invite_manager()
            .create_invite(app.server.id, ALICE, None, None)
            .await
            .unwrap_err(),
        CoreError::PermissionDenied
    );
}

#[tokio::test]
async fn test_revocation_rights() {
    let app = TestApp::new().await;
    let session = app.session(OWNER);
    let manager = session.invite_manager();
    for user in [ALICE, BOB] {
        session.membership().join(app.server.id, user).await.unwrap();
    }
    app.member_with_role(CAROL, Capabilities::MANAGE_SERVER).await;

    // A bystander member may not revoke someone else's invite.
    let invite = manager
        .create_invite(app.server.id, ALICE, None, None)
        .await
        .unwrap();
    assert_eq!(
        manager.revoke_invite(&invite.code, BOB).await.unwrap_err(),
        CoreError::PermissionDenied
    );

    // The creator may.
    manager.revoke_invite(&invite.code, ALICE).await.unwrap();

    // A manage_server holder may revoke anyone's.
    let invite = manager
        .create_invite(app.server.id, ALICE, None, None)
        .await
        .unwrap();
    manager.revoke_invite(&invite.code, CAROL).await.unwrap();
}

#[tokio::test]
async fn test_cleanup_removes_only_expired_invites() {
    let app = TestApp::new().await;
    let session = app.session(OWNER);
    let manager = session.invite_manager();

    manager
        .create_invite(app.server.id, OWNER, None, Some(Duration::hours(1)))
        .await
        .unwrap();
    let deps = app.platform.session_deps();
    deps.invites
        .create(&Invite {
            code: "stale000".into(),
            server_id: app.server.id,
            creator_id: OWNER,
            max_uses: None,
            uses: 0,
            expires_at: Some(Utc::now() - Duration::seconds(1)),
            created_at: Utc::now() - Duration::hours(2),
        })
        .await
        .unwrap();

    assert_eq!(manager.cleanup_expired().await.unwrap(), 1);
    assert_eq!(
        manager.server_invites(app.server.id, OWNER).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_invite_ttl_and_validation() {
    let app = TestApp::new().await;
    let manager = app.session(OWNER);
    let manager = manager.invite_manager();

    assert!(matches!(
        manager
            .create_invite(app.server.id, OWNER, Some(0), None)
            .await,
        Err(CoreError::Validation(_))
    ));

    let invite = manager
        .create_invite(app.server.id, OWNER, None, Some(Duration::hours(24)))
        .await
        .unwrap();
    assert!(invite.expires_at.is_some());
    assert!(invite.is_valid());
}
