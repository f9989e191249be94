//! Presence scenarios across sessions sharing a server.

use guild_core::domain::entities::PresenceState;

use crate::common::{wait_until_sync, TestApp, ALICE, BOB, CAROL, OWNER};

#[tokio::test]
async fn test_transitions_reach_other_sessions() {
    let app = TestApp::new().await;
    let owner = app.owner_session().await;
    let alice = app.member_session(ALICE).await;

    alice.set_presence(PresenceState::Online);
    wait_until_sync(|| owner.presence_of(ALICE) == PresenceState::Online).await;

    alice.set_presence(PresenceState::Dnd);
    wait_until_sync(|| owner.presence_of(ALICE) == PresenceState::Dnd).await;
}

#[tokio::test]
async fn test_invisible_is_observed_as_offline() {
    let app = TestApp::new().await;
    let owner = app.owner_session().await;
    let alice = app.member_session(ALICE).await;

    alice.set_presence(PresenceState::Online);
    wait_until_sync(|| owner.presence_of(ALICE) == PresenceState::Online).await;

    alice.set_presence(PresenceState::Invisible);
    wait_until_sync(|| owner.presence_of(ALICE) == PresenceState::Offline).await;
}

#[tokio::test]
async fn test_disconnect_maps_to_offline() {
    let app = TestApp::new().await;
    let owner = app.owner_session().await;
    let alice = app.member_session(ALICE).await;

    alice.set_presence(PresenceState::Online);
    wait_until_sync(|| owner.presence_of(ALICE) == PresenceState::Online).await;

    alice.disconnect();
    wait_until_sync(|| owner.presence_of(ALICE) == PresenceState::Offline).await;
}

#[tokio::test]
async fn test_strangers_read_as_offline() {
    let app = TestApp::new().await;
    let owner = app.owner_session().await;

    // Bob never joined this server; whatever he publishes elsewhere is
    // not observable here.
    let bob = app.session(BOB);
    bob.set_presence(PresenceState::Online);

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(owner.presence_of(BOB), PresenceState::Offline);
}

#[tokio::test]
async fn test_attach_snapshots_existing_presence() {
    let app = TestApp::new().await;
    let alice = app.member_session(ALICE).await;
    alice.set_presence(PresenceState::Idle);

    // Carol joins and attaches after Alice's transition was broadcast;
    // her replica starts from the tracker snapshot.
    let carol = app.member_session(CAROL).await;
    wait_until_sync(|| carol.presence_of(ALICE) == PresenceState::Idle).await;
}
