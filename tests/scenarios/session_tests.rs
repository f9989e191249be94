//! Guild session scenarios: optimistic sends reconciled against the
//! feed, history/live merge, retry policy, and context switching.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use guild_core::application::services::CreateChannelPayload;
use guild_core::application::stream::StreamEntry;
use guild_core::domain::entities::{Channel, ChannelType};
use guild_core::domain::ports::Identity;
use guild_core::infrastructure::memory::MemoryIdentity;
use guild_core::shared::error::{CoreError, ResourceKind};

use crate::common::{
    create_server, identity, wait_until_sync, TestApp, ALICE, BOB, OWNER,
};

async fn make_channel(app: &TestApp, name: &str) -> Channel {
    app.session(OWNER)
        .directory_manager()
        .create_channel(
            app.server.id,
            OWNER,
            CreateChannelPayload {
                name: name.into(),
                kind: ChannelType::Text,
                category_id: None,
                topic: None,
            },
        )
        .await
        .unwrap()
}

fn confirmed_contents(entries: &[StreamEntry]) -> Vec<String> {
    entries
        .iter()
        .filter_map(|e| match e {
            StreamEntry::Confirmed(m) => Some(m.content.clone()),
            StreamEntry::Pending(_) => None,
        })
        .collect()
}

#[tokio::test]
async fn test_send_appears_once_after_echo() {
    let app = TestApp::new().await;
    let channel = make_channel(&app, "general").await;

    // Alice holds only send_messages via a custom role.
    app.member_with_role(ALICE, guild_core::domain::value_objects::Capabilities::SEND_MESSAGES)
        .await;
    let alice = app.session(ALICE);
    alice.attach(app.server.id).await.unwrap();
    alice.open_channel(channel.id).await.unwrap();

    // The same member cannot create channels...
    assert_eq!(
        alice
            .directory_manager()
            .create_channel(
                app.server.id,
                ALICE,
                CreateChannelPayload {
                    name: "nope".into(),
                    kind: ChannelType::Text,
                    category_id: None,
                    topic: None,
                },
            )
            .await
            .unwrap_err(),
        CoreError::PermissionDenied
    );

    // ...but sends fine, and the echo does not duplicate the message.
    alice.send_message(channel.id, "hi").await.unwrap();
    wait_until_sync(|| {
        let view = alice.channel_view(channel.id).unwrap();
        confirmed_contents(&view) == vec!["hi".to_string()] && view.len() == 1
    })
    .await;
}

#[tokio::test]
async fn test_send_without_capability_is_denied() {
    let app = TestApp::new().await;
    let channel = make_channel(&app, "general").await;

    // A role granting only connect_voice explicitly revokes the
    // send_messages default.
    app.member_with_role(ALICE, guild_core::domain::value_objects::Capabilities::CONNECT_VOICE)
        .await;
    let alice = app.session(ALICE);
    alice.attach(app.server.id).await.unwrap();
    alice.open_channel(channel.id).await.unwrap();

    assert_eq!(
        alice.send_message(channel.id, "hi").await.unwrap_err(),
        CoreError::PermissionDenied
    );
}

#[tokio::test]
async fn test_messages_from_other_sessions_arrive_in_order() {
    let app = TestApp::new().await;
    let channel = make_channel(&app, "general").await;

    let owner = app.owner_session().await;
    owner.open_channel(channel.id).await.unwrap();
    let alice = app.member_session(ALICE).await;
    alice.open_channel(channel.id).await.unwrap();

    owner.send_message(channel.id, "one").await.unwrap();
    alice.send_message(channel.id, "two").await.unwrap();
    owner.send_message(channel.id, "three").await.unwrap();

    for session in [&owner, &alice] {
        wait_until_sync(|| {
            session
                .channel_view(channel.id)
                .map(|view| {
                    confirmed_contents(&view) == vec!["one", "two", "three"]
                        && view.len() == 3
                })
                .unwrap_or(false)
        })
        .await;
    }
}

#[tokio::test]
async fn test_history_page_merges_with_live_feed() {
    let app = TestApp::new().await;
    let channel = make_channel(&app, "general").await;

    let owner = app.owner_session().await;
    owner.open_channel(channel.id).await.unwrap();
    for i in 0..60 {
        owner
            .send_message(channel.id, &format!("backlog-{i}"))
            .await
            .unwrap();
    }

    // A second session opens the channel (page of 50) while new
    // messages keep flowing.
    let alice = app.member_session(ALICE).await;
    alice.open_channel(channel.id).await.unwrap();
    owner.send_message(channel.id, "fresh").await.unwrap();

    wait_until_sync(|| {
        alice
            .channel_view(channel.id)
            .map(|view| {
                let contents = confirmed_contents(&view);
                contents.last().map(String::as_str) == Some("fresh")
                    && contents.first().map(String::as_str) == Some("backlog-10")
                    && contents.len() == 51
            })
            .unwrap_or(false)
    })
    .await;

    // Exactly once each, still sorted.
    let view = alice.channel_view(channel.id).unwrap();
    let contents = confirmed_contents(&view);
    let mut deduped = contents.clone();
    deduped.dedup();
    assert_eq!(contents, deduped);
}

#[tokio::test]
async fn test_failed_send_is_surfaced_and_not_retried() {
    let app = TestApp::new().await;
    let channel = make_channel(&app, "general").await;
    let owner = app.owner_session().await;
    owner.open_channel(channel.id).await.unwrap();

    app.platform.backend().inject_write_failures(1);
    let err = owner.send_message(channel.id, "lost").await.unwrap_err();
    assert!(matches!(err, CoreError::Collaborator(_)));

    // The optimistic entry was abandoned; an explicit resend works.
    assert!(owner.channel_view(channel.id).unwrap().is_empty());
    owner.send_message(channel.id, "lost").await.unwrap();
    wait_until_sync(|| {
        owner
            .channel_view(channel.id)
            .map(|view| view.len() == 1)
            .unwrap_or(false)
    })
    .await;
}

#[tokio::test]
async fn test_bounded_retry_covers_transient_read_failures() {
    let app = TestApp::new().await;
    let channel = make_channel(&app, "general").await;
    let owner = app.owner_session().await;

    // Two transient failures fit inside the three configured attempts.
    app.platform.backend().inject_read_failures(2);
    owner.open_channel(channel.id).await.unwrap();
}

#[tokio::test]
async fn test_edits_and_pins_update_in_place() {
    let app = TestApp::new().await;
    let channel = make_channel(&app, "general").await;
    let owner = app.owner_session().await;
    owner.open_channel(channel.id).await.unwrap();

    owner.send_message(channel.id, "first").await.unwrap();
    owner.send_message(channel.id, "second").await.unwrap();
    wait_until_sync(|| {
        owner
            .channel_view(channel.id)
            .map(|v| v.len() == 2)
            .unwrap_or(false)
    })
    .await;

    let first_id = match &owner.channel_view(channel.id).unwrap()[0] {
        StreamEntry::Confirmed(m) => m.id,
        _ => panic!("expected confirmed message"),
    };

    owner
        .edit_message(channel.id, first_id, "first (edited)")
        .await
        .unwrap();
    owner.toggle_pin(channel.id, first_id).await.unwrap();

    wait_until_sync(|| {
        owner
            .channel_view(channel.id)
            .map(|view| {
                matches!(
                    &view[0],
                    StreamEntry::Confirmed(m)
                        if m.content == "first (edited)" && m.pinned && m.edited_at.is_some()
                )
            })
            .unwrap_or(false)
    })
    .await;

    // Order unchanged by either update.
    let contents = confirmed_contents(&owner.channel_view(channel.id).unwrap());
    assert_eq!(contents, vec!["first (edited)", "second"]);
}

#[tokio::test]
async fn test_edit_of_foreign_message_is_denied() {
    let app = TestApp::new().await;
    let channel = make_channel(&app, "general").await;
    let owner = app.owner_session().await;
    owner.open_channel(channel.id).await.unwrap();
    owner.send_message(channel.id, "owners words").await.unwrap();

    let alice = app.member_session(ALICE).await;
    alice.open_channel(channel.id).await.unwrap();
    wait_until_sync(|| {
        alice
            .channel_view(channel.id)
            .map(|v| v.len() == 1)
            .unwrap_or(false)
    })
    .await;
    let id = match &alice.channel_view(channel.id).unwrap()[0] {
        StreamEntry::Confirmed(m) => m.id,
        _ => panic!("expected confirmed message"),
    };

    assert_eq!(
        alice
            .edit_message(channel.id, id, "defaced")
            .await
            .unwrap_err(),
        CoreError::PermissionDenied
    );
}

#[tokio::test]
async fn test_closing_a_channel_leaves_others_running() {
    let app = TestApp::new().await;
    let general = make_channel(&app, "general").await;
    let random = make_channel(&app, "random").await;

    let owner = app.owner_session().await;
    owner.open_channel(general.id).await.unwrap();
    owner.open_channel(random.id).await.unwrap();

    owner.close_channel(general.id);
    assert_eq!(
        owner.channel_view(general.id).unwrap_err(),
        CoreError::NotFound(ResourceKind::Channel)
    );

    owner.send_message(random.id, "still alive").await.unwrap();
    wait_until_sync(|| {
        owner
            .channel_view(random.id)
            .map(|v| v.len() == 1)
            .unwrap_or(false)
    })
    .await;
}

#[tokio::test]
async fn test_server_switch_resets_all_state() {
    let app = TestApp::new().await;
    let channel = make_channel(&app, "general").await;
    let owner = app.owner_session().await;
    owner.open_channel(channel.id).await.unwrap();

    let second = create_server(&app.platform, OWNER).await;
    owner.switch_server(second.id).await.unwrap();

    // Prior server's stream is gone; the directory is the new server's.
    assert_eq!(
        owner.channel_view(channel.id).unwrap_err(),
        CoreError::NotFound(ResourceKind::Channel)
    );
    assert!(owner.directory_tree().unwrap().flattened().is_empty());
}

#[tokio::test]
async fn test_roster_replica_follows_kicks() {
    let app = TestApp::new().await;
    let owner = app.owner_session().await;
    let _alice = app.member_session(ALICE).await;

    wait_until_sync(|| {
        owner
            .member_list()
            .map(|members| members.iter().any(|m| m.user_id == ALICE))
            .unwrap_or(false)
    })
    .await;

    owner
        .membership()
        .kick(app.server.id, OWNER, ALICE)
        .await
        .unwrap();

    wait_until_sync(|| {
        owner
            .member_list()
            .map(|members| !members.iter().any(|m| m.user_id == ALICE))
            .unwrap_or(false)
    })
    .await;
}

#[tokio::test]
async fn test_voice_channels_carry_no_stream() {
    let app = TestApp::new().await;
    let voice = app
        .session(OWNER)
        .directory_manager()
        .create_channel(
            app.server.id,
            OWNER,
            CreateChannelPayload {
                name: "lounge".into(),
                kind: ChannelType::Voice,
                category_id: None,
                topic: None,
            },
        )
        .await
        .unwrap();

    let owner = app.owner_session().await;
    assert!(matches!(
        owner.open_channel(voice.id).await,
        Err(CoreError::Validation(_))
    ));
}

#[tokio::test]
async fn test_attach_requires_membership() {
    let app = TestApp::new().await;
    let bob = app.session(BOB);
    assert_eq!(
        bob.attach(app.server.id).await.unwrap_err(),
        CoreError::NotFound(ResourceKind::Member)
    );
}

#[tokio::test]
async fn test_authenticate_resolves_identity_through_the_port() {
    let app = TestApp::new().await;
    let identities = Arc::new(MemoryIdentity::new());
    identities.register("tok-owner", identity(OWNER));

    let identities: Arc<dyn Identity> = identities;
    let session = guild_core::application::session::GuildSession::authenticate(
        "tok-owner",
        identities.clone(),
        app.platform.session_deps(),
    )
    .await
    .unwrap();
    assert_eq!(session.user_id(), OWNER);

    assert!(guild_core::application::session::GuildSession::authenticate(
        "bad-token",
        identities,
        app.platform.session_deps(),
    )
    .await
    .is_err());
}

#[tokio::test]
async fn test_correlation_echo_reconciles_identical_rapid_sends() {
    let app = TestApp::with_correlation_echo().await;
    let channel = make_channel(&app, "general").await;
    let owner = app.owner_session().await;
    owner.open_channel(channel.id).await.unwrap();

    // Two identical messages in quick succession: with echoed
    // correlation ids each echo claims exactly its own pending entry.
    owner.send_message(channel.id, "same").await.unwrap();
    owner.send_message(channel.id, "same").await.unwrap();

    wait_until_sync(|| {
        owner
            .channel_view(channel.id)
            .map(|view| {
                view.len() == 2
                    && view
                        .iter()
                        .all(|e| matches!(e, StreamEntry::Confirmed(_)))
            })
            .unwrap_or(false)
    })
    .await;
}

#[tokio::test]
async fn test_reply_references_survive_the_feed() {
    let app = TestApp::new().await;
    let channel = make_channel(&app, "general").await;
    let owner = app.owner_session().await;
    owner.open_channel(channel.id).await.unwrap();

    owner.send_message(channel.id, "root").await.unwrap();
    wait_until_sync(|| {
        owner
            .channel_view(channel.id)
            .map(|v| v.len() == 1)
            .unwrap_or(false)
    })
    .await;
    let root_id = match &owner.channel_view(channel.id).unwrap()[0] {
        StreamEntry::Confirmed(m) => m.id,
        _ => panic!("expected confirmed message"),
    };

    owner
        .send_reply(channel.id, "child", root_id)
        .await
        .unwrap();
    wait_until_sync(|| {
        owner
            .channel_view(channel.id)
            .map(|view| {
                matches!(
                    view.last(),
                    Some(StreamEntry::Confirmed(m)) if m.reply_to == Some(root_id)
                ) && view.len() == 2
            })
            .unwrap_or(false)
    })
    .await;
}

#[tokio::test]
async fn test_message_too_long_is_rejected_synchronously() {
    let mut settings = guild_core::config::Settings::default();
    settings.message.max_content_length = 10;
    let app = TestApp::with_settings(settings).await;
    let channel = make_channel(&app, "general").await;
    let owner = app.owner_session().await;
    owner.open_channel(channel.id).await.unwrap();

    assert!(matches!(
        owner.send_message(channel.id, "this is far too long").await,
        Err(CoreError::Validation(_))
    ));
    owner.send_message(channel.id, "short").await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(owner.channel_view(channel.id).unwrap().len(), 1);
}
