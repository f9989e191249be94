//! Directory ordering scenarios: append-only positions, total order on
//! read, and category deletion without cascade.

use pretty_assertions::assert_eq;

use guild_core::application::services::CreateChannelPayload;
use guild_core::domain::entities::ChannelType;
use guild_core::shared::error::CoreError;

use crate::common::{wait_until_sync, TestApp, ALICE, OWNER};

fn text_channel(name: &str, category_id: Option<i64>) -> CreateChannelPayload {
    CreateChannelPayload {
        name: name.into(),
        kind: ChannelType::Text,
        category_id,
        topic: None,
    }
}

#[tokio::test]
async fn test_positions_append_and_are_never_reused() {
    let app = TestApp::new().await;
    let session = app.session(OWNER);
    let directory = session.directory_manager();

    let first = directory
        .create_category(app.server.id, OWNER, "First".into())
        .await
        .unwrap();
    let second = directory
        .create_category(app.server.id, OWNER, "Second".into())
        .await
        .unwrap();
    assert_eq!(first.position, 0);
    assert_eq!(second.position, 1);

    directory.delete_category(second.id, OWNER).await.unwrap();
    let third = directory
        .create_category(app.server.id, OWNER, "Third".into())
        .await
        .unwrap();
    // Deletion left a hole; the sequence stays monotonic.
    assert_eq!(third.position, 1);

    let fourth = directory
        .create_category(app.server.id, OWNER, "Fourth".into())
        .await
        .unwrap();
    assert_eq!(fourth.position, 2);
}

#[tokio::test]
async fn test_uncategorized_sorts_after_categorized() {
    let app = TestApp::new().await;
    let session = app.session(OWNER);
    let directory = session.directory_manager();

    let voice = directory
        .create_category(app.server.id, OWNER, "Voice".into())
        .await
        .unwrap();
    // "general" has no category and position 0, lower than anything in
    // the category; it still displays last.
    let general = directory
        .create_channel(app.server.id, OWNER, text_channel("general", None))
        .await
        .unwrap();
    assert_eq!(general.position, 0);
    let lobby = directory
        .create_channel(app.server.id, OWNER, text_channel("lobby", Some(voice.id)))
        .await
        .unwrap();

    session.attach(app.server.id).await.unwrap();
    let tree = session.directory_tree().unwrap();
    let order: Vec<i64> = tree.flattened().iter().map(|c| c.id).collect();
    assert_eq!(order, vec![lobby.id, general.id]);
}

#[tokio::test]
async fn test_total_order_after_interleaved_reorders() {
    let app = TestApp::new().await;
    let session = app.session(OWNER);
    let directory = session.directory_manager();

    let cat = directory
        .create_category(app.server.id, OWNER, "Chat".into())
        .await
        .unwrap();
    let a = directory
        .create_channel(app.server.id, OWNER, text_channel("a", Some(cat.id)))
        .await
        .unwrap();
    let b = directory
        .create_channel(app.server.id, OWNER, text_channel("b", Some(cat.id)))
        .await
        .unwrap();
    let c = directory
        .create_channel(app.server.id, OWNER, text_channel("c", Some(cat.id)))
        .await
        .unwrap();

    // Two actors fight over positions; last writer wins and ties are
    // broken deterministically by id.
    directory.reorder_channel(a.id, OWNER, 5).await.unwrap();
    directory.reorder_channel(b.id, OWNER, 5).await.unwrap();
    directory.reorder_channel(c.id, OWNER, 1).await.unwrap();

    session.attach(app.server.id).await.unwrap();
    let tree = session.directory_tree().unwrap();
    let order: Vec<i64> = tree.flattened().iter().map(|ch| ch.id).collect();
    assert_eq!(order, vec![c.id, a.id, b.id]);

    // Strict total order: no two displayed neighbours compare equal.
    let keys: Vec<(i32, i64)> = tree
        .flattened()
        .iter()
        .map(|ch| (ch.position, ch.id))
        .collect();
    for pair in keys.windows(2) {
        assert!(pair[0] < pair[1]);
    }
}

#[tokio::test]
async fn test_category_delete_reparents_channels() {
    let app = TestApp::new().await;
    let session = app.session(OWNER);
    let directory = session.directory_manager();

    let cat = directory
        .create_category(app.server.id, OWNER, "Temp".into())
        .await
        .unwrap();
    let kept = directory
        .create_channel(app.server.id, OWNER, text_channel("kept", Some(cat.id)))
        .await
        .unwrap();

    session.attach(app.server.id).await.unwrap();
    directory.delete_category(cat.id, OWNER).await.unwrap();

    // The live replica converges through the feed alone.
    wait_until_sync(|| {
        session
            .directory_tree()
            .map(|tree| {
                tree.categories.is_empty()
                    && tree.uncategorized.iter().any(|ch| ch.id == kept.id)
            })
            .unwrap_or(false)
    })
    .await;
}

#[tokio::test]
async fn test_channel_mutations_require_manage_channels() {
    let app = TestApp::new().await;
    let owner = app.session(OWNER);
    owner.membership().join(app.server.id, ALICE).await.unwrap();

    let err = owner
        .directory_manager()
        .create_channel(app.server.id, ALICE, text_channel("nope", None))
        .await
        .unwrap_err();
    assert_eq!(err, CoreError::PermissionDenied);

    let channel = owner
        .directory_manager()
        .create_channel(app.server.id, OWNER, text_channel("ok", None))
        .await
        .unwrap();
    assert_eq!(
        owner
            .directory_manager()
            .reorder_channel(channel.id, ALICE, 3)
            .await
            .unwrap_err(),
        CoreError::PermissionDenied
    );
}

#[tokio::test]
async fn test_move_channel_appends_in_target_scope() {
    let app = TestApp::new().await;
    let session = app.session(OWNER);
    let directory = session.directory_manager();

    let cat = directory
        .create_category(app.server.id, OWNER, "Dest".into())
        .await
        .unwrap();
    directory
        .create_channel(app.server.id, OWNER, text_channel("existing", Some(cat.id)))
        .await
        .unwrap();
    let moved = directory
        .create_channel(app.server.id, OWNER, text_channel("mover", None))
        .await
        .unwrap();

    let moved = directory
        .move_channel(moved.id, OWNER, Some(cat.id))
        .await
        .unwrap();
    assert_eq!(moved.category_id, Some(cat.id));
    assert_eq!(moved.position, 1);
}
