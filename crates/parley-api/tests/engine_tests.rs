use std::sync::Arc;

use uuid::Uuid;

use parley_api::chats;
use parley_api::engine;
use parley_api::error::ApiError;
use parley_api::pins;
use parley_db::Database;
use parley_db::models::ReactionToggle;
use parley_types::api::{SendMessageRequest, StarStatus};
use parley_types::models::Reaction;

struct Fixture {
    db: Database,
    alice: Uuid,
    bob: Uuid,
    carol: Uuid,
    /// Direct chat between alice and bob.
    chat: Uuid,
}

fn user(db: &Database, name: &str) -> Uuid {
    let id = Uuid::new_v4();
    db.create_user(
        &id.to_string(),
        name,
        &format!("{}@example.com", name.to_lowercase()),
        "not-a-real-hash",
        "https://example.com/pic.png",
    )
    .unwrap();
    id
}

fn fixture() -> Fixture {
    let db = Database::open_in_memory().unwrap();
    let alice = user(&db, "Alice");
    let bob = user(&db, "Bob");
    let carol = user(&db, "Carol");
    let chat = chats::access_chat(&db, alice, bob).unwrap().id;
    Fixture { db, alice, bob, carol, chat }
}

fn send(f: &Fixture, sender: Uuid, content: &str) -> Uuid {
    engine::send_message(
        &f.db,
        sender,
        SendMessageRequest {
            chat_id: Some(f.chat),
            content: Some(content.to_string()),
            reply_to_id: None,
        },
    )
    .unwrap()
    .id
}

#[test]
fn send_returns_projection_and_updates_latest() {
    let f = fixture();

    let msg = engine::send_message(
        &f.db,
        f.alice,
        SendMessageRequest {
            chat_id: Some(f.chat),
            content: Some("hello".into()),
            reply_to_id: None,
        },
    )
    .unwrap();

    assert_eq!(msg.content, "hello");
    assert_eq!(msg.sender.id, f.alice);
    assert_eq!(msg.sender.name, "Alice");
    assert_eq!(msg.chat.id, f.chat);
    assert_eq!(msg.chat.users.len(), 2);
    assert!(msg.chat.users.iter().any(|u| u.email == "bob@example.com"));
    assert!(msg.reply_to.is_none());
    assert!(msg.reactions.is_empty());
    assert!(msg.starred_by.is_empty());

    let chat = chats::fetch_chats(&f.db, f.bob).unwrap().remove(0);
    let latest = chat.latest_message.expect("latest message set");
    assert_eq!(latest.id, msg.id);
    assert_eq!(latest.content, "hello");
}

#[test]
fn send_rejects_missing_fields() {
    let f = fixture();

    let no_content = engine::send_message(
        &f.db,
        f.alice,
        SendMessageRequest {
            chat_id: Some(f.chat),
            content: Some("   ".into()),
            reply_to_id: None,
        },
    );
    assert!(matches!(no_content, Err(ApiError::Validation(_))));

    let no_chat = engine::send_message(
        &f.db,
        f.alice,
        SendMessageRequest {
            content: Some("hi".into()),
            ..Default::default()
        },
    );
    assert!(matches!(no_chat, Err(ApiError::Validation(_))));

    let unknown_chat = engine::send_message(
        &f.db,
        f.alice,
        SendMessageRequest {
            chat_id: Some(Uuid::new_v4()),
            content: Some("hi".into()),
            reply_to_id: None,
        },
    );
    assert!(matches!(unknown_chat, Err(ApiError::NotFound("Chat"))));

    let outsider = engine::send_message(
        &f.db,
        f.carol,
        SendMessageRequest {
            chat_id: Some(f.chat),
            content: Some("hi".into()),
            reply_to_id: None,
        },
    );
    assert!(matches!(outsider, Err(ApiError::Forbidden(_))));
}

#[test]
fn replies_carry_a_shallow_preview() {
    let f = fixture();
    let first = send(&f, f.alice, "original");

    let reply = engine::send_message(
        &f.db,
        f.bob,
        SendMessageRequest {
            chat_id: Some(f.chat),
            content: Some("answer".into()),
            reply_to_id: Some(first),
        },
    )
    .unwrap();

    let preview = reply.reply_to.expect("reply preview");
    assert_eq!(preview.id, first);
    assert_eq!(preview.content, "original");
    assert_eq!(preview.sender_name, "Alice");

    // Replies must stay inside their chat.
    let other_chat = chats::access_chat(&f.db, f.alice, f.carol).unwrap().id;
    let cross = engine::send_message(
        &f.db,
        f.alice,
        SendMessageRequest {
            chat_id: Some(other_chat),
            content: Some("nope".into()),
            reply_to_id: Some(first),
        },
    );
    assert!(matches!(cross, Err(ApiError::Validation(_))));
}

#[test]
fn list_is_ordered_and_requires_membership() {
    let f = fixture();
    let a = send(&f, f.alice, "one");
    let b = send(&f, f.bob, "two");
    let c = send(&f, f.alice, "three");

    let listed: Vec<Uuid> = engine::list_messages(&f.db, f.chat, f.bob)
        .unwrap()
        .into_iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(listed, vec![a, b, c]);

    assert!(matches!(
        engine::list_messages(&f.db, f.chat, f.carol),
        Err(ApiError::Forbidden(_))
    ));
    assert!(matches!(
        engine::list_messages(&f.db, Uuid::new_v4(), f.alice),
        Err(ApiError::NotFound(_))
    ));
}

#[test]
fn reacting_twice_with_same_emoji_restores_reactions() {
    let f = fixture();
    let msg = send(&f, f.alice, "hello");

    let (outcome, view) = engine::react_to_message(&f.db, msg, f.bob, "👍").unwrap();
    assert_eq!(outcome, ReactionToggle::Added);
    assert_eq!(view.reactions, vec![Reaction { user_id: f.bob, emoji: "👍".into() }]);
    assert_eq!(view.chat.id, f.chat);

    let (outcome, view) = engine::react_to_message(&f.db, msg, f.bob, "👍").unwrap();
    assert_eq!(outcome, ReactionToggle::Removed);
    assert!(view.reactions.is_empty());
}

#[test]
fn switching_emoji_leaves_one_entry_in_place() {
    let f = fixture();
    let msg = send(&f, f.alice, "hello");

    engine::react_to_message(&f.db, msg, f.alice, "🎉").unwrap();
    engine::react_to_message(&f.db, msg, f.bob, "😀").unwrap();
    let (outcome, view) = engine::react_to_message(&f.db, msg, f.alice, "🔥").unwrap();

    assert_eq!(outcome, ReactionToggle::Switched);
    assert_eq!(
        view.reactions,
        vec![
            Reaction { user_id: f.alice, emoji: "🔥".into() },
            Reaction { user_id: f.bob, emoji: "😀".into() },
        ]
    );
    assert_eq!(view.reaction_by(f.alice), Some("🔥"));
}

#[test]
fn react_and_star_check_existence_and_membership() {
    let f = fixture();
    let msg = send(&f, f.alice, "hello");

    assert!(matches!(
        engine::react_to_message(&f.db, Uuid::new_v4(), f.bob, "👍"),
        Err(ApiError::NotFound("Message"))
    ));
    assert!(matches!(
        engine::react_to_message(&f.db, msg, f.bob, " "),
        Err(ApiError::Validation(_))
    ));
    assert!(matches!(
        engine::react_to_message(&f.db, msg, f.carol, "👍"),
        Err(ApiError::Forbidden(_))
    ));
    assert!(matches!(
        engine::star_message(&f.db, Uuid::new_v4(), f.bob),
        Err(ApiError::NotFound("Message"))
    ));
    assert!(matches!(
        engine::star_message(&f.db, msg, f.carol),
        Err(ApiError::Forbidden(_))
    ));
}

#[test]
fn star_toggles_without_duplicates() {
    let f = fixture();
    let msg = send(&f, f.alice, "hello");

    let (status, view) = engine::star_message(&f.db, msg, f.bob).unwrap();
    assert_eq!(status, StarStatus::Starred);
    assert_eq!(view.starred_by, vec![f.bob]);

    let (_, view) = engine::star_message(&f.db, msg, f.alice).unwrap();
    assert_eq!(view.starred_by, vec![f.bob, f.alice]);

    let (status, view) = engine::star_message(&f.db, msg, f.bob).unwrap();
    assert_eq!(status, StarStatus::Unstarred);
    assert_eq!(view.starred_by, vec![f.alice]);

    for _ in 0..5 {
        engine::star_message(&f.db, msg, f.bob).unwrap();
    }
    let (_, view) = engine::star_message(&f.db, msg, f.bob).unwrap();
    assert_eq!(view.starred_by, vec![f.alice]);
    assert!(!view.is_starred_by(f.bob));
}

#[test]
fn edit_and_delete_are_sender_only() {
    let f = fixture();
    let msg = send(&f, f.alice, "hello");

    assert!(matches!(
        engine::edit_message(&f.db, msg, f.bob, "hijacked"),
        Err(ApiError::Forbidden(_))
    ));
    // Authorization is decided before content is looked at.
    assert!(matches!(
        engine::edit_message(&f.db, msg, f.bob, ""),
        Err(ApiError::Forbidden(_))
    ));
    assert!(matches!(
        engine::delete_message(&f.db, msg, f.carol),
        Err(ApiError::Forbidden(_))
    ));

    let listed = engine::list_messages(&f.db, f.chat, f.alice).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].content, "hello");

    assert!(matches!(
        engine::edit_message(&f.db, Uuid::new_v4(), f.alice, "x"),
        Err(ApiError::NotFound("Message"))
    ));
    assert!(matches!(
        engine::delete_message(&f.db, Uuid::new_v4(), f.alice),
        Err(ApiError::NotFound("Message"))
    ));
}

#[test]
fn forbidden_messages_do_not_name_the_owner() {
    let f = fixture();
    let msg = send(&f, f.alice, "hello");

    let err = engine::delete_message(&f.db, msg, f.carol).unwrap_err();
    let text = err.to_string();
    assert!(!text.contains("Alice"));
    assert!(!text.contains(&f.alice.to_string()));
    assert_eq!(err.kind(), "forbidden");
}

#[test]
fn edit_is_visible_in_latest_preview() {
    let f = fixture();
    let msg = send(&f, f.alice, "helo");

    let edited = engine::edit_message(&f.db, msg, f.alice, "hello").unwrap();
    assert_eq!(edited.content, "hello");
    assert_eq!(edited.chat.latest_message.map(|m| m.content).as_deref(), Some("hello"));

    assert!(matches!(
        engine::edit_message(&f.db, msg, f.alice, "  "),
        Err(ApiError::Validation(_))
    ));
}

#[test]
fn delete_recomputes_latest_message() {
    let f = fixture();
    let first = send(&f, f.alice, "first");
    let second = send(&f, f.bob, "second");

    let deleted = engine::delete_message(&f.db, second, f.bob).unwrap();
    assert_eq!(deleted.id, second);
    assert_eq!(deleted.chat_id, f.chat);
    assert_eq!(deleted.latest_message.as_ref().map(|m| m.id), Some(first));

    let deleted = engine::delete_message(&f.db, first, f.alice).unwrap();
    assert!(deleted.latest_message.is_none());

    let chat = chats::fetch_chats(&f.db, f.alice).unwrap().remove(0);
    assert!(chat.latest_message.is_none());
    assert!(engine::list_messages(&f.db, f.chat, f.alice).unwrap().is_empty());

    // No resurrection.
    assert!(matches!(
        engine::edit_message(&f.db, first, f.alice, "back"),
        Err(ApiError::NotFound(_))
    ));
}

#[test]
fn pin_toggle_twice_restores_order() {
    let f = fixture();
    let a = send(&f, f.alice, "a");
    let b = send(&f, f.bob, "b");
    let c = send(&f, f.alice, "c");

    pins::toggle_pin(&f.db, f.chat, a, f.alice).unwrap();
    pins::toggle_pin(&f.db, f.chat, b, f.bob).unwrap();
    let (pinned, chat) = pins::toggle_pin(&f.db, f.chat, c, f.alice).unwrap();
    assert!(pinned);
    let before: Vec<Uuid> = chat.pinned_messages.iter().map(|m| m.id).collect();
    assert_eq!(before, vec![a, b, c]);

    let (pinned, chat) = pins::toggle_pin(&f.db, f.chat, b, f.alice).unwrap();
    assert!(!pinned);
    assert!(!chat.is_pinned(b));

    let (_, chat) = pins::toggle_pin(&f.db, f.chat, b, f.alice).unwrap();
    let after: Vec<Uuid> = chat.pinned_messages.iter().map(|m| m.id).collect();
    assert_eq!(after, vec![a, c, b]);

    // A toggle pair on a fresh message leaves the list untouched.
    let d = send(&f, f.bob, "d");
    pins::toggle_pin(&f.db, f.chat, d, f.bob).unwrap();
    let (_, chat) = pins::toggle_pin(&f.db, f.chat, d, f.bob).unwrap();
    let restored: Vec<Uuid> = chat.pinned_messages.iter().map(|m| m.id).collect();
    assert_eq!(restored, after);
}

#[test]
fn pin_scenario_returns_full_chat() {
    let f = fixture();
    let msg = send(&f, f.alice, "hello");

    let (_, chat) = pins::toggle_pin(&f.db, f.chat, msg, f.alice).unwrap();
    assert_eq!(chat.users.len(), 2);
    assert_eq!(chat.pinned_messages.len(), 1);
    assert_eq!(chat.pinned_messages[0].content, "hello");
    assert_eq!(chat.pinned_messages[0].sender.name, "Alice");

    let (_, chat) = pins::toggle_pin(&f.db, f.chat, msg, f.alice).unwrap();
    assert!(chat.pinned_messages.is_empty());
}

#[test]
fn pin_checks_chat_membership_and_ownership() {
    let f = fixture();
    let msg = send(&f, f.alice, "hello");

    assert!(matches!(
        pins::toggle_pin(&f.db, Uuid::new_v4(), msg, f.alice),
        Err(ApiError::NotFound("Chat"))
    ));
    assert!(matches!(
        pins::toggle_pin(&f.db, f.chat, msg, f.carol),
        Err(ApiError::Forbidden(_))
    ));
    assert!(matches!(
        pins::toggle_pin(&f.db, f.chat, Uuid::new_v4(), f.alice),
        Err(ApiError::NotFound("Message"))
    ));

    let other_chat = chats::access_chat(&f.db, f.alice, f.carol).unwrap().id;
    assert!(matches!(
        pins::toggle_pin(&f.db, other_chat, msg, f.alice),
        Err(ApiError::Validation(_))
    ));
}

#[test]
fn deleting_a_pinned_message_unpins_it() {
    let f = fixture();
    let msg = send(&f, f.alice, "hello");
    pins::toggle_pin(&f.db, f.chat, msg, f.bob).unwrap();

    engine::delete_message(&f.db, msg, f.alice).unwrap();

    let chat = chats::fetch_chats(&f.db, f.bob).unwrap().remove(0);
    assert!(chat.pinned_messages.is_empty());
}

#[test]
fn concurrent_reactions_are_not_lost() {
    let f = fixture();
    let group = chats::create_group_chat(&f.db, f.alice, "Crowd", &[f.bob, f.carol]).unwrap();
    let msg = engine::send_message(
        &f.db,
        f.alice,
        SendMessageRequest {
            chat_id: Some(group.id),
            content: Some("react to me".into()),
            reply_to_id: None,
        },
    )
    .unwrap()
    .id;

    let mut reactors = Vec::new();
    for i in 0..16 {
        let id = user(&f.db, &format!("Reactor{}", i));
        chats::add_to_group(&f.db, group.id, f.alice, id).unwrap();
        reactors.push(id);
    }

    let db = Arc::new(f.db);
    let handles: Vec<_> = reactors
        .iter()
        .map(|&id| {
            let db = db.clone();
            std::thread::spawn(move || {
                engine::react_to_message(&db, msg, id, "👍").unwrap();
                engine::star_message(&db, msg, id).unwrap();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let view = parley_api::projection::load_message(&db, &msg.to_string())
        .unwrap()
        .unwrap();
    assert_eq!(view.reactions.len(), reactors.len());
    assert_eq!(view.starred_by.len(), reactors.len());
}

#[test]
fn direct_chat_is_reused() {
    let f = fixture();
    let again = chats::access_chat(&f.db, f.bob, f.alice).unwrap();
    assert_eq!(again.id, f.chat);
    assert!(!again.is_group_chat);

    assert!(matches!(
        chats::access_chat(&f.db, f.alice, f.alice),
        Err(ApiError::Validation(_))
    ));
    assert!(matches!(
        chats::access_chat(&f.db, f.alice, Uuid::new_v4()),
        Err(ApiError::NotFound("User"))
    ));
}

#[test]
fn group_management_is_admin_only() {
    let f = fixture();
    let dave = user(&f.db, "Dave");

    assert!(matches!(
        chats::create_group_chat(&f.db, f.alice, "Pair", &[f.bob]),
        Err(ApiError::Validation(_))
    ));

    let group = chats::create_group_chat(&f.db, f.alice, "  Team  ", &[f.bob, f.carol, f.bob]).unwrap();
    assert!(group.is_group_chat);
    assert_eq!(group.chat_name.as_deref(), Some("Team"));
    assert_eq!(group.group_admin, Some(f.alice));
    assert_eq!(group.users.len(), 3);

    assert!(matches!(
        chats::rename_group(&f.db, group.id, f.bob, "Mine"),
        Err(ApiError::Forbidden(_))
    ));
    let renamed = chats::rename_group(&f.db, group.id, f.alice, "Core").unwrap();
    assert_eq!(renamed.chat_name.as_deref(), Some("Core"));

    assert!(matches!(
        chats::add_to_group(&f.db, group.id, f.bob, dave),
        Err(ApiError::Forbidden(_))
    ));
    let grown = chats::add_to_group(&f.db, group.id, f.alice, dave).unwrap();
    assert_eq!(grown.users.len(), 4);

    assert!(matches!(
        chats::remove_from_group(&f.db, group.id, f.bob, dave),
        Err(ApiError::Forbidden(_))
    ));
    let left = chats::remove_from_group(&f.db, group.id, f.carol, f.carol).unwrap();
    assert!(!left.has_member(f.carol));

    assert!(matches!(
        chats::rename_group(&f.db, f.chat, f.alice, "Direct"),
        Err(ApiError::Validation(_))
    ));
}

#[test]
fn chats_are_ordered_by_activity() {
    let f = fixture();
    let second = chats::access_chat(&f.db, f.alice, f.carol).unwrap().id;

    // Touch the first chat last.
    engine::send_message(
        &f.db,
        f.alice,
        SendMessageRequest {
            chat_id: Some(second),
            content: Some("hey carol".into()),
            reply_to_id: None,
        },
    )
    .unwrap();
    std::thread::sleep(std::time::Duration::from_millis(5));
    send(&f, f.bob, "hey alice");

    let order: Vec<Uuid> = chats::fetch_chats(&f.db, f.alice).unwrap().iter().map(|c| c.id).collect();
    assert_eq!(order, vec![f.chat, second]);
}
