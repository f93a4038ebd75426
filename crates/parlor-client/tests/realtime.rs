//! Socket behaviour against a live loopback backend.

mod support;

use std::sync::Arc;

use parlor_client::{ChatClient, NullNavigator};
use parlor_types::ConnectionState;

use support::{FakeBackend, new_message, within};

async fn wait_for(chat: &ChatClient, state: ConnectionState) {
    let mut rx = chat.subscribe_state();
    within(rx.wait_for(|s| *s == state)).await.unwrap();
}

#[tokio::test]
async fn queued_actions_flush_in_order_on_open() {
    let mut backend = FakeBackend::start().await;
    let chat = backend.chat(backend.session(Arc::new(NullNavigator)));

    chat.join_room("r1");
    chat.send_message("r1", "hello");
    assert_eq!(chat.pending_actions(), 2);

    chat.connect();
    wait_for(&chat, ConnectionState::Open).await;

    let first = backend.next_action().await;
    let second = backend.next_action().await;
    assert_eq!(first["action_type"], "join_room");
    assert_eq!(first["chatroom_id"], "r1");
    assert_eq!(second["action_type"], "send_message");
    assert_eq!(second["content"], "hello");
    assert_eq!(chat.pending_actions(), 0);
}

#[tokio::test]
async fn open_socket_sends_immediately() {
    let mut backend = FakeBackend::start().await;
    let chat = backend.chat(backend.session(Arc::new(NullNavigator)));
    chat.connect();
    wait_for(&chat, ConnectionState::Open).await;

    chat.get_messages("r1", 20, Some("2024-01-01T10:00:00Z"));
    chat.mark_room_read("r1");

    let page = backend.next_action().await;
    assert_eq!(page["action_type"], "get_message");
    assert_eq!(page["limit"], 20);
    assert_eq!(page["before_created_at"], "2024-01-01T10:00:00Z");
    assert_eq!(backend.next_action().await["action_type"], "mark_room_read");
}

#[tokio::test]
async fn connect_is_idempotent_while_connected() {
    let backend = FakeBackend::start().await;
    let chat = backend.chat(backend.session(Arc::new(NullNavigator)));

    chat.connect();
    chat.connect();
    wait_for(&chat, ConnectionState::Open).await;
    chat.connect();

    assert_eq!(chat.connection_state(), ConnectionState::Open);
}

#[tokio::test]
async fn live_messages_reach_room_subscribers() {
    let backend = FakeBackend::start().await;
    let chat = backend.chat(backend.session(Arc::new(NullNavigator)));
    let mut everything = chat.subscribe_new_messages();
    let mut room = chat.subscribe_room("r1");

    chat.connect();
    wait_for(&chat, ConnectionState::Open).await;
    backend.push(new_message("m1", "r2", "elsewhere"));
    backend.push(new_message("m2", "r1", "here"));

    let got = within(room.recv()).await.unwrap();
    assert_eq!(got.id, "m2");
    assert_eq!(got.author_label(), "bob");

    assert_eq!(within(everything.recv()).await.unwrap().id, "m1");
    assert_eq!(within(everything.recv()).await.unwrap().id, "m2");
}

#[tokio::test]
async fn history_pages_are_published() {
    let backend = FakeBackend::start().await;
    let chat = backend.chat(backend.session(Arc::new(NullNavigator)));
    let mut pages = chat.subscribe_history();

    chat.connect();
    wait_for(&chat, ConnectionState::Open).await;
    backend.push(
        r#"{"type":"message_list","chatroom_id":"r1","messages":[
            {"id":"3","author_id":"2","content":"c","created_at":"2024-01-01 10:03:00"},
            {"id":"2","author_id":"2","content":"b","created_at":"2024-01-01 10:02:00"}
        ]}"#,
    );

    let page = within(pages.recv()).await.unwrap();
    assert_eq!(page.chatroom_id, "r1");
    let ids: Vec<_> = page.messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, ["3", "2"]);
}

#[tokio::test]
async fn malformed_frame_is_dropped_and_socket_stays_open() {
    let backend = FakeBackend::start().await;
    let chat = backend.chat(backend.session(Arc::new(NullNavigator)));
    let mut room = chat.subscribe_room("r1");

    chat.connect();
    wait_for(&chat, ConnectionState::Open).await;
    backend.push("{not json");
    backend.push(r#"{"type":"typing","chatroom_id":"r1"}"#);
    backend.push(new_message("m1", "r1", "still here"));

    assert_eq!(within(room.recv()).await.unwrap().id, "m1");
    assert_eq!(chat.connection_state(), ConnectionState::Open);
}

#[tokio::test]
async fn disconnect_says_goodbye_and_later_actions_queue() {
    let mut backend = FakeBackend::start().await;
    let chat = backend.chat(backend.session(Arc::new(NullNavigator)));
    chat.connect();
    wait_for(&chat, ConnectionState::Open).await;

    chat.disconnect();
    assert_eq!(chat.connection_state(), ConnectionState::Closed);
    assert_eq!(backend.next_action().await["action_type"], "disconnect");

    chat.send_message("r1", "later");
    assert_eq!(chat.pending_actions(), 1);
}

#[tokio::test]
async fn shutdown_flushes_last_actions() {
    let mut backend = FakeBackend::start().await;
    let chat = backend.chat(backend.session(Arc::new(NullNavigator)));
    chat.connect();
    wait_for(&chat, ConnectionState::Open).await;

    chat.leave_room("r1");
    within(chat.shutdown()).await;

    assert_eq!(backend.next_action().await["action_type"], "leave_room");
    assert_eq!(backend.next_action().await["action_type"], "disconnect");
}

#[tokio::test]
async fn server_close_then_reconnect_flushes_queue() {
    let mut backend = FakeBackend::start().await;
    let chat = backend.chat(backend.session(Arc::new(NullNavigator)));
    chat.connect();
    wait_for(&chat, ConnectionState::Open).await;

    backend.close_socket();
    wait_for(&chat, ConnectionState::Closed).await;

    chat.join_room("r9");
    assert_eq!(chat.pending_actions(), 1);

    chat.connect();
    wait_for(&chat, ConnectionState::Open).await;
    assert_eq!(backend.next_action().await["chatroom_id"], "r9");
}

#[tokio::test]
async fn unreachable_backend_ends_closed_with_queue_intact() {
    let backend = FakeBackend::start().await;
    let mut origin = backend.origin.clone();
    // Nothing listens on port 1.
    origin.set_port(Some(1)).unwrap();
    let session = backend.session(Arc::new(NullNavigator));
    let chat = ChatClient::for_origin(&origin, session).unwrap();

    chat.join_room("r1");
    chat.connect();
    let mut state = chat.subscribe_state();
    assert_eq!(*state.borrow(), ConnectionState::Connecting);
    within(state.wait_for(|s| *s == ConnectionState::Closed)).await.unwrap();

    assert_eq!(chat.pending_actions(), 1);
}
