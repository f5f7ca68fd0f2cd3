//! End-to-end relay scenarios, driven through the same per-connection
//! coordinators the WebSocket pump uses, with in-process outboxes standing
//! in for sockets.

use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver};

use chapter_collab::client::{ClientCore, ClientPhase, EditBuffer, PlainTextBuffer};
use chapter_collab::models::{Change, ClientMessage, ServerMessage};
use chapter_collab::store::{MemoryStore, NullStore};
use chapter_collab::ws::{CollabHub, Coordinator, SessionKey};

struct TestConn {
    coordinator: Coordinator,
    rx: UnboundedReceiver<ServerMessage>,
}

impl TestConn {
    fn new(hub: &Arc<CollabHub>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            coordinator: Coordinator::new(hub.clone(), tx),
            rx,
        }
    }

    async fn connect(hub: &Arc<CollabHub>, participant_id: &str, book: &str) -> Self {
        let mut conn = Self::new(hub);
        conn.send(&format!(
            r#"{{"type":"auth","participantId":"{participant_id}"}}"#
        ))
        .await;
        conn.send(&format!(
            r#"{{"type":"join","bookId":"{book}","chapterId":"1"}}"#
        ))
        .await;
        conn
    }

    async fn send(&mut self, raw: &str) {
        self.coordinator.handle_text(raw).await;
    }

    fn drain(&mut self) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            messages.push(message);
        }
        messages
    }
}

fn hub() -> Arc<CollabHub> {
    Arc::new(CollabHub::new(64, Arc::new(NullStore)))
}

fn insert_json(participant: &str, position: u64, content: &str) -> String {
    format!(
        r#"{{"type":"change","participantId":"{participant}","bookId":"10","chapterId":"1","changeType":"insert","position":{position},"content":"{content}"}}"#
    )
}

fn changes_of(messages: Vec<ServerMessage>) -> Vec<Change> {
    messages
        .into_iter()
        .filter_map(|m| match m {
            ServerMessage::Change(c) => Some(c),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn change_reaches_peers_but_never_the_sender() {
    let hub = hub();
    let mut a = TestConn::connect(&hub, "1", "10").await;
    let mut b = TestConn::connect(&hub, "2", "10").await;
    a.drain();
    b.drain();

    a.send(&insert_json("1", 5, "hello")).await;

    let received = changes_of(b.drain());
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].participant_id, "1");
    assert_eq!(received[0].position, Some(5));
    assert_eq!(received[0].content.as_deref(), Some("hello"));
    assert!(received[0].timestamp.is_some(), "relay must stamp changes");

    assert!(changes_of(a.drain()).is_empty(), "no echo to the sender");
}

#[tokio::test]
async fn changes_are_delivered_in_submission_order() {
    let hub = hub();
    let mut a = TestConn::connect(&hub, "1", "10").await;
    let mut b = TestConn::connect(&hub, "2", "10").await;
    let mut c = TestConn::connect(&hub, "3", "10").await;
    b.drain();
    c.drain();

    for i in 0..5 {
        a.send(&insert_json("1", i, &format!("c{i}"))).await;
    }

    for receiver in [&mut b, &mut c] {
        let contents: Vec<_> = changes_of(receiver.drain())
            .into_iter()
            .map(|c| c.content.unwrap())
            .collect();
        assert_eq!(contents, vec!["c0", "c1", "c2", "c3", "c4"]);
    }
}

#[tokio::test]
async fn late_joiner_receives_buffered_history_in_order() {
    let hub = hub();
    let mut a = TestConn::connect(&hub, "1", "10").await;
    a.send(&insert_json("1", 0, "first")).await;
    a.send(&insert_json("1", 5, "second")).await;

    let mut c = TestConn::connect(&hub, "3", "10").await;
    let replay = c
        .drain()
        .into_iter()
        .find_map(|m| match m {
            ServerMessage::RecentChanges { changes } => Some(changes),
            _ => None,
        })
        .expect("late joiner gets recent-changes");

    assert_eq!(replay.len(), 2);
    assert_eq!(replay[0].content.as_deref(), Some("first"));
    assert_eq!(replay[1].content.as_deref(), Some("second"));
}

#[tokio::test]
async fn presence_tracks_joins_and_leaves() {
    let hub = hub();
    let key = SessionKey::new("10", Some("1".into()));

    let mut a = TestConn::connect(&hub, "1", "10").await;
    let _b = TestConn::connect(&hub, "2", "10").await;
    let _c = TestConn::connect(&hub, "3", "10").await;
    assert_eq!(
        hub.participants_of(&key),
        vec!["1".to_string(), "2".to_string(), "3".to_string()]
    );

    a.send(r#"{"type":"leave","participantId":"1","bookId":"10"}"#)
        .await;
    assert_eq!(
        hub.participants_of(&key),
        vec!["2".to_string(), "3".to_string()]
    );
}

#[tokio::test]
async fn transport_close_is_an_implicit_leave_with_one_user_left() {
    let hub = hub();
    let key = SessionKey::new("10", Some("1".into()));
    let mut a = TestConn::connect(&hub, "1", "10").await;
    let mut b = TestConn::connect(&hub, "2", "10").await;
    b.drain();

    // What the socket pump does on close/error.
    a.coordinator.disconnect();

    let user_lefts: Vec<_> = b
        .drain()
        .into_iter()
        .filter(|m| matches!(m, ServerMessage::UserLeft { participant_id } if participant_id == "1"))
        .collect();
    assert_eq!(user_lefts.len(), 1);
    assert_eq!(hub.participants_of(&key), vec!["2".to_string()]);
}

#[tokio::test]
async fn cursor_updates_supersede_each_other() {
    let hub = hub();
    let key = SessionKey::new("10", Some("1".into()));
    let mut a = TestConn::connect(&hub, "1", "10").await;

    a.send(r#"{"type":"cursor-move","participantId":"1","position":3}"#)
        .await;
    a.send(r#"{"type":"cursor-move","participantId":"1","position":9}"#)
        .await;

    let session = hub.session(&key).unwrap();
    assert_eq!(session.cursor_of("1").unwrap().position, 9);
}

#[tokio::test]
async fn chat_is_relayed_without_echo() {
    let hub = hub();
    let mut a = TestConn::connect(&hub, "1", "10").await;
    let mut b = TestConn::connect(&hub, "2", "10").await;
    a.drain();
    b.drain();

    a.send(r#"{"type":"chat-message","participantId":"1","text":"hi"}"#)
        .await;

    let received = b.drain();
    assert!(received.iter().any(|m| matches!(
        m,
        ServerMessage::ChatMessage(entry) if entry.participant_id == "1" && entry.text == "hi"
    )));
    assert!(a.drain().is_empty(), "sender records its own chat locally");
}

#[tokio::test]
async fn session_history_is_seeded_from_the_document_store() {
    let store = Arc::new(MemoryStore::new());
    let key = SessionKey::new("10", Some("1".into()));
    store.put(
        key.clone(),
        vec![Change {
            participant_id: "9".into(),
            book_id: "10".into(),
            chapter_id: Some("1".into()),
            change_type: "insert".into(),
            position: Some(0),
            content: Some("persisted".into()),
            previous_content: None,
            timestamp: None,
        }],
    );
    let hub = Arc::new(CollabHub::new(64, store));

    let mut a = TestConn::connect(&hub, "1", "10").await;
    let replay = a
        .drain()
        .into_iter()
        .find_map(|m| match m {
            ServerMessage::RecentChanges { changes } => Some(changes),
            _ => None,
        })
        .unwrap();
    assert_eq!(replay.len(), 1);
    assert_eq!(replay[0].content.as_deref(), Some("persisted"));
}

/// Full loop: a reconciliation-layer core wired to a coordinator via its
/// outbox, with a second participant editing alongside.
#[tokio::test]
async fn client_core_converges_through_the_relay() {
    let hub = hub();
    let mut peer = TestConn::connect(&hub, "2", "10").await;
    peer.drain();

    let mut conn = TestConn::new(&hub);
    let mut core = ClientCore::new(
        "1",
        "Ada",
        "10",
        Some("1".into()),
        PlainTextBuffer::new("hello world"),
    );

    // Drive the handshake: every frame the core emits goes straight to the
    // coordinator, every reply comes back through the outbox.
    let mut pending = vec![core.on_connected()];
    while let Some(frame) = pending.pop() {
        let raw = serde_json::to_string(&frame).unwrap();
        conn.send(&raw).await;
        for message in conn.drain() {
            if let Some(reply) = core.on_message(message) {
                pending.push(reply);
            }
        }
    }
    assert_eq!(core.phase(), ClientPhase::Joined);

    // The peer inserts; the core merges it at the stated position.
    peer.send(&insert_json("2", 5, "!")).await;
    for message in conn.drain() {
        core.on_message(message);
    }
    assert_eq!(core.buffer().contents(), "hello! world");

    // A local edit applies optimistically and reaches the peer unchanged.
    let frame = core.local_edit("insert", Some(0), Some(">".to_string()), None);
    assert_eq!(core.buffer().contents(), ">hello! world");
    assert!(matches!(frame, ClientMessage::Change(_)));
    conn.send(&serde_json::to_string(&frame).unwrap()).await;
    let received = changes_of(peer.drain());
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].content.as_deref(), Some(">"));
}
