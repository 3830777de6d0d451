//! End-to-end client flow against an in-memory store: two accounts, the
//! directory, push tokens, a conversation and sign-out.

use std::ops::Range;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{TimeZone, Utc};

use parley_client::auth::{sign_in, sign_out, sign_up};
use parley_client::chat::{ChatContext, ChatSession, TimelineRenderer};
use parley_client::prefs::{MemoryPreferences, PreferenceStore};
use parley_client::push::{StaticTokenProvider, register_push_token};
use parley_client::users::{find_user, list_users};
use parley_client::view::ChatRow;
use parley_client::ClientError;
use parley_gateway::{DocumentStore, LiveStore};
use parley_types::api::{SignInRequest, SignUpRequest};
use parley_types::events::DocumentChange;
use parley_types::keys;
use parley_types::models::{ChatMessage, Document};

#[derive(Clone, Default)]
struct Screen {
    log: Arc<Mutex<Vec<String>>>,
}

impl Screen {
    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

impl TimelineRenderer for Screen {
    fn on_reset(&mut self, rows: &[ChatRow]) {
        self.log.lock().unwrap().push(format!("reset {}", rows.len()));
    }

    fn on_appended(&mut self, range: Range<usize>, first_changed: usize, _rows: &[ChatRow]) {
        self.log
            .lock()
            .unwrap()
            .push(format!("append {}..{} from {}", range.start, range.end, first_changed));
    }

    fn on_error(&mut self, error: &ClientError) {
        self.log.lock().unwrap().push(format!("error {error}"));
    }
}

fn account(first: &str, email: &str) -> SignUpRequest {
    SignUpRequest {
        first_name: first.into(),
        last_name: "Example".into(),
        email: email.into(),
        password: "correct horse".into(),
        image: "aGVsbG8=".into(),
    }
}

async fn rows_eventually(session: &ChatSession, n: usize) -> Arc<Vec<ChatRow>> {
    let mut rx = session.watch();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let rows = rx.borrow_and_update().clone();
            if rows.len() >= n {
                return rows;
            }
            rx.changed().await.unwrap();
        }
    })
    .await
    .expect("timeline did not fill up in time")
}

async fn log_eventually(screen: &Screen, n: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while screen.log().len() < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("renderer was not called in time")
}

fn chat_doc(id: &str, from: &str, to: &str, secs: i64) -> Document {
    let sent_at = Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap();
    Document {
        id: id.into(),
        collection: keys::COLLECTION_CHAT.into(),
        fields: ChatMessage::new_fields(from, to, id, sent_at),
        created_at: sent_at,
    }
}

#[tokio::test]
async fn two_users_chat_end_to_end() {
    let store = Arc::new(LiveStore::in_memory().unwrap());

    let ada_prefs = MemoryPreferences::new();
    let ada = sign_up(store.as_ref(), &ada_prefs, account("Ada", "ada@example.com"))
        .await
        .unwrap();
    let bob_prefs = MemoryPreferences::new();
    let bob = sign_up(store.as_ref(), &bob_prefs, account("Bob", "bob@example.com"))
        .await
        .unwrap();

    // Ada signs in again on a fresh device
    let device = MemoryPreferences::new();
    let profile = sign_in(
        store.as_ref(),
        &device,
        SignInRequest {
            email: "ada@example.com".into(),
            password: "correct horse".into(),
        },
    )
    .await
    .unwrap();
    assert_eq!(profile.user_id, ada.user_id);

    register_push_token(store.as_ref(), &device, &StaticTokenProvider::new("ada-device"))
        .await
        .unwrap();

    let directory = list_users(store.as_ref(), &ada.user_id).await.unwrap();
    assert_eq!(directory.len(), 1);
    assert_eq!(directory[0].display_name(), "Bob Example");

    let screen = Screen::default();
    let ada_chat = ChatSession::open(
        store.clone(),
        ChatContext {
            current_user_id: ada.user_id.clone(),
            peer: directory[0].clone(),
        },
        screen.clone(),
    )
    .await
    .unwrap();
    let bob_chat = ChatSession::open(
        store.clone(),
        ChatContext {
            current_user_id: bob.user_id.clone(),
            peer: find_user(store.as_ref(), &ada.user_id).await.unwrap(),
        },
        Screen::default(),
    )
    .await
    .unwrap();
    log_eventually(&screen, 2).await;

    ada_chat.send("hello Bob").await.unwrap();
    rows_eventually(&ada_chat, 1).await;
    rows_eventually(&bob_chat, 1).await;
    bob_chat.send("hi Ada").await.unwrap();
    rows_eventually(&ada_chat, 2).await;
    ada_chat.send("how are you?").await.unwrap();

    let ada_rows = rows_eventually(&ada_chat, 3).await;
    let bob_rows = rows_eventually(&bob_chat, 3).await;
    let bodies = |rows: &[ChatRow]| rows.iter().map(|r| r.message.body.clone()).collect::<Vec<_>>();
    assert_eq!(bodies(ada_rows.as_slice()), vec!["hello Bob", "hi Ada", "how are you?"]);
    assert_eq!(bodies(ada_rows.as_slice()), bodies(bob_rows.as_slice()));

    assert_eq!(
        screen.log(),
        vec!["reset 0", "reset 0", "reset 1", "append 1..2 from 1", "append 2..3 from 2"]
    );

    ada_chat.close().await;
    bob_chat.close().await;
    assert_eq!(store.dispatcher().live_query_count().await, 0);

    sign_out(store.as_ref(), &device).await.unwrap();
    assert!(device.get_string(keys::USER_ID).is_none());
    let ada_doc = store
        .get(keys::COLLECTION_USERS, &ada.user_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ada_doc.get_str(keys::FCM_TOKEN), None);
}

#[tokio::test]
async fn late_and_repeated_deliveries_keep_the_timeline_ordered() {
    let store = Arc::new(LiveStore::in_memory().unwrap());
    let bob = {
        let prefs = MemoryPreferences::new();
        sign_up(store.as_ref(), &prefs, account("Bob", "bob@example.com"))
            .await
            .unwrap()
    };
    let peer = find_user(store.as_ref(), &bob.user_id).await.unwrap();

    let screen = Screen::default();
    let session = ChatSession::open(
        store.clone(),
        ChatContext {
            current_user_id: "ada".into(),
            peer,
        },
        screen.clone(),
    )
    .await
    .unwrap();
    // Both empty snapshots
    log_eventually(&screen, 2).await;

    let dispatcher = store.dispatcher();
    dispatcher
        .publish_changes(vec![
            DocumentChange::added(chat_doc("1", "ada", &bob.user_id, 10)),
            DocumentChange::added(chat_doc("2", &bob.user_id, "ada", 20)),
        ])
        .await;
    rows_eventually(&session, 2).await;

    // A message that was sent earlier but arrives later, then a redelivery
    dispatcher.publish(&chat_doc("3", "ada", &bob.user_id, 15)).await;
    rows_eventually(&session, 3).await;
    dispatcher.publish(&chat_doc("2", &bob.user_id, "ada", 20)).await;
    dispatcher.publish(&chat_doc("4", &bob.user_id, "ada", 30)).await;

    let rows = rows_eventually(&session, 4).await;
    let ids: Vec<&str> = rows.iter().map(|r| r.message.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "3", "2", "4"]);

    session.close().await;
}
