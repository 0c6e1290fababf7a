use std::sync::Arc;
use std::time::Duration;

use relaychat_protocol::{ChannelInfo, PNG_SIGNATURE};
use relaychat_sdk::{ChatClient, ChatEvent, SdkError, UserImage};
use relaychat_server::config::{ChannelEntry, UserEntry};
use relaychat_server::credentials::hash_password;
use relaychat_server::{AvatarStore, ChatServer, ChatState, MemoryStore};
use tempfile::TempDir;

async fn start_server() -> (String, TempDir) {
    let storage = tempfile::tempdir().expect("tempdir");
    let channels = [
        ChannelEntry { id: 1, name: "general".into(), is_voice: false },
        ChannelEntry { id: 2, name: "voice-lounge".into(), is_voice: true },
    ];
    let users = [
        UserEntry { id: 1, name: "alice".into(), credential: hash_password("correct-pw") },
        UserEntry { id: 2, name: "bob".into(), credential: hash_password("bob-pw") },
    ];
    let store = Arc::new(MemoryStore::new(&channels, &users));
    let server = ChatServer::new(ChatState::new(store, AvatarStore::new(storage.path().join("images"))));
    let addr = server.bind("127.0.0.1:0").await.expect("bind");
    (addr.to_string(), storage)
}

async fn next_event(client: &ChatClient) -> ChatEvent {
    tokio::time::timeout(Duration::from_secs(5), client.events().recv())
        .await
        .expect("event in time")
        .expect("event channel open")
}

/// Logs in and waits for the first listing, so the session is registered.
async fn login(addr: &str, username: &str, password: &str) -> ChatClient {
    let client = ChatClient::connect(addr, username, password).await.expect("login");
    client.list_users().await.unwrap();
    assert!(matches!(next_event(&client).await, ChatEvent::Users(_)));
    client
}

#[tokio::test]
async fn test_rejected_login() {
    let (addr, _storage) = start_server().await;
    let result = ChatClient::connect(&addr, "alice", "wrong-pw").await;
    assert!(matches!(result, Err(SdkError::AuthenticationFailed)));
}

#[tokio::test]
async fn test_listings() {
    let (addr, _storage) = start_server().await;
    let client = login(&addr, "alice", "correct-pw").await;

    client.list_channels().await.unwrap();
    assert_eq!(
        next_event(&client).await,
        ChatEvent::Channels(vec![
            ChannelInfo::new(1, false, "general"),
            ChannelInfo::new(2, true, "voice-lounge"),
        ])
    );

    client.list_users().await.unwrap();
    let ChatEvent::Users(users) = next_event(&client).await else {
        panic!("expected users");
    };
    let online: Vec<_> = users.iter().map(|u| (u.name.as_str(), u.is_online)).collect();
    assert_eq!(online, vec![("alice", true), ("bob", false)]);
}

#[tokio::test]
async fn test_messages_reach_both_clients_and_history() {
    let (addr, _storage) = start_server().await;
    let alice = login(&addr, "alice", "correct-pw").await;
    let bob = login(&addr, "bob", "bob-pw").await;

    alice.send_message(1, "").await.unwrap();
    alice.send_message(1, "hi bob").await.unwrap();

    for client in [&alice, &bob] {
        let ChatEvent::Message(message) = next_event(client).await else {
            panic!("expected message");
        };
        assert_eq!((message.user_id, message.msg.as_str()), (1, "hi bob"));
    }

    bob.list_messages(1).await.unwrap();
    let ChatEvent::Message(replayed) = next_event(&bob).await else {
        panic!("expected history entry");
    };
    assert_eq!(replayed.msg, "hi bob");
}

#[tokio::test]
async fn test_avatar_upload_and_listing() {
    let (addr, _storage) = start_server().await;
    let alice = login(&addr, "alice", "correct-pw").await;

    let mut image = PNG_SIGNATURE.to_vec();
    image.extend_from_slice(b"tiny");
    alice.upload_avatar(b"not an image".to_vec()).await.unwrap();
    alice.upload_avatar(image.clone()).await.unwrap();
    alice.list_user_images().await.unwrap();

    assert_eq!(
        next_event(&alice).await,
        ChatEvent::UserImages(vec![UserImage { user_id: 1, bytes: image }])
    );
}

#[tokio::test]
async fn test_refresh_repeats_listings() {
    let (addr, _storage) = start_server().await;
    let mut client = login(&addr, "alice", "correct-pw").await;

    client.start_refresh(Duration::from_millis(50));
    for _ in 0..2 {
        assert!(matches!(next_event(&client).await, ChatEvent::Channels(channels) if channels.len() == 2));
        let ChatEvent::Users(users) = next_event(&client).await else {
            panic!("expected users");
        };
        assert!(users.iter().any(|u| u.name == "alice" && u.is_online));
    }

    client.stop_refresh();
}
