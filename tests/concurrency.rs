//! Concurrent access to the shared store through the services.
//!
//! Many tasks race on the same mailbox; every queued message must be
//! delivered exactly once in total and usernames must stay unique.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::HashSet;
use std::sync::Arc;

use mailbox_server::error::{DomainError, ServerError};
use mailbox_server::model::{ClientId, MessageId, MessageType, PublicKey};
use mailbox_server::service::{ClientService, MessageService};
use mailbox_server::store::{MailboxStore, MemoryStore, SqliteStore};
use tokio::task::JoinSet;

const SENDERS: usize = 8;
const PER_SENDER: usize = 200;

async fn deliveries_are_at_most_once(store: Arc<dyn MailboxStore>) {
    let clients = ClientService::new(Arc::clone(&store));
    let messages = MessageService::new(Arc::clone(&store));
    let bob = clients
        .register("bob", PublicKey::from_bytes([2; 160]))
        .unwrap()
        .id;

    let mut tasks = JoinSet::new();

    for sender in 0..SENDERS {
        let messages = messages.clone();
        tasks.spawn(async move {
            let from = ClientId::from_bytes([sender as u8 + 1; 16]);
            for i in 0..PER_SENDER {
                messages
                    .send(from, bob, MessageType::Text, i.to_le_bytes().to_vec())
                    .unwrap();
                if i % 16 == 0 {
                    tokio::task::yield_now().await;
                }
            }
            Vec::new()
        });
    }

    for _ in 0..SENDERS {
        let messages = messages.clone();
        tasks.spawn(async move {
            let mut seen: Vec<MessageId> = Vec::new();
            for _ in 0..PER_SENDER {
                seen.extend(messages.poll(bob).unwrap().into_iter().map(|m| m.id));
                tokio::task::yield_now().await;
            }
            seen
        });
    }

    let mut delivered: Vec<MessageId> = Vec::new();
    while let Some(res) = tasks.join_next().await {
        delivered.extend(res.unwrap());
    }
    // Pick up whatever arrived after the last concurrent poll
    delivered.extend(messages.poll(bob).unwrap().into_iter().map(|m| m.id));

    let unique: HashSet<MessageId> = delivered.iter().copied().collect();
    assert_eq!(unique.len(), delivered.len(), "a message was delivered twice");
    assert_eq!(delivered.len(), SENDERS * PER_SENDER);
    assert!(messages.poll(bob).unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_polls_memory() {
    deliveries_are_at_most_once(Arc::new(MemoryStore::new())).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_polls_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("mailbox.db")).unwrap();
    deliveries_are_at_most_once(Arc::new(store)).await;
}

async fn one_winner_per_username(store: Arc<dyn MailboxStore>) {
    let clients = ClientService::new(store);
    let mut tasks = JoinSet::new();

    for i in 0..32u8 {
        let clients = clients.clone();
        tasks.spawn(async move { clients.register("alice", PublicKey::from_bytes([i; 160])) });
    }

    let mut winners = 0;
    while let Some(res) = tasks.join_next().await {
        match res.unwrap() {
            Ok(client) => {
                assert_eq!(client.username, "alice");
                winners += 1;
            }
            Err(ServerError::Domain(DomainError::DuplicateUsername(name))) => {
                assert_eq!(name, "alice");
            }
            Err(other) => panic!("unexpected registration failure: {other}"),
        }
    }

    assert_eq!(winners, 1);
    assert_eq!(clients.list_all(ClientId::default()).unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_registration_memory() {
    one_winner_per_username(Arc::new(MemoryStore::new())).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_registration_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("mailbox.db")).unwrap();
    one_winner_per_username(Arc::new(store)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn message_ids_unique_across_senders() {
    let store: Arc<dyn MailboxStore> = Arc::new(MemoryStore::new());
    let clients = ClientService::new(Arc::clone(&store));
    let messages = MessageService::new(store);
    let bob = clients
        .register("bob", PublicKey::from_bytes([2; 160]))
        .unwrap()
        .id;

    let mut tasks = JoinSet::new();
    for _ in 0..4 {
        let messages = messages.clone();
        tasks.spawn(async move {
            (0..250)
                .map(|_| {
                    messages
                        .send(ClientId::random(), bob, MessageType::File, vec![0; 8])
                        .unwrap()
                        .id
                })
                .collect::<Vec<_>>()
        });
    }

    let mut ids = HashSet::new();
    while let Some(res) = tasks.join_next().await {
        for id in res.unwrap() {
            assert!(ids.insert(id), "duplicate message id {id}");
        }
    }
    assert_eq!(ids.len(), 1000);

    // Delivery order follows id order
    let polled: Vec<MessageId> = messages.poll(bob).unwrap().into_iter().map(|m| m.id).collect();
    let mut sorted = polled.clone();
    sorted.sort_unstable();
    assert_eq!(polled, sorted);
}
