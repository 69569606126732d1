//! # Mailbox Store
//!
//! Persistence boundary for clients and queued messages.
//!
//! [`Repository`] is the generic capability every backend offers per entity
//! type. [`MailboxStore`] layers the mailbox operations on top that need the
//! backend's own atomicity: unique client insert, store-owned message ids and
//! destructive take-for-recipient.
//!
//! ## Backends
//! - [`MemoryStore`]: process-local, mutex-guarded maps
//! - [`SqliteStore`]: durable, one SQLite file, schema created on open

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use crate::config::{StoreBackend, StoreConfig};
use crate::error::StoreResult;
use crate::model::{Client, ClientId, Message, MessageId, NewMessage};

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Something a [`Repository`] can hold.
pub trait Entity: Clone + Send + Sync + 'static {
    type Id: Copy + Ord + Send + Sync + std::fmt::Debug;

    /// Table or collection name, used in conflict errors
    const KIND: &'static str;

    fn id(&self) -> Self::Id;
}

impl Entity for Client {
    type Id = ClientId;
    const KIND: &'static str = "clients";

    fn id(&self) -> ClientId {
        self.id
    }
}

impl Entity for Message {
    type Id = MessageId;
    const KIND: &'static str = "messages";

    fn id(&self) -> MessageId {
        self.id
    }
}

/// Generic storage capability for one entity type.
pub trait Repository<E: Entity>: Send + Sync {
    /// Every stored entity, ordered by id
    fn find_all(&self) -> StoreResult<Vec<E>>;

    fn find(&self, predicate: &dyn Fn(&E) -> bool) -> StoreResult<Vec<E>> {
        Ok(self
            .find_all()?
            .into_iter()
            .filter(|entity| predicate(entity))
            .collect())
    }

    fn get(&self, id: E::Id) -> StoreResult<Option<E>>;

    /// Insert or replace the entity stored under `id`.
    ///
    /// `id` is authoritative: the stored entity's own id field is set to it.
    fn save(&self, id: E::Id, entity: E) -> StoreResult<()>;

    /// Returns whether anything was removed
    fn delete(&self, id: E::Id) -> StoreResult<bool>;
}

/// Mailbox operations shared by every backend.
pub trait MailboxStore: Repository<Client> + Repository<Message> {
    /// Short backend name for logs
    fn backend(&self) -> &'static str;

    fn client(&self, id: ClientId) -> StoreResult<Option<Client>> {
        Repository::<Client>::get(self, id)
    }

    fn client_by_username(&self, username: &str) -> StoreResult<Option<Client>> {
        let mut matches = Repository::<Client>::find(self, &|client: &Client| client.username == username)?;
        Ok(matches.pop())
    }

    /// Insert a new client.
    ///
    /// Fails with [`StoreError::Conflict`](crate::error::StoreError::Conflict)
    /// naming `id` or `username` when either is already taken. Uniqueness is
    /// checked and the row written under one lock or transaction.
    fn insert_client(&self, client: Client) -> StoreResult<()>;

    /// Refresh `last_seen`; returns false for unknown clients.
    fn touch_client(&self, id: ClientId, at: DateTime<Utc>) -> StoreResult<bool>;

    /// Queue a message under the next id from the store's own sequence.
    fn insert_message(&self, message: NewMessage) -> StoreResult<Message>;

    /// Remove and return every message addressed to `recipient`, in id order.
    ///
    /// The select and the delete are one atomic step: a message is returned
    /// by at most one call.
    fn take_messages_for(&self, recipient: ClientId) -> StoreResult<Vec<Message>>;
}

/// Open the backend named by `config`.
#[instrument(skip_all, fields(backend = ?config.backend))]
pub fn open(config: &StoreConfig) -> StoreResult<Arc<dyn MailboxStore>> {
    let store: Arc<dyn MailboxStore> = match config.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Sqlite => Arc::new(SqliteStore::open(&config.path)?),
    };
    info!(backend = store.backend(), "Mailbox store opened");
    Ok(store)
}
