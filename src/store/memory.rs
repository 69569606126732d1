//! In-memory mailbox backend.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::{Entity, MailboxStore, Repository};
use crate::error::{StoreError, StoreResult};
use crate::model::{Client, ClientId, Message, MessageId, NewMessage};

/// Process-local store.
///
/// All state sits behind one mutex so that a uniqueness check and the insert
/// it guards, or a select and the delete that follows it, are never
/// interleaved with another operation. Clones share the same state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    clients: BTreeMap<ClientId, Client>,
    messages: BTreeMap<MessageId, Message>,

    /// Highest message id ever handed out or saved
    last_message_id: MessageId,
}

impl Inner {
    fn username_taken(&self, username: &str, except: Option<ClientId>) -> bool {
        self.clients
            .values()
            .any(|c| c.username == username && Some(c.id) != except)
    }

    fn next_message_id(&mut self) -> StoreResult<MessageId> {
        let next = self
            .last_message_id
            .checked_add(1)
            .ok_or(StoreError::SequenceExhausted)?;
        self.last_message_id = next;
        Ok(next)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

impl Repository<Client> for MemoryStore {
    fn find_all(&self) -> StoreResult<Vec<Client>> {
        Ok(self.lock()?.clients.values().cloned().collect())
    }

    fn get(&self, id: ClientId) -> StoreResult<Option<Client>> {
        Ok(self.lock()?.clients.get(&id).cloned())
    }

    fn save(&self, id: ClientId, mut client: Client) -> StoreResult<()> {
        let mut inner = self.lock()?;
        if inner.username_taken(&client.username, Some(id)) {
            return Err(StoreError::Conflict {
                entity: Client::KIND,
                field: "username",
            });
        }
        client.id = id;
        inner.clients.insert(id, client);
        Ok(())
    }

    fn delete(&self, id: ClientId) -> StoreResult<bool> {
        Ok(self.lock()?.clients.remove(&id).is_some())
    }
}

impl Repository<Message> for MemoryStore {
    fn find_all(&self) -> StoreResult<Vec<Message>> {
        Ok(self.lock()?.messages.values().cloned().collect())
    }

    fn get(&self, id: MessageId) -> StoreResult<Option<Message>> {
        Ok(self.lock()?.messages.get(&id).cloned())
    }

    fn save(&self, id: MessageId, mut message: Message) -> StoreResult<()> {
        let mut inner = self.lock()?;
        message.id = id;
        inner.messages.insert(id, message);
        inner.last_message_id = inner.last_message_id.max(id);
        Ok(())
    }

    fn delete(&self, id: MessageId) -> StoreResult<bool> {
        Ok(self.lock()?.messages.remove(&id).is_some())
    }
}

impl MailboxStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn insert_client(&self, client: Client) -> StoreResult<()> {
        let mut inner = self.lock()?;
        if inner.clients.contains_key(&client.id) {
            return Err(StoreError::Conflict {
                entity: Client::KIND,
                field: "id",
            });
        }
        if inner.username_taken(&client.username, None) {
            return Err(StoreError::Conflict {
                entity: Client::KIND,
                field: "username",
            });
        }
        inner.clients.insert(client.id, client);
        Ok(())
    }

    fn touch_client(&self, id: ClientId, at: DateTime<Utc>) -> StoreResult<bool> {
        let mut inner = self.lock()?;
        match inner.clients.get_mut(&id) {
            Some(client) => {
                client.last_seen = at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn insert_message(&self, message: NewMessage) -> StoreResult<Message> {
        let mut inner = self.lock()?;
        let message = message.with_id(inner.next_message_id()?);
        inner.messages.insert(message.id, message.clone());
        Ok(message)
    }

    fn take_messages_for(&self, recipient: ClientId) -> StoreResult<Vec<Message>> {
        let mut inner = self.lock()?;
        let ids: Vec<MessageId> = inner
            .messages
            .values()
            .filter(|m| m.to_client == recipient)
            .map(|m| m.id)
            .collect();

        Ok(ids
            .into_iter()
            .filter_map(|id| inner.messages.remove(&id))
            .collect())
    }
}
