use std::sync::Arc;

use tracing::debug;

use crate::error::{DomainError, Result};
use crate::model::{ClientId, Message, MessageType, NewMessage};
use crate::store::MailboxStore;

#[derive(Clone)]
pub struct MessageService {
    store: Arc<dyn MailboxStore>,
}

impl MessageService {
    pub fn new(store: Arc<dyn MailboxStore>) -> Self {
        Self { store }
    }

    /// Queue a message for a registered recipient.
    ///
    /// The sender is taken as given; only the recipient must exist.
    pub fn send(
        &self,
        from: ClientId,
        to: ClientId,
        kind: MessageType,
        content: Vec<u8>,
    ) -> Result<Message> {
        if self.store.client(to)?.is_none() {
            return Err(DomainError::NotFound(format!("recipient {to}")).into());
        }

        let message = self.store.insert_message(NewMessage {
            from_client: from,
            to_client: to,
            kind,
            content,
        })?;
        debug!(
            message_id = message.id,
            from = %from,
            to = %to,
            kind = ?kind,
            size = message.content.len(),
            "Message queued"
        );
        Ok(message)
    }

    /// Remove and return everything queued for `client_id`.
    pub fn poll(&self, client_id: ClientId) -> Result<Vec<Message>> {
        let messages = self.store.take_messages_for(client_id)?;
        debug!(client_id = %client_id, count = messages.len(), "Mailbox drained");
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Client, PublicKey};
    use crate::store::{MemoryStore, SqliteStore};

    fn with_recipient(store: Arc<dyn MailboxStore>) -> (MessageService, ClientId) {
        let bob = Client::new(ClientId::random(), "bob", PublicKey::from_bytes([2; 160]));
        store.insert_client(bob.clone()).unwrap();
        (MessageService::new(store), bob.id)
    }

    #[test]
    fn test_send_then_poll_once() {
        let (messages, bob) = with_recipient(Arc::new(MemoryStore::new()));
        let alice = ClientId::random();

        let sent = messages
            .send(alice, bob, MessageType::Text, b"hello".to_vec())
            .unwrap();

        let polled = messages.poll(bob).unwrap();
        assert_eq!(polled, vec![sent]);
        assert!(messages.poll(bob).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_recipient() {
        let (messages, _) = with_recipient(Arc::new(MemoryStore::new()));
        let err = messages
            .send(ClientId::random(), ClientId::random(), MessageType::Text, Vec::new())
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::ServerError::Domain(DomainError::NotFound(_))
        ));
    }

    #[test]
    fn test_poll_only_returns_own_messages() {
        let (messages, bob) = with_recipient(Arc::new(SqliteStore::open_in_memory().unwrap()));
        let alice = ClientId::random();

        messages
            .send(alice, bob, MessageType::SymmetricKeyRequest, Vec::new())
            .unwrap();
        assert!(messages.poll(alice).unwrap().is_empty());

        let polled = messages.poll(bob).unwrap();
        assert_eq!(polled.len(), 1);
        assert_eq!(polled[0].from_client, alice);
        assert_eq!(polled[0].kind, MessageType::SymmetricKeyRequest);
    }
}
