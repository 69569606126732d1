use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::{constants, DomainError, ProtocolError, Result, StoreError};
use crate::model::{Client, ClientId, PublicKey, USERNAME_SIZE};
use crate::store::{MailboxStore, Repository};

/// Fresh ids are random, so a collision is retried a few times before giving up.
const ID_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct ClientService {
    store: Arc<dyn MailboxStore>,
}

impl ClientService {
    pub fn new(store: Arc<dyn MailboxStore>) -> Self {
        Self { store }
    }

    /// Create a client under a fresh id.
    ///
    /// Fails with [`DomainError::DuplicateUsername`] when the name is taken,
    /// including when another registration wins the race for it.
    pub fn register(&self, username: &str, public_key: PublicKey) -> Result<Client> {
        if username.is_empty() {
            return Err(ProtocolError::InvalidPayload(constants::ERR_EMPTY_USERNAME.to_string()).into());
        }
        if username.len() > USERNAME_SIZE {
            return Err(ProtocolError::InvalidPayload(format!(
                "username is {} bytes (max {USERNAME_SIZE})",
                username.len()
            ))
            .into());
        }
        if self.store.client_by_username(username)?.is_some() {
            return Err(DomainError::DuplicateUsername(username.to_string()).into());
        }

        let mut attempts = 0;
        loop {
            attempts += 1;
            let client = Client::new(ClientId::random(), username, public_key.clone());
            match self.store.insert_client(client.clone()) {
                Ok(()) => {
                    info!(client_id = %client.id, username, "Client registered");
                    return Ok(client);
                }
                Err(StoreError::Conflict {
                    field: "username", ..
                }) => {
                    return Err(DomainError::DuplicateUsername(username.to_string()).into());
                }
                Err(StoreError::Conflict { field: "id", .. }) if attempts < ID_ATTEMPTS => {
                    warn!(client_id = %client.id, attempts, "Client id collision, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    pub fn find_by_id(&self, id: ClientId) -> Result<Client> {
        self.store
            .client(id)?
            .ok_or_else(|| DomainError::NotFound(format!("client {id}")).into())
    }

    /// Every client except `excluding`, ordered by id.
    pub fn list_all(&self, excluding: ClientId) -> Result<Vec<Client>> {
        let clients = Repository::<Client>::find(self.store.as_ref(), &|c: &Client| c.id != excluding)?;
        Ok(clients)
    }

    /// Refresh `last_seen`; unknown ids are ignored and reported as `false`.
    pub fn touch(&self, id: ClientId) -> Result<bool> {
        let known = self.store.touch_client(id, Utc::now())?;
        if !known {
            debug!(client_id = %id, "Touch for unregistered client");
        }
        Ok(known)
    }
}
