//! Durable mailbox backend on SQLite.
//!
//! ```text
//! clients  (id BLOB PK, username TEXT UNIQUE, public_key BLOB, last_seen TEXT)
//! messages (id INTEGER PK AUTOINCREMENT, to_client BLOB, from_client BLOB,
//!           kind INTEGER, content BLOB)
//! ```
//!
//! `last_seen` is stored as RFC 3339. AUTOINCREMENT keeps message ids from
//! being reused after the highest row is deleted.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use tracing::{debug, info, instrument};

use super::{Entity, MailboxStore, Repository};
use crate::error::{StoreError, StoreResult};
use crate::model::{Client, ClientId, Message, MessageId, MessageType, NewMessage, PublicKey};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS clients (
        id          BLOB PRIMARY KEY NOT NULL,
        username    TEXT NOT NULL UNIQUE,
        public_key  BLOB NOT NULL,
        last_seen   TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS messages (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        to_client   BLOB NOT NULL,
        from_client BLOB NOT NULL,
        kind        INTEGER NOT NULL,
        content     BLOB NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_messages_to_client ON messages(to_client, id);
";

const CLIENT_COLUMNS: &str = "id, username, public_key, last_seen";
const MESSAGE_COLUMNS: &str = "id, to_client, from_client, kind, content";

/// SQLite-backed store. One connection, serialized by a mutex.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and ensure the schema exists.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        let store = Self::with_connection(conn, Some(path.as_ref().to_path_buf()))?;
        info!("SQLite mailbox ready");
        Ok(store)
    }

    /// Private database that disappears with the store.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, None)
    }

    fn with_connection(conn: Connection, path: Option<PathBuf>) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Map a UNIQUE violation on `clients` to the column it names.
fn client_conflict(err: rusqlite::Error) -> StoreError {
    if let rusqlite::Error::SqliteFailure(failure, Some(message)) = &err {
        if failure.code == ErrorCode::ConstraintViolation {
            let field = if message.contains("clients.username") {
                Some("username")
            } else if message.contains("clients.id") {
                Some("id")
            } else {
                None
            };
            if let Some(field) = field {
                return StoreError::Conflict {
                    entity: Client::KIND,
                    field,
                };
            }
        }
    }
    StoreError::Sqlite(err)
}

struct ClientRow {
    id: Vec<u8>,
    username: String,
    public_key: Vec<u8>,
    last_seen: String,
}

impl ClientRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            username: row.get(1)?,
            public_key: row.get(2)?,
            last_seen: row.get(3)?,
        })
    }
}

impl TryFrom<ClientRow> for Client {
    type Error = StoreError;

    fn try_from(row: ClientRow) -> StoreResult<Self> {
        let id = ClientId::from_slice(&row.id)
            .ok_or_else(|| StoreError::Corrupt(format!("client id of {} bytes", row.id.len())))?;
        let public_key = PublicKey::from_slice(&row.public_key)
            .map_err(|e| StoreError::Corrupt(format!("client {id}: {e}")))?;
        let last_seen = DateTime::parse_from_rfc3339(&row.last_seen)?.with_timezone(&Utc);

        Ok(Client {
            id,
            username: row.username,
            public_key,
            last_seen,
        })
    }
}

struct MessageRow {
    id: i64,
    to_client: Vec<u8>,
    from_client: Vec<u8>,
    kind: u8,
    content: Vec<u8>,
}

impl MessageRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            to_client: row.get(1)?,
            from_client: row.get(2)?,
            kind: row.get(3)?,
            content: row.get(4)?,
        })
    }
}

impl TryFrom<MessageRow> for Message {
    type Error = StoreError;

    fn try_from(row: MessageRow) -> StoreResult<Self> {
        let id = MessageId::try_from(row.id)
            .map_err(|_| StoreError::Corrupt(format!("message id {} out of range", row.id)))?;
        let to_client = ClientId::from_slice(&row.to_client)
            .ok_or_else(|| StoreError::Corrupt(format!("message {id}: bad recipient id")))?;
        let from_client = ClientId::from_slice(&row.from_client)
            .ok_or_else(|| StoreError::Corrupt(format!("message {id}: bad sender id")))?;
        let kind = MessageType::try_from(row.kind)
            .map_err(|e| StoreError::Corrupt(format!("message {id}: {e}")))?;

        Ok(Message {
            id,
            from_client,
            to_client,
            kind,
            content: row.content,
        })
    }
}

fn collect<R, E>(rows: impl Iterator<Item = rusqlite::Result<R>>) -> StoreResult<Vec<E>>
where
    E: TryFrom<R, Error = StoreError>,
{
    rows.map(|row| E::try_from(row?)).collect()
}

impl Repository<Client> for SqliteStore {
    fn find_all(&self) -> StoreResult<Vec<Client>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {CLIENT_COLUMNS} FROM clients ORDER BY id"))?;
        let rows = stmt.query_map([], ClientRow::read)?;
        collect(rows)
    }

    fn get(&self, id: ClientId) -> StoreResult<Option<Client>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE id = ?1"),
                params![id.as_bytes().as_slice()],
                ClientRow::read,
            )
            .optional()?;
        row.map(Client::try_from).transpose()
    }

    fn save(&self, id: ClientId, client: Client) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO clients (id, username, public_key, last_seen) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                username = excluded.username,
                public_key = excluded.public_key,
                last_seen = excluded.last_seen",
            params![
                id.as_bytes().as_slice(),
                client.username,
                client.public_key.as_bytes().as_slice(),
                timestamp(&client.last_seen),
            ],
        )
        .map_err(client_conflict)?;
        Ok(())
    }

    fn delete(&self, id: ClientId) -> StoreResult<bool> {
        let conn = self.conn()?;
        let affected = conn.execute(
            "DELETE FROM clients WHERE id = ?1",
            params![id.as_bytes().as_slice()],
        )?;
        Ok(affected > 0)
    }
}

impl Repository<Message> for SqliteStore {
    fn find_all(&self) -> StoreResult<Vec<Message>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {MESSAGE_COLUMNS} FROM messages ORDER BY id"))?;
        let rows = stmt.query_map([], MessageRow::read)?;
        collect(rows)
    }

    fn get(&self, id: MessageId) -> StoreResult<Option<Message>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id],
                MessageRow::read,
            )
            .optional()?;
        row.map(Message::try_from).transpose()
    }

    fn save(&self, id: MessageId, message: Message) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO messages (id, to_client, from_client, kind, content)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                to_client = excluded.to_client,
                from_client = excluded.from_client,
                kind = excluded.kind,
                content = excluded.content",
            params![
                id,
                message.to_client.as_bytes().as_slice(),
                message.from_client.as_bytes().as_slice(),
                message.kind.to_u8(),
                message.content,
            ],
        )?;
        Ok(())
    }

    fn delete(&self, id: MessageId) -> StoreResult<bool> {
        let conn = self.conn()?;
        let affected = conn.execute("DELETE FROM messages WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }
}

impl MailboxStore for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    fn client_by_username(&self, username: &str) -> StoreResult<Option<Client>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE username = ?1"),
                params![username],
                ClientRow::read,
            )
            .optional()?;
        row.map(Client::try_from).transpose()
    }

    fn insert_client(&self, client: Client) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO clients (id, username, public_key, last_seen) VALUES (?1, ?2, ?3, ?4)",
            params![
                client.id.as_bytes().as_slice(),
                client.username,
                client.public_key.as_bytes().as_slice(),
                timestamp(&client.last_seen),
            ],
        )
        .map_err(client_conflict)?;
        Ok(())
    }

    fn touch_client(&self, id: ClientId, at: DateTime<Utc>) -> StoreResult<bool> {
        let conn = self.conn()?;
        let affected = conn.execute(
            "UPDATE clients SET last_seen = ?2 WHERE id = ?1",
            params![id.as_bytes().as_slice(), timestamp(&at)],
        )?;
        Ok(affected > 0)
    }

    fn insert_message(&self, message: NewMessage) -> StoreResult<Message> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO messages (to_client, from_client, kind, content) VALUES (?1, ?2, ?3, ?4)",
            params![
                message.to_client.as_bytes().as_slice(),
                message.from_client.as_bytes().as_slice(),
                message.kind.to_u8(),
                message.content,
            ],
        )?;
        // Dropping the transaction rolls back an id that does not fit the wire field
        let id = MessageId::try_from(tx.last_insert_rowid())
            .map_err(|_| StoreError::SequenceExhausted)?;
        tx.commit()?;
        Ok(message.with_id(id))
    }

    fn take_messages_for(&self, recipient: ClientId) -> StoreResult<Vec<Message>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let messages: Vec<Message> = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE to_client = ?1 ORDER BY id"
            ))?;
            let rows = stmt.query_map(params![recipient.as_bytes().as_slice()], MessageRow::read)?;
            collect(rows)?
        };

        let deleted = tx.execute(
            "DELETE FROM messages WHERE to_client = ?1",
            params![recipient.as_bytes().as_slice()],
        )?;
        if deleted != messages.len() {
            return Err(StoreError::Corrupt(format!(
                "selected {} messages for {recipient} but deleted {deleted}",
                messages.len()
            )));
        }

        tx.commit()?;
        debug!(%recipient, count = messages.len(), "Messages taken");
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::conformance;

    #[test]
    fn test_unique_clients() {
        conformance::unique_clients(&SqliteStore::open_in_memory().unwrap());
    }

    #[test]
    fn test_touch_updates_last_seen() {
        conformance::touch_updates_last_seen(&SqliteStore::open_in_memory().unwrap());
    }

    #[test]
    fn test_message_ids_increase() {
        conformance::message_ids_increase(&SqliteStore::open_in_memory().unwrap());
    }

    #[test]
    fn test_take_is_destructive() {
        conformance::take_is_destructive(&SqliteStore::open_in_memory().unwrap());
    }

    #[test]
    fn test_save_is_upsert() {
        conformance::save_is_upsert(&SqliteStore::open_in_memory().unwrap());
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mailbox.db");

        let alice = Client::new(
            ClientId::from_bytes([1; 16]),
            "alice",
            PublicKey::from_bytes([7; 160]),
        );
        let queued = {
            let store = SqliteStore::open(&path).unwrap();
            store.insert_client(alice.clone()).unwrap();
            store
                .insert_message(NewMessage {
                    from_client: ClientId::from_bytes([2; 16]),
                    to_client: alice.id,
                    kind: MessageType::File,
                    content: vec![0, 1, 2, 3],
                })
                .unwrap()
        };

        // Schema creation is idempotent and earlier writes are durable
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.path(), Some(path.as_path()));
        assert_eq!(store.client(alice.id).unwrap(), Some(alice.clone()));
        assert_eq!(store.take_messages_for(alice.id).unwrap(), vec![queued]);
    }

    #[test]
    fn test_corrupt_row_is_reported() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .conn()
            .unwrap()
            .execute(
                "INSERT INTO messages (to_client, from_client, kind, content) VALUES (?1, ?2, 77, x'')",
                params![[1u8; 16].as_slice(), [2u8; 16].as_slice()],
            )
            .unwrap();

        let err = Repository::<Message>::find_all(&store).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }
}
