//! Storage layer for persisted guild state

mod keys;
mod kv;
mod memory;
mod migrations;
mod traits;

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tracing::instrument;

use crate::error::{Error, Result};

pub use keys::KeySpace;
pub use kv::KvStore;
pub use memory::{MemoryStore, StoreOp};
pub use traits::KeyValueStore;

/// SQLite database holding persisted guild state
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (creating if needed) the database file and migrate it
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::migrated(Connection::open(path)?)
    }

    /// Throwaway database that lives as long as the handle
    pub fn open_in_memory() -> Result<Self> {
        Self::migrated(Connection::open_in_memory()?)
    }

    fn migrated(mut conn: Connection) -> Result<Self> {
        migrations::run_migrations(&mut conn)?;
        Ok(Self { conn })
    }

    pub fn schema_version(&self) -> Result<u32> {
        migrations::schema_version(&self.conn)
    }

    pub fn kv(&self) -> KvStore<'_> {
        KvStore::new(&self.conn)
    }
}

/// SQLite-backed `KeyValueStore`
///
/// `rusqlite::Connection` is not `Sync`, so access is serialized. Calls block
/// the calling thread, async workers included; each is one primary-key read or
/// upsert on a local file, and a guild issues at most one per command or track.
pub struct SqliteStore {
    db: Mutex<Database>,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    fn with_db<T>(&self, f: impl FnOnce(&Database) -> Result<T>) -> Result<T> {
        let db = self.db.lock().map_err(|_| Error::StorePoisoned)?;
        f(&db)
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_db(|db| db.kv().get(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.with_db(|db| db.kv().set(key, value))
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.with_db(|db| db.kv().delete(key))
    }

    fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        self.with_db(|db| db.kv().get_many(keys))
    }
}

/// Open a store from a connection URL
///
/// Accepts `sqlite://<path>`, `sqlite::memory:` and `memory://`.
pub fn open_store(url: &str) -> Result<Arc<dyn KeyValueStore>> {
    if url == "memory://" {
        return Ok(Arc::new(MemoryStore::new()));
    }
    if url == "sqlite::memory:" {
        return Ok(Arc::new(SqliteStore::new(Database::open_in_memory()?)));
    }
    match url.strip_prefix("sqlite://") {
        Some(path) if !path.is_empty() => {
            Ok(Arc::new(SqliteStore::new(Database::open(path)?)))
        }
        _ => Err(Error::Config(format!("unsupported store URL '{}'", url))),
    }
}
