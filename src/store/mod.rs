//! SQLite-backed Card Store and Tag Dictionary.
//!
//! A single connection is shared behind a mutex. Every public operation takes
//! the lock for one logical operation and every multi-statement write runs in
//! its own transaction.

mod cards;
mod schema;
mod seed;
pub mod tags;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rusqlite::Connection;

use crate::error::{StoreError, StoreResult};

#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Opens (or creates) the database file and ensures the schema.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open in-memory database for testing
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        schema::ensure(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // A panic mid-operation drops its uncommitted transaction, so the
    // connection behind a poisoned lock is still consistent.
    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs a synchronous store operation on the blocking thread pool.
    pub async fn call<F, T>(&self, op: F) -> StoreResult<T>
    where
        F: FnOnce(&Store) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| StoreError::Background(e.to_string()))?
    }

    pub fn ping(&self) -> bool {
        self.lock().execute_batch("SELECT 1").is_ok()
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        let count: i64 = self
            .lock()
            .query_row("SELECT COUNT(*) FROM cards", [], |row| row.get(0))?;
        Ok(count == 0)
    }
}
