//! StateStore: SQLite-backed initialization flag.
//!
//! Holds the single persisted `initialized` boolean. The flag is created
//! false, set once after a successful load, and cleared only on reinstall.
//! The load and the flag write share one `BEGIN IMMEDIATE` transaction, so a
//! failed or rolled-back load never leaves the flag set.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::time::Duration;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// DDL for the extension state table.
///
/// Schema version: 1
pub const STATE_SCHEMA: &str = r#"
-- Single-row extension state
CREATE TABLE IF NOT EXISTS anon_state (
    id               INTEGER PRIMARY KEY CHECK (id = 1),
    initialized      INTEGER NOT NULL DEFAULT 0,
    initialized_at   TEXT
);

INSERT OR IGNORE INTO anon_state (id, initialized) VALUES (1, 0);
"#;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("state store lock poisoned")]
    Poisoned,

    #[error("Invalid initialized_at timestamp: {0}")]
    Timestamp(String),
}

impl From<rusqlite::Error> for StateError {
    fn from(e: rusqlite::Error) -> Self {
        StateError::Database(e.to_string())
    }
}

/// What [`StateStore::initialize_with`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitTransition {
    /// Flag was already set when the write lock was taken; load skipped.
    AlreadyInitialized,
    /// Load succeeded and the flag is now set.
    Initialized,
    /// Load failed; flag left unset.
    LoadFailed,
    /// Another connection held the write lock past the busy timeout and
    /// the flag was still unset; load skipped.
    Contended,
}

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(Clone)]
pub struct StateStore {
    conn: Arc<Mutex<Connection>>,
}

impl StateStore {
    /// Open a file-backed store.
    pub fn open(path: &Path) -> Result<Self, StateError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Create an in-memory store (for testing).
    pub fn memory() -> Result<Self, StateError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    /// Create store from existing connection (for multi-connection tests).
    pub fn from_connection(conn: Connection) -> Result<Self, StateError> {
        Self::init_connection(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_connection(conn: &Connection) -> Result<(), StateError> {
        // WAL mode for file-backed DBs (no-op for in-memory)
        let _ = conn.execute("PRAGMA journal_mode = WAL", []);
        conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
        conn.execute_batch(STATE_SCHEMA)?;
        Ok(())
    }

    /// How long `initialize_with` waits for another initializer's write lock.
    pub fn with_busy_timeout(self, timeout: Duration) -> Result<Self, StateError> {
        self.lock()?.busy_timeout(timeout)?;
        Ok(self)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StateError> {
        self.conn.lock().map_err(|_| StateError::Poisoned)
    }

    pub fn is_initialized(&self) -> Result<bool, StateError> {
        let conn = self.lock()?;
        read_flag(&conn)
    }

    pub fn initialized_at(&self) -> Result<Option<DateTime<Utc>>, StateError> {
        let conn = self.lock()?;
        let ts: Option<String> = conn
            .query_row(
                "SELECT initialized_at FROM anon_state WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        ts.map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| StateError::Timestamp(e.to_string()))
        })
        .transpose()
    }

    /// Run `load` and set the flag in the same transaction if it reports
    /// success.
    ///
    /// `BEGIN IMMEDIATE` takes the write lock up front, so a second
    /// initializer on another connection waits and then sees the flag. If
    /// the wait outlasts the busy timeout the flag is re-read instead of
    /// failing: set means [`InitTransition::AlreadyInitialized`], unset means
    /// [`InitTransition::Contended`].
    pub fn initialize_with<F>(&self, load: F) -> Result<InitTransition, StateError>
    where
        F: FnOnce() -> bool,
    {
        let conn = self.lock()?;
        if let Err(e) = conn.execute_batch("BEGIN IMMEDIATE") {
            if !is_busy(&e) {
                return Err(e.into());
            }
            tracing::debug!(error = %e, "state store write lock held elsewhere");
            return Ok(if read_flag(&conn)? {
                InitTransition::AlreadyInitialized
            } else {
                InitTransition::Contended
            });
        }

        let result = initialize_inner(&conn, load);

        match &result {
            Ok(InitTransition::Initialized) => {
                if let Err(e) = conn.execute_batch("COMMIT") {
                    let _ = conn.execute_batch("ROLLBACK");
                    return Err(e.into());
                }
            }
            _ => {
                let _ = conn.execute_batch("ROLLBACK");
            }
        }

        result
    }

    /// Clear the flag. Only used on extension reinstall.
    pub fn reset(&self) -> Result<(), StateError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE anon_state SET initialized = 0, initialized_at = NULL WHERE id = 1",
            [],
        )?;
        Ok(())
    }
}

fn read_flag(conn: &Connection) -> Result<bool, StateError> {
    let flag: i64 = conn.query_row(
        "SELECT initialized FROM anon_state WHERE id = 1",
        [],
        |row| row.get(0),
    )?;
    Ok(flag != 0)
}

fn is_busy(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if matches!(err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

fn initialize_inner<F>(conn: &Connection, load: F) -> Result<InitTransition, StateError>
where
    F: FnOnce() -> bool,
{
    if read_flag(conn)? {
        return Ok(InitTransition::AlreadyInitialized);
    }
    if !load() {
        return Ok(InitTransition::LoadFailed);
    }
    conn.execute(
        "UPDATE anon_state SET initialized = 1, initialized_at = ?1 WHERE id = 1",
        params![Utc::now().to_rfc3339()],
    )?;
    Ok(InitTransition::Initialized)
}
