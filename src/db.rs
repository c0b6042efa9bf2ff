use crate::storage::{SessionSignal, SignalHub, StorageArea};
use anyhow::{anyhow, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tokio::sync::broadcast;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS storage (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);";

pub fn open_or_create(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path)?;
    run_migrations(&conn)?;
    Ok(conn)
}

pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

pub fn get_value(conn: &Connection, key: &str) -> Result<Option<String>> {
    let mut stmt = conn.prepare("SELECT value FROM storage WHERE key = ?1 LIMIT 1")?;
    let row = stmt
        .query_row(params![key], |r| r.get::<_, String>(0))
        .optional()?;
    Ok(row)
}

/// Upsert a value. Returns true if the stored value changed.
pub fn put_value(conn: &Connection, key: &str, value: &str) -> Result<bool> {
    if get_value(conn, key)?.as_deref() == Some(value) {
        return Ok(false);
    }
    conn.execute(
        "INSERT INTO storage (key, value, updated_at) VALUES (?1, ?2, strftime('%s','now')) ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = strftime('%s','now')",
        params![key, value],
    )?;
    Ok(true)
}

/// Delete a key. Returns true if a row was removed.
pub fn delete_value(conn: &Connection, key: &str) -> Result<bool> {
    let removed = conn.execute("DELETE FROM storage WHERE key = ?1", params![key])?;
    Ok(removed > 0)
}

/// Storage area persisted to a SQLite file, so a session survives restarts.
/// Change signals only reach consumers in this process; other processes pick
/// up the state on their startup check.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
    hub: SignalHub,
}

impl SqliteStorage {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = open_or_create(path)?;
        Ok(Self {
            conn: Mutex::new(conn),
            hub: SignalHub::new(),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock().map_err(|_| anyhow!("db lock poisoned"))?;
        f(&conn)
    }
}

impl StorageArea for SqliteStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_conn(|c| get_value(c, key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        if self.with_conn(|c| put_value(c, key, value))? {
            self.hub.changed(key);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        if self.with_conn(|c| delete_value(c, key))? {
            self.hub.changed(key);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionSignal> {
        self.hub.subscribe()
    }

    fn notify(&self, signal: SessionSignal) {
        self.hub.send(signal);
    }
}
