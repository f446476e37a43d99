pub mod migrations;
pub mod queries;

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Context;
use rusqlite::Connection;

use crate::errors::AppError;

pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

pub fn init_db(path: &str) -> anyhow::Result<Connection> {
    open_db(path, DEFAULT_BUSY_TIMEOUT)
}

/// Open a connection whose writers give up after `busy_timeout` waiting on the lock.
pub fn open_db(path: &str, busy_timeout: Duration) -> anyhow::Result<Connection> {
    let conn = Connection::open(path).context("failed to open database")?;

    conn.busy_timeout(busy_timeout)
        .context("failed to set busy timeout")?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
        .context("failed to set database pragmas")?;

    migrations::run_migrations(&conn)?;

    Ok(conn)
}

pub fn lock(db: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>, AppError> {
    db.lock()
        .map_err(|_| AppError::Store(anyhow::anyhow!("database mutex poisoned")))
}
