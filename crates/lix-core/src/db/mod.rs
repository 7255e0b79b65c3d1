//! SQLite persistence for lix histories.
//!
//! Runtime defaults:
//! - `journal_mode = WAL` so readers see the last committed state while a
//!   writer appends
//! - `busy_timeout` from [`crate::config::StorageConfig`] (5s by default)
//! - `foreign_keys = ON` so changes cannot point at missing commits or
//!   snapshots

pub mod history;
pub mod migrations;
pub mod query;
pub mod schema;

use rusqlite::Connection;
use std::time::Duration;

pub use history::{SqliteHistory, SqliteReadView};

/// Busy timeout used when no configuration overrides it.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) fn configure_connection(conn: &Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(busy_timeout)?;
    Ok(())
}
