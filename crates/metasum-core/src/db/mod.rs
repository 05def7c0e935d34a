//! SQLite metadata store.
//!
//! Runtime defaults follow the usual single-writer setup:
//! - `journal_mode = WAL` so readers are not blocked while a sweep commits
//! - `busy_timeout = 5s` so a sweep waits out a concurrent writer instead of
//!   failing immediately
//! - `synchronous = NORMAL`, which is durable at commit boundaries under WAL

pub mod batch;
pub mod migrations;
pub mod query;
pub mod schema;
pub mod upsert;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::{path::Path, time::Duration};

pub use batch::SqliteBatch;
pub use upsert::{NativeUpsert, UpdateThenInsert, UpsertStrategy};

/// Busy timeout used for metadata store connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open (or create) the metadata store, apply runtime pragmas, and migrate
/// the schema to the latest version.
///
/// # Errors
///
/// Returns an error if opening/configuring/migrating the database fails.
pub fn open_store(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create metadata db directory {}", parent.display()))?;
    }

    let mut conn = Connection::open(path)
        .with_context(|| format!("open metadata database {}", path.display()))?;

    configure_connection(&conn).context("configure sqlite pragmas")?;
    migrations::migrate(&mut conn).context("apply metadata store migrations")?;

    Ok(conn)
}

/// Open a migrated in-memory store. Used by tests and benchmarks.
///
/// # Errors
///
/// Returns an error if the migration fails.
pub fn open_in_memory() -> Result<Connection> {
    let mut conn = Connection::open_in_memory().context("open in-memory metadata database")?;
    migrations::migrate(&mut conn).context("apply metadata store migrations")?;
    Ok(conn)
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}
