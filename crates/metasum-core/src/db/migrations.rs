//! Schema upgrades for the metadata store.
//!
//! The applied version lives in `PRAGMA user_version`. A fresh file starts at
//! 0 and walks every step; an existing store only runs the steps it lacks.

use super::schema;
use rusqlite::{Connection, types::Type};

/// Schema version written by [`migrate`].
pub const LATEST_SCHEMA_VERSION: u32 = 3;

const MIGRATIONS: &[(u32, &str)] = &[
    (1, schema::MIGRATION_V1_SQL),
    (2, schema::MIGRATION_V2_SQL),
    (3, schema::MIGRATION_V3_SQL),
];

/// Schema version recorded in the store.
///
/// # Errors
///
/// Fails if the pragma cannot be read or holds a negative value.
pub fn current_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    u32::try_from(version).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(0, Type::Integer, Box::new(error))
    })
}

/// Bring the store up to [`LATEST_SCHEMA_VERSION`] and return the version
/// it ends at. Each step commits together with its version bump, so an
/// interrupted upgrade resumes at the first missing step.
///
/// # Errors
///
/// Fails on the first step whose SQL is rejected; earlier steps stay applied.
pub fn migrate(conn: &mut Connection) -> rusqlite::Result<u32> {
    let start = current_schema_version(conn)?;
    let mut current = start;

    for &(version, sql) in MIGRATIONS.iter().filter(|(v, _)| *v > start) {
        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", i64::from(version))?;
        tx.commit()?;
        tracing::debug!(version, "applied metadata store migration");
        current = version;
    }

    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::{LATEST_SCHEMA_VERSION, current_schema_version, migrate};
    use crate::db::schema;
    use rusqlite::{Connection, params};

    fn sqlite_object_exists(
        conn: &Connection,
        object_type: &str,
        object_name: &str,
    ) -> rusqlite::Result<bool> {
        conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = ?1 AND name = ?2
            )",
            params![object_type, object_name],
            |row| row.get(0),
        )
    }

    #[test]
    fn migrate_empty_db_to_latest() -> rusqlite::Result<()> {
        let mut conn = Connection::open_in_memory()?;

        let applied = migrate(&mut conn)?;
        assert_eq!(applied, LATEST_SCHEMA_VERSION);
        assert_eq!(current_schema_version(&conn)?, LATEST_SCHEMA_VERSION);

        for table in ["metadata_entry", "workflow_summary", "custom_label", "summary_status"] {
            assert!(sqlite_object_exists(&conn, "table", table)?, "missing {table}");
        }
        for index in schema::REQUIRED_INDEXES {
            assert!(
                sqlite_object_exists(&conn, "index", index)?,
                "missing expected index {index}"
            );
        }

        Ok(())
    }

    #[test]
    fn migrate_is_idempotent() -> rusqlite::Result<()> {
        let mut conn = Connection::open_in_memory()?;

        assert_eq!(migrate(&mut conn)?, LATEST_SCHEMA_VERSION);
        assert_eq!(migrate(&mut conn)?, LATEST_SCHEMA_VERSION);
        Ok(())
    }

    #[test]
    fn migrate_upgrades_from_v1_keeping_rows() -> rusqlite::Result<()> {
        let mut conn = Connection::open_in_memory()?;

        conn.execute_batch(schema::MIGRATION_V1_SQL)?;
        conn.pragma_update(None, "user_version", 1_i64)?;
        conn.execute(
            "INSERT INTO summary_status (sweep_name, position, updated_at_us)
             VALUES ('INC', 41, 0)",
            [],
        )?;

        assert_eq!(migrate(&mut conn)?, LATEST_SCHEMA_VERSION);

        let position: i64 = conn.query_row(
            "SELECT position FROM summary_status WHERE sweep_name = 'INC'",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(position, 41);
        assert!(sqlite_object_exists(
            &conn,
            "index",
            "idx_metadata_entry_needs_summarization"
        )?);
        Ok(())
    }

    #[test]
    fn upgrade_to_v3_leaves_existing_summaries_without_sources() -> rusqlite::Result<()> {
        let mut conn = Connection::open_in_memory()?;

        conn.execute_batch(schema::MIGRATION_V1_SQL)?;
        conn.execute_batch(schema::MIGRATION_V2_SQL)?;
        conn.pragma_update(None, "user_version", 2_i64)?;
        conn.execute(
            "INSERT INTO workflow_summary (workflow_id, workflow_name) VALUES ('w1', 'hello')",
            [],
        )?;

        assert_eq!(migrate(&mut conn)?, 3);

        let (name, source): (String, Option<i64>) = conn.query_row(
            "SELECT workflow_name, name_entry_id FROM workflow_summary WHERE workflow_id = 'w1'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        assert_eq!(name, "hello");
        assert_eq!(source, None);
        Ok(())
    }
}
