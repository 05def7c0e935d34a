//! SQLite implementation of the sweep store traits.
//!
//! A [`SqliteBatch`] borrows an open transaction. It never begins or commits
//! anything itself; the summarizer owns the transaction boundary.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use super::query::{self, ENTRY_COLUMNS, entry_from_row};
use super::upsert::UpsertStrategy;
use crate::entry::{LabelRecord, LogEntry, SummaryRecord};
use crate::error::SummarizeError;
use crate::store::{EventLog, SummarySink, WatermarkTracker};

pub struct SqliteBatch<'a> {
    conn: &'a Connection,
    upsert: &'a dyn UpsertStrategy,
}

impl<'a> SqliteBatch<'a> {
    /// Wrap a connection (normally a `rusqlite::Transaction`, which derefs
    /// to one) with the deployment's upsert strategy.
    pub const fn new(conn: &'a Connection, upsert: &'a dyn UpsertStrategy) -> Self {
        Self { conn, upsert }
    }
}

impl EventLog for SqliteBatch<'_> {
    fn fetch_range(&self, min_id: i64, max_id: i64) -> Result<Vec<LogEntry>, SummarizeError> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {ENTRY_COLUMNS} FROM metadata_entry
             WHERE entry_id BETWEEN ?1 AND ?2
             ORDER BY entry_id"
        ))?;
        let rows = stmt.query_map(params![min_id, max_id], entry_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn fetch_flagged(&self, limit: usize) -> Result<Vec<LogEntry>, SummarizeError> {
        let limit = i64::try_from(limit).map_err(|_| SummarizeError::InvalidLimit(limit))?;
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {ENTRY_COLUMNS} FROM metadata_entry
             WHERE needs_summarization = 1
             ORDER BY entry_id
             LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit], entry_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn clear_flags(&self, entry_ids: &[i64]) -> Result<(), SummarizeError> {
        let mut stmt = self.conn.prepare_cached(
            "UPDATE metadata_entry SET needs_summarization = 0 WHERE entry_id = ?1",
        )?;
        for id in entry_ids {
            stmt.execute(params![id])?;
        }
        Ok(())
    }

    fn max_entry_id(&self) -> Result<Option<i64>, SummarizeError> {
        Ok(self
            .conn
            .query_row("SELECT MAX(entry_id) FROM metadata_entry", [], |row| {
                row.get(0)
            })?)
    }
}

impl WatermarkTracker for SqliteBatch<'_> {
    fn get_position(&self, sweep_name: &str) -> Result<Option<i64>, SummarizeError> {
        Ok(self
            .conn
            .prepare_cached("SELECT position FROM summary_status WHERE sweep_name = ?1")?
            .query_row(params![sweep_name], |row| row.get(0))
            .optional()?)
    }

    fn set_position(&self, sweep_name: &str, position: i64) -> Result<(), SummarizeError> {
        self.conn
            .prepare_cached(
                "INSERT INTO summary_status (sweep_name, position, updated_at_us)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(sweep_name) DO UPDATE SET
                    position = excluded.position,
                    updated_at_us = excluded.updated_at_us",
            )?
            .execute(params![sweep_name, position, Utc::now().timestamp_micros()])?;
        Ok(())
    }
}

impl SummarySink for SqliteBatch<'_> {
    fn get_summary(&self, workflow_id: &str) -> Result<Option<SummaryRecord>, SummarizeError> {
        Ok(query::get_summary(self.conn, workflow_id)?)
    }

    fn upsert_summary(&self, summary: &SummaryRecord) -> Result<(), SummarizeError> {
        self.upsert.upsert_summary(self.conn, summary)
    }

    fn upsert_label(&self, label: &LabelRecord) -> Result<(), SummarizeError> {
        self.upsert.upsert_label(self.conn, label)
    }
}
