//! Read helpers and the journal append primitive.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params, types::Type};

use crate::entry::{
    ArchiveStatus, FieldSources, LabelRecord, LogEntry, NewLogEntry, SummaryRecord,
};

pub(crate) const ENTRY_COLUMNS: &str = "entry_id, workflow_id, metadata_key, call_name, \
     job_index, job_attempt, metadata_value, needs_summarization";

const SUMMARY_COLUMNS: &str = "workflow_id, workflow_name, workflow_status, submission_at_us, \
     start_at_us, end_at_us, parent_workflow_id, root_workflow_id, archive_status, \
     name_entry_id, status_entry_id, parent_entry_id, root_entry_id";

/// Append entries to the journal in one transaction, flagged for
/// summarization. Returns the assigned ids in input order.
///
/// # Errors
///
/// Returns an error if any insert fails; nothing is appended in that case.
pub fn append_entries(conn: &mut Connection, entries: &[NewLogEntry]) -> Result<Vec<i64>> {
    let now_us = Utc::now().timestamp_micros();
    let tx = conn.transaction().context("begin append transaction")?;
    let mut ids = Vec::with_capacity(entries.len());
    {
        let mut stmt = tx
            .prepare_cached(
                "INSERT INTO metadata_entry (
                    workflow_id, metadata_key, call_name, job_index, job_attempt,
                    metadata_value, needs_summarization, created_at_us
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7)",
            )
            .context("prepare journal insert")?;
        for entry in entries {
            stmt.execute(params![
                entry.workflow_id,
                entry.key,
                entry.call_name,
                entry.job_index,
                entry.job_attempt,
                entry.value,
                now_us,
            ])
            .with_context(|| format!("append {} for {}", entry.key, entry.workflow_id))?;
            ids.push(tx.last_insert_rowid());
        }
    }
    tx.commit().context("commit append transaction")?;
    Ok(ids)
}

/// Load one workflow summary.
///
/// # Errors
///
/// Returns an error if the query fails or a stored value cannot be decoded.
pub fn get_summary(conn: &Connection, workflow_id: &str) -> rusqlite::Result<Option<SummaryRecord>> {
    conn.prepare_cached(&format!(
        "SELECT {SUMMARY_COLUMNS} FROM workflow_summary WHERE workflow_id = ?1"
    ))?
    .query_row(params![workflow_id], summary_from_row)
    .optional()
}

/// All summaries ordered by workflow id.
///
/// # Errors
///
/// Returns an error if the query fails or a stored value cannot be decoded.
pub fn list_summaries(conn: &Connection) -> rusqlite::Result<Vec<SummaryRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SUMMARY_COLUMNS} FROM workflow_summary ORDER BY workflow_id"
    ))?;
    let rows = stmt.query_map([], summary_from_row)?;
    rows.collect()
}

/// Labels of one workflow ordered by key.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn labels_for(conn: &Connection, workflow_id: &str) -> rusqlite::Result<Vec<LabelRecord>> {
    let mut stmt = conn.prepare_cached(
        "SELECT workflow_id, label_key, label_value
         FROM custom_label WHERE workflow_id = ?1 ORDER BY label_key",
    )?;
    let rows = stmt.query_map(params![workflow_id], |row| {
        Ok(LabelRecord {
            workflow_id: row.get(0)?,
            key: row.get(1)?,
            value: row.get(2)?,
        })
    })?;
    rows.collect()
}

/// Every label row ordered by workflow then key.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_labels(conn: &Connection) -> rusqlite::Result<Vec<LabelRecord>> {
    let mut stmt = conn.prepare(
        "SELECT workflow_id, label_key, label_value
         FROM custom_label ORDER BY workflow_id, label_key",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(LabelRecord {
            workflow_id: row.get(0)?,
            key: row.get(1)?,
            value: row.get(2)?,
        })
    })?;
    rows.collect()
}

/// Record the archive state of a workflow's metadata.
///
/// Returns `false` when no summary exists for `workflow_id`.
///
/// # Errors
///
/// Returns an error if the update fails.
pub fn set_archive_status(
    conn: &Connection,
    workflow_id: &str,
    status: ArchiveStatus,
) -> Result<bool> {
    let updated = conn
        .execute(
            "UPDATE workflow_summary SET archive_status = ?1 WHERE workflow_id = ?2",
            params![status.as_str(), workflow_id],
        )
        .with_context(|| format!("set archive status of {workflow_id}"))?;
    Ok(updated > 0)
}

/// Number of journal entries still flagged for summarization.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn count_flagged(conn: &Connection) -> rusqlite::Result<u64> {
    conn.query_row(
        "SELECT COUNT(*) FROM metadata_entry WHERE needs_summarization = 1",
        [],
        |row| row.get(0),
    )
}

pub(crate) fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<LogEntry> {
    Ok(LogEntry {
        entry_id: row.get(0)?,
        workflow_id: row.get(1)?,
        key: row.get(2)?,
        call_name: row.get(3)?,
        job_index: row.get(4)?,
        job_attempt: row.get(5)?,
        value: row.get(6)?,
        needs_summarization: row.get(7)?,
    })
}

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<SummaryRecord> {
    let status: Option<String> = row.get(2)?;
    let archive: String = row.get(8)?;
    Ok(SummaryRecord {
        workflow_id: row.get(0)?,
        workflow_name: row.get(1)?,
        status: status.map(|s| parse_text(2, &s)).transpose()?,
        submission_time: micros_to_datetime(3, row.get(3)?)?,
        start_time: micros_to_datetime(4, row.get(4)?)?,
        end_time: micros_to_datetime(5, row.get(5)?)?,
        parent_workflow_id: row.get(6)?,
        root_workflow_id: row.get(7)?,
        archive_status: parse_text(8, &archive)?,
        sources: FieldSources {
            workflow_name: row.get(9)?,
            status: row.get(10)?,
            parent_workflow_id: row.get(11)?,
            root_workflow_id: row.get(12)?,
        },
    })
}

fn parse_text<T>(idx: usize, raw: &str) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    raw.parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn micros_to_datetime(idx: usize, micros: Option<i64>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    micros
        .map(|us| {
            DateTime::<Utc>::from_timestamp_micros(us).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    Type::Integer,
                    format!("timestamp {us}us out of range").into(),
                )
            })
        })
        .transpose()
}
