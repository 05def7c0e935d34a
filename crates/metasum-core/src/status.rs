//! Read-only progress report for the sweeps.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

use crate::config::SweepNames;
use crate::db::query;
use crate::summarizer::NO_WATERMARK;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepStatus {
    pub name: String,
    /// Committed watermark, `None` before the first commit.
    pub position: Option<i64>,
    /// Ids this sweep has yet to cover.
    pub remaining: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub max_entry_id: Option<i64>,
    pub entries: u64,
    pub flagged: u64,
    pub summaries: u64,
    pub labels: u64,
    pub increasing: SweepStatus,
    pub decreasing: SweepStatus,
}

/// Gather counters and watermark positions.
///
/// `remaining` for the decreasing sweep mirrors how it seeds itself: its own
/// position if committed, else one past the increasing watermark.
///
/// # Errors
///
/// Returns an error if any of the underlying queries fail.
pub fn status_report(conn: &Connection, names: &SweepNames) -> Result<StatusReport> {
    let (max_entry_id, entries): (Option<i64>, u64) = conn
        .query_row(
            "SELECT MAX(entry_id), COUNT(*) FROM metadata_entry",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .context("read journal bounds")?;

    let flagged = query::count_flagged(conn).context("count flagged entries")?;
    let summaries = count_rows(conn, "workflow_summary")?;
    let labels = count_rows(conn, "custom_label")?;

    let (inc_position, inc_updated) = watermark(conn, &names.increasing)?;
    let (dec_position, dec_updated) = watermark(conn, &names.decreasing)?;

    let inc_remaining = max_entry_id.map_or(0, |max| {
        non_negative(max.saturating_sub(inc_position.unwrap_or(NO_WATERMARK)))
    });
    let dec_remaining = dec_position
        .or_else(|| inc_position.map(|p| p.saturating_add(1)))
        .map_or(0, non_negative);

    Ok(StatusReport {
        max_entry_id,
        entries,
        flagged,
        summaries,
        labels,
        increasing: SweepStatus {
            name: names.increasing.clone(),
            position: inc_position,
            remaining: inc_remaining,
            updated_at: inc_updated,
        },
        decreasing: SweepStatus {
            name: names.decreasing.clone(),
            position: dec_position,
            remaining: dec_remaining,
            updated_at: dec_updated,
        },
    })
}

fn watermark(conn: &Connection, sweep_name: &str) -> Result<(Option<i64>, Option<DateTime<Utc>>)> {
    let row: Option<(i64, i64)> = conn
        .query_row(
            "SELECT position, updated_at_us FROM summary_status WHERE sweep_name = ?1",
            params![sweep_name],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .with_context(|| format!("read watermark {sweep_name}"))?;

    Ok(row.map_or((None, None), |(position, updated_us)| {
        (
            Some(position),
            DateTime::<Utc>::from_timestamp_micros(updated_us),
        )
    }))
}

fn count_rows(conn: &Connection, table: &str) -> Result<u64> {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get(0)
    })
    .with_context(|| format!("count rows in {table}"))
}

fn non_negative(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SummarizerConfig;
    use crate::db::open_in_memory;
    use crate::entry::NewLogEntry;
    use crate::reducer::WorkflowSummaryReducer;
    use crate::summarizer::Summarizer;

    #[test]
    fn empty_store_reports_nothing_to_do() {
        let conn = open_in_memory().expect("db");
        let report = status_report(&conn, &SweepNames::default()).expect("status");
        assert_eq!(report.max_entry_id, None);
        assert_eq!(report.entries, 0);
        assert_eq!(report.increasing.position, None);
        assert_eq!(report.increasing.remaining, 0);
        assert_eq!(report.decreasing.remaining, 0);
    }

    #[test]
    fn report_tracks_sweep_progress() {
        let mut conn = open_in_memory().expect("db");
        query::append_entries(
            &mut conn,
            &(0..4)
                .map(|_| NewLogEntry::workflow("w1", "status", "Running"))
                .collect::<Vec<_>>(),
        )
        .expect("append");
        let config = SummarizerConfig::default();
        let summarizer = Summarizer::from_config(&config).expect("summarizer");

        let before = status_report(&conn, &config.sweeps).expect("status");
        assert_eq!(before.increasing.remaining, 5, "ids 0..=4 from watermark -1");
        assert_eq!(before.flagged, 4);

        summarizer
            .run_increasing_sweep(&mut conn, &config.sweeps.increasing, 3, &WorkflowSummaryReducer)
            .expect("sweep");

        let after = status_report(&conn, &config.sweeps).expect("status");
        assert_eq!(after.increasing.position, Some(2));
        assert_eq!(after.increasing.remaining, 2);
        assert!(after.increasing.updated_at.is_some());
        assert_eq!(after.decreasing.position, None);
        assert_eq!(after.decreasing.remaining, 3);
        assert_eq!(after.summaries, 1);
        assert_eq!(after.flagged, 4, "window sweeps leave flags alone");
    }
}
