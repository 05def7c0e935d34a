//! Insert-or-update of summary and label rows.
//!
//! Two interchangeable strategies implement [`UpsertStrategy`]; one is
//! chosen per deployment through [`crate::config::UpsertMode`] and never
//! mixed. [`UpdateThenInsert`] relies on the enclosing sweep transaction for
//! atomicity and is not safe against a second writer on the same key.

use std::fmt;

use rusqlite::{Connection, ToSql, params};

use crate::config::UpsertMode;
use crate::entry::{FieldSources, LabelRecord, SummaryRecord};
use crate::error::SummarizeError;

pub trait UpsertStrategy: fmt::Debug + Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Persist `summary` so that a subsequent read returns exactly it.
    ///
    /// # Errors
    ///
    /// Returns [`SummarizeError::Store`] if a statement fails, or
    /// [`SummarizeError::Integrity`] if the key matches more than one row.
    fn upsert_summary(&self, conn: &Connection, summary: &SummaryRecord)
    -> Result<(), SummarizeError>;

    /// Persist `label`, overwriting any previous value for its key.
    ///
    /// # Errors
    ///
    /// Same as [`UpsertStrategy::upsert_summary`].
    fn upsert_label(&self, conn: &Connection, label: &LabelRecord) -> Result<(), SummarizeError>;
}

/// Build the strategy selected by configuration.
#[must_use]
pub fn strategy_for(mode: UpsertMode) -> Box<dyn UpsertStrategy> {
    match mode {
        UpsertMode::Native => Box::new(NativeUpsert),
        UpsertMode::UpdateThenInsert => Box::new(UpdateThenInsert),
    }
}

/// `INSERT ... ON CONFLICT DO UPDATE` in a single statement.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeUpsert;

impl UpsertStrategy for NativeUpsert {
    fn name(&self) -> &'static str {
        "native"
    }

    fn upsert_summary(
        &self,
        conn: &Connection,
        summary: &SummaryRecord,
    ) -> Result<(), SummarizeError> {
        let row = SummaryRow::from(summary);
        conn.prepare_cached(
            "INSERT INTO workflow_summary (
                workflow_id, workflow_name, workflow_status, submission_at_us,
                start_at_us, end_at_us, parent_workflow_id, root_workflow_id,
                archive_status, name_entry_id, status_entry_id, parent_entry_id,
                root_entry_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT(workflow_id) DO UPDATE SET
                workflow_name = excluded.workflow_name,
                workflow_status = excluded.workflow_status,
                submission_at_us = excluded.submission_at_us,
                start_at_us = excluded.start_at_us,
                end_at_us = excluded.end_at_us,
                parent_workflow_id = excluded.parent_workflow_id,
                root_workflow_id = excluded.root_workflow_id,
                archive_status = excluded.archive_status,
                name_entry_id = excluded.name_entry_id,
                status_entry_id = excluded.status_entry_id,
                parent_entry_id = excluded.parent_entry_id,
                root_entry_id = excluded.root_entry_id",
        )?
        .execute(&row.params())?;
        Ok(())
    }

    fn upsert_label(&self, conn: &Connection, label: &LabelRecord) -> Result<(), SummarizeError> {
        conn.prepare_cached(
            "INSERT INTO custom_label (workflow_id, label_key, label_value)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(workflow_id, label_key) DO UPDATE SET
                label_value = excluded.label_value",
        )?
        .execute(params![label.workflow_id, label.key, label.value])?;
        Ok(())
    }
}

/// `UPDATE` by key; `INSERT` when no row matched.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateThenInsert;

impl UpsertStrategy for UpdateThenInsert {
    fn name(&self) -> &'static str {
        "update_then_insert"
    }

    fn upsert_summary(
        &self,
        conn: &Connection,
        summary: &SummaryRecord,
    ) -> Result<(), SummarizeError> {
        let row = SummaryRow::from(summary);
        let updated = conn
            .prepare_cached(
                "UPDATE workflow_summary SET
                    workflow_name = ?2,
                    workflow_status = ?3,
                    submission_at_us = ?4,
                    start_at_us = ?5,
                    end_at_us = ?6,
                    parent_workflow_id = ?7,
                    root_workflow_id = ?8,
                    archive_status = ?9,
                    name_entry_id = ?10,
                    status_entry_id = ?11,
                    parent_entry_id = ?12,
                    root_entry_id = ?13
                 WHERE workflow_id = ?1",
            )?
            .execute(&row.params())?;

        match updated {
            0 => {
                conn.prepare_cached(
                    "INSERT INTO workflow_summary (
                        workflow_id, workflow_name, workflow_status, submission_at_us,
                        start_at_us, end_at_us, parent_workflow_id, root_workflow_id,
                        archive_status, name_entry_id, status_entry_id, parent_entry_id,
                        root_entry_id
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                )?
                .execute(&row.params())?;
                Ok(())
            }
            1 => Ok(()),
            rows => Err(integrity_violation(
                "workflow_summary",
                summary.workflow_id.clone(),
                rows,
            )),
        }
    }

    fn upsert_label(&self, conn: &Connection, label: &LabelRecord) -> Result<(), SummarizeError> {
        let updated = conn
            .prepare_cached(
                "UPDATE custom_label SET label_value = ?3
                 WHERE workflow_id = ?1 AND label_key = ?2",
            )?
            .execute(params![label.workflow_id, label.key, label.value])?;

        match updated {
            0 => {
                conn.prepare_cached(
                    "INSERT INTO custom_label (workflow_id, label_key, label_value)
                     VALUES (?1, ?2, ?3)",
                )?
                .execute(params![label.workflow_id, label.key, label.value])?;
                Ok(())
            }
            1 => Ok(()),
            rows => Err(integrity_violation(
                "custom_label",
                format!("{}/{}", label.workflow_id, label.key),
                rows,
            )),
        }
    }
}

fn integrity_violation(table: &'static str, key: String, rows: usize) -> SummarizeError {
    tracing::error!(table, key = %key, rows, "upsert update matched more than one row");
    SummarizeError::Integrity { table, key, rows }
}

/// Column values of a summary in `workflow_summary` order.
struct SummaryRow<'a> {
    workflow_id: &'a str,
    workflow_name: Option<&'a str>,
    status: Option<&'static str>,
    submission_at_us: Option<i64>,
    start_at_us: Option<i64>,
    end_at_us: Option<i64>,
    parent_workflow_id: Option<&'a str>,
    root_workflow_id: Option<&'a str>,
    archive_status: &'static str,
    sources: FieldSources,
}

impl<'a> From<&'a SummaryRecord> for SummaryRow<'a> {
    fn from(summary: &'a SummaryRecord) -> Self {
        Self {
            workflow_id: &summary.workflow_id,
            workflow_name: summary.workflow_name.as_deref(),
            status: summary.status.map(|s| s.as_str()),
            submission_at_us: summary.submission_time.map(|t| t.timestamp_micros()),
            start_at_us: summary.start_time.map(|t| t.timestamp_micros()),
            end_at_us: summary.end_time.map(|t| t.timestamp_micros()),
            parent_workflow_id: summary.parent_workflow_id.as_deref(),
            root_workflow_id: summary.root_workflow_id.as_deref(),
            archive_status: summary.archive_status.as_str(),
            sources: summary.sources,
        }
    }
}

impl SummaryRow<'_> {
    fn params(&self) -> [&dyn ToSql; 13] {
        [
            &self.workflow_id,
            &self.workflow_name,
            &self.status,
            &self.submission_at_us,
            &self.start_at_us,
            &self.end_at_us,
            &self.parent_workflow_id,
            &self.root_workflow_id,
            &self.archive_status,
            &self.sources.workflow_name,
            &self.sources.status,
            &self.sources.parent_workflow_id,
            &self.sources.root_workflow_id,
        ]
    }
}
