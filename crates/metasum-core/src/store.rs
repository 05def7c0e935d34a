//! Interfaces the summarizer consumes from its backing store.
//!
//! Every call made during one sweep goes through a single implementor that
//! is scoped to one transaction, so the reads, the upserts and the
//! watermark or flag commit become visible together or not at all.

use crate::entry::{LabelRecord, LogEntry, SummaryRecord};
use crate::error::SummarizeError;

/// Read access to the append-only metadata journal, plus the one mutation
/// flag mode needs.
pub trait EventLog {
    /// Entries with `min_id <= entry_id <= max_id`, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`SummarizeError::Store`] if the read fails.
    fn fetch_range(&self, min_id: i64, max_id: i64) -> Result<Vec<LogEntry>, SummarizeError>;

    /// Up to `limit` entries still flagged for summarization.
    ///
    /// # Errors
    ///
    /// Returns [`SummarizeError::Store`] if the read fails.
    fn fetch_flagged(&self, limit: usize) -> Result<Vec<LogEntry>, SummarizeError>;

    /// Mark the given entries as summarized.
    ///
    /// # Errors
    ///
    /// Returns [`SummarizeError::Store`] if the update fails.
    fn clear_flags(&self, entry_ids: &[i64]) -> Result<(), SummarizeError>;

    /// Highest entry id currently in the journal, `None` when it is empty.
    ///
    /// # Errors
    ///
    /// Returns [`SummarizeError::Store`] if the read fails.
    fn max_entry_id(&self) -> Result<Option<i64>, SummarizeError>;
}

/// Persisted sweep positions, one per sweep name.
pub trait WatermarkTracker {
    /// # Errors
    ///
    /// Returns [`SummarizeError::Store`] if the read fails.
    fn get_position(&self, sweep_name: &str) -> Result<Option<i64>, SummarizeError>;

    /// # Errors
    ///
    /// Returns [`SummarizeError::Store`] if the write fails.
    fn set_position(&self, sweep_name: &str, position: i64) -> Result<(), SummarizeError>;
}

/// Summary and label tables.
pub trait SummarySink {
    /// # Errors
    ///
    /// Returns [`SummarizeError::Store`] if the read fails.
    fn get_summary(&self, workflow_id: &str) -> Result<Option<SummaryRecord>, SummarizeError>;

    /// # Errors
    ///
    /// Returns [`SummarizeError::Store`] on write failure, or
    /// [`SummarizeError::Integrity`] if the key turns out not to be unique.
    fn upsert_summary(&self, summary: &SummaryRecord) -> Result<(), SummarizeError>;

    /// # Errors
    ///
    /// Same as [`SummarySink::upsert_summary`].
    fn upsert_label(&self, label: &LabelRecord) -> Result<(), SummarizeError>;
}

/// Everything one sweep needs from a transaction-scoped store.
pub trait SweepStore: EventLog + WatermarkTracker + SummarySink {}

impl<T: EventLog + WatermarkTracker + SummarySink + ?Sized> SweepStore for T {}
