//! Rows read from and written to the metadata store.
//!
//! [`LogEntry`] is the immutable input: one line of the append-only metadata
//! journal. [`SummaryRecord`] and [`LabelRecord`] are the derived outputs,
//! one summary per workflow and one label per `(workflow, key)` pair.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry of the metadata journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Journal position. Strictly increasing with insertion order, never reused.
    pub entry_id: i64,
    pub workflow_id: String,
    pub key: String,
    /// Fully-qualified call name for call-scoped entries.
    pub call_name: Option<String>,
    /// Scatter index for call-scoped entries.
    pub job_index: Option<i64>,
    /// Retry attempt for call-scoped entries.
    pub job_attempt: Option<i64>,
    pub value: String,
    /// `true` while the entry still awaits flag-mode summarization.
    pub needs_summarization: Option<bool>,
}

impl LogEntry {
    /// Whether this entry belongs to a call rather than the workflow itself.
    #[must_use]
    pub const fn is_call_scoped(&self) -> bool {
        self.call_name.is_some() || self.job_index.is_some() || self.job_attempt.is_some()
    }
}

/// An entry about to be appended; the store assigns its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLogEntry {
    pub workflow_id: String,
    pub key: String,
    #[serde(default)]
    pub call_name: Option<String>,
    #[serde(default)]
    pub job_index: Option<i64>,
    #[serde(default)]
    pub job_attempt: Option<i64>,
    pub value: String,
}

impl NewLogEntry {
    /// Workflow-scoped entry with no call coordinates.
    pub fn workflow(
        workflow_id: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            key: key.into(),
            call_name: None,
            job_index: None,
            job_attempt: None,
            value: value.into(),
        }
    }

    /// Attach call coordinates, turning this into a call-scoped entry.
    #[must_use]
    pub fn for_call(mut self, call_name: impl Into<String>, index: i64, attempt: i64) -> Self {
        self.call_name = Some(call_name.into());
        self.job_index = Some(index);
        self.job_attempt = Some(attempt);
        self
    }
}

/// Parse newline-delimited JSON metadata entries.
///
/// Blank lines and lines starting with `#` are skipped.
///
/// # Errors
///
/// Returns the 1-based line number and the JSON error of the first line that
/// does not decode into a [`NewLogEntry`].
pub fn parse_jsonl(input: &str) -> Result<Vec<NewLogEntry>, (usize, serde_json::Error)> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !trimmed.starts_with('#')
        })
        .map(|(idx, line)| serde_json::from_str(line).map_err(|e| (idx + 1, e)))
        .collect()
}

/// Lifecycle state of a workflow as recorded in its summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowStatus {
    Submitted,
    #[serde(rename = "On Hold")]
    OnHold,
    Running,
    Aborting,
    Succeeded,
    Failed,
    Aborted,
}

impl WorkflowStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "Submitted",
            Self::OnHold => "On Hold",
            Self::Running => "Running",
            Self::Aborting => "Aborting",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Aborted => "Aborted",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Aborted)
    }

    /// Position in the lifecycle. All terminal states share the highest rank.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Submitted => 0,
            Self::OnHold => 1,
            Self::Running => 2,
            Self::Aborting => 3,
            Self::Succeeded | Self::Failed | Self::Aborted => 4,
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Submitted" => Ok(Self::Submitted),
            "On Hold" | "OnHold" => Ok(Self::OnHold),
            "Running" => Ok(Self::Running),
            "Aborting" => Ok(Self::Aborting),
            "Succeeded" => Ok(Self::Succeeded),
            "Failed" => Ok(Self::Failed),
            "Aborted" => Ok(Self::Aborted),
            other => Err(format!("unknown workflow status '{other}'")),
        }
    }
}

/// Archival state of a workflow's raw metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArchiveStatus {
    #[default]
    Unarchived,
    Archived,
    ArchivedAndDeleted,
    ArchiveFailed,
}

impl ArchiveStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unarchived => "Unarchived",
            Self::Archived => "Archived",
            Self::ArchivedAndDeleted => "ArchivedAndDeleted",
            Self::ArchiveFailed => "ArchiveFailed",
        }
    }
}

impl fmt::Display for ArchiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArchiveStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Unarchived" => Ok(Self::Unarchived),
            "Archived" => Ok(Self::Archived),
            "ArchivedAndDeleted" => Ok(Self::ArchivedAndDeleted),
            "ArchiveFailed" => Ok(Self::ArchiveFailed),
            other => Err(format!("unknown archive status '{other}'")),
        }
    }
}

/// Per-workflow summary. The engine only looks at `workflow_id`; every other
/// field belongs to the reducer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub workflow_id: String,
    pub workflow_name: Option<String>,
    pub status: Option<WorkflowStatus>,
    pub submission_time: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub parent_workflow_id: Option<String>,
    pub root_workflow_id: Option<String>,
    pub archive_status: ArchiveStatus,
    #[serde(default)]
    pub sources: FieldSources,
}

/// Journal ids of the entries that supplied the last-writer fields of a
/// [`SummaryRecord`]. `None` means the field was never set from the journal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSources {
    pub workflow_name: Option<i64>,
    pub status: Option<i64>,
    pub parent_workflow_id: Option<i64>,
    pub root_workflow_id: Option<i64>,
}

impl SummaryRecord {
    /// Empty summary for a workflow seen for the first time.
    pub fn new(workflow_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            ..Self::default()
        }
    }
}

/// A custom label attached to a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelRecord {
    pub workflow_id: String,
    pub key: String,
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_scoped_if_any_call_coordinate_present() {
        let base = LogEntry {
            entry_id: 1,
            workflow_id: "w1".into(),
            key: "status".into(),
            call_name: None,
            job_index: None,
            job_attempt: None,
            value: "Running".into(),
            needs_summarization: Some(true),
        };
        assert!(!base.is_call_scoped());

        let with_attempt = LogEntry {
            job_attempt: Some(1),
            ..base.clone()
        };
        assert!(with_attempt.is_call_scoped());

        let with_call = LogEntry {
            call_name: Some("wf.task".into()),
            ..base
        };
        assert!(with_call.is_call_scoped());
    }

    #[test]
    fn status_round_trips_through_display() {
        for status in [
            WorkflowStatus::Submitted,
            WorkflowStatus::OnHold,
            WorkflowStatus::Running,
            WorkflowStatus::Aborting,
            WorkflowStatus::Succeeded,
            WorkflowStatus::Failed,
            WorkflowStatus::Aborted,
        ] {
            assert_eq!(status.to_string().parse::<WorkflowStatus>(), Ok(status));
        }
        assert!("Exploded".parse::<WorkflowStatus>().is_err());
    }

    #[test]
    fn terminal_states_outrank_everything() {
        assert!(WorkflowStatus::Failed.rank() > WorkflowStatus::Aborting.rank());
        assert!(WorkflowStatus::Running.rank() > WorkflowStatus::Submitted.rank());
        assert!(WorkflowStatus::Aborted.is_terminal());
        assert!(!WorkflowStatus::Aborting.is_terminal());
    }

    #[test]
    fn parse_jsonl_skips_blanks_and_comments() {
        let input = r#"
# exported from staging
{"workflow_id":"w1","key":"status","value":"Running"}

{"workflow_id":"w1","key":"stdout","call_name":"wf.a","job_index":-1,"job_attempt":1,"value":"gs://x"}
"#;
        let entries = parse_jsonl(input).expect("parse");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], NewLogEntry::workflow("w1", "status", "Running"));
        assert_eq!(entries[1].call_name.as_deref(), Some("wf.a"));
    }

    #[test]
    fn parse_jsonl_reports_line_number() {
        let input = "{\"workflow_id\":\"w1\",\"key\":\"k\",\"value\":\"v\"}\nnot json\n";
        let (line, _) = parse_jsonl(input).expect_err("second line is invalid");
        assert_eq!(line, 2);
    }
}
