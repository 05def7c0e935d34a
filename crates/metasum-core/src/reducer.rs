//! Folding journal entries into a workflow summary.
//!
//! A [`Reducer`] is handed the previous summary (if any) and the batch of
//! scalar entries for one workflow, in journal order, and returns the full
//! replacement summary. It must be pure: the engine re-runs it over the same
//! input after a failed batch.
//!
//! Closures of the right shape are reducers too, so callers can pass
//! `&|prev, batch| ...` without declaring a type.

use chrono::{DateTime, Utc};

use crate::config::keys;
use crate::entry::{LogEntry, SummaryRecord, WorkflowStatus};

pub trait Reducer {
    /// Fold `batch` into `previous`. `batch` is never empty and every entry
    /// in it carries the same workflow id.
    fn reduce(&self, previous: Option<&SummaryRecord>, batch: &[LogEntry]) -> SummaryRecord;
}

impl<F> Reducer for F
where
    F: Fn(Option<&SummaryRecord>, &[LogEntry]) -> SummaryRecord,
{
    fn reduce(&self, previous: Option<&SummaryRecord>, batch: &[LogEntry]) -> SummaryRecord {
        self(previous, batch)
    }
}

/// The reducer used for workflow-level summaries.
///
/// Every field folds to the same value whatever order the batches arrive
/// in, which the decreasing sweep relies on.
///
/// - name, parent and root ids: the value from the highest entry id seen,
///   tracked in [`SummaryRecord::sources`]
/// - status: highest lifecycle rank wins; ties between terminal states go
///   to the highest entry id
/// - submission and start: earliest timestamp; end: latest timestamp
/// - a workflow without a root id is its own root
///
/// Values that do not parse (unknown statuses, malformed timestamps) are
/// skipped rather than failing the batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkflowSummaryReducer;

impl Reducer for WorkflowSummaryReducer {
    fn reduce(&self, previous: Option<&SummaryRecord>, batch: &[LogEntry]) -> SummaryRecord {
        let mut summary = match (previous, batch.first()) {
            (Some(prev), _) => prev.clone(),
            (None, Some(first)) => SummaryRecord::new(first.workflow_id.clone()),
            (None, None) => SummaryRecord::default(),
        };

        for entry in batch {
            let id = entry.entry_id;
            let sources = &mut summary.sources;
            match entry.key.as_str() {
                keys::WORKFLOW_NAME => {
                    if newer(id, &mut sources.workflow_name) {
                        summary.workflow_name = Some(entry.value.clone());
                    }
                }
                keys::STATUS => match entry.value.parse::<WorkflowStatus>() {
                    Ok(status) => {
                        let held = summary.status.map(|s| (s.rank(), sources.status));
                        if held < Some((status.rank(), Some(id))) {
                            summary.status = Some(status);
                            sources.status = Some(id);
                        }
                    }
                    Err(_) => tracing::debug!(
                        workflow_id = %entry.workflow_id,
                        value = %entry.value,
                        "skipping unrecognized workflow status"
                    ),
                },
                keys::SUBMISSION => {
                    summary.submission_time = earliest(summary.submission_time, &entry.value);
                }
                keys::START => summary.start_time = earliest(summary.start_time, &entry.value),
                keys::END => summary.end_time = latest(summary.end_time, &entry.value),
                keys::PARENT_WORKFLOW_ID => {
                    if newer(id, &mut sources.parent_workflow_id) {
                        summary.parent_workflow_id = Some(entry.value.clone());
                    }
                }
                keys::ROOT_WORKFLOW_ID => {
                    if newer(id, &mut sources.root_workflow_id) {
                        summary.root_workflow_id = Some(entry.value.clone());
                    }
                }
                _ => {}
            }
        }

        if summary.root_workflow_id.is_none() {
            summary.root_workflow_id = Some(summary.workflow_id.clone());
        }

        summary
    }
}

/// Claim `source` for entry `id` if it is newer than the current holder.
fn newer(id: i64, source: &mut Option<i64>) -> bool {
    if source.is_some_and(|held| held >= id) {
        return false;
    }
    *source = Some(id);
    true
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

fn earliest(current: Option<DateTime<Utc>>, raw: &str) -> Option<DateTime<Utc>> {
    match (current, parse_timestamp(raw)) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn latest(current: Option<DateTime<Utc>>, raw: &str) -> Option<DateTime<Utc>> {
    match (current, parse_timestamp(raw)) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(id: i64, key: &str, value: &str) -> LogEntry {
        LogEntry {
            entry_id: id,
            workflow_id: "w1".into(),
            key: key.into(),
            call_name: None,
            job_index: None,
            job_attempt: None,
            value: value.into(),
            needs_summarization: None,
        }
    }

    #[test]
    fn first_fold_builds_summary_from_scratch() {
        let batch = vec![
            entry(1, "workflowName", "hello"),
            entry(2, "status", "Submitted"),
            entry(3, "submission", "2024-03-01T10:00:00Z"),
            entry(4, "status", "Running"),
            entry(5, "start", "2024-03-01T10:00:05.250Z"),
        ];
        let summary = WorkflowSummaryReducer.reduce(None, &batch);

        assert_eq!(summary.workflow_id, "w1");
        assert_eq!(summary.workflow_name.as_deref(), Some("hello"));
        assert_eq!(summary.status, Some(WorkflowStatus::Running));
        assert_eq!(
            summary.submission_time,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap())
        );
        assert!(summary.start_time.is_some());
        assert_eq!(summary.end_time, None);
        assert_eq!(summary.root_workflow_id.as_deref(), Some("w1"));
    }

    #[test]
    fn terminal_status_is_not_replaced_by_late_running() {
        let first = WorkflowSummaryReducer.reduce(None, &[entry(1, "status", "Succeeded")]);
        let second = WorkflowSummaryReducer.reduce(Some(&first), &[entry(2, "status", "Running")]);
        assert_eq!(second.status, Some(WorkflowStatus::Succeeded));
    }

    #[test]
    fn previous_fields_survive_batches_that_do_not_mention_them() {
        let first = WorkflowSummaryReducer.reduce(
            None,
            &[
                entry(1, "workflowName", "hello"),
                entry(2, "parentWorkflowId", "p1"),
                entry(3, "rootWorkflowId", "r1"),
            ],
        );
        let second = WorkflowSummaryReducer.reduce(
            Some(&first),
            &[entry(4, "end", "2024-03-01T11:00:00+01:00")],
        );

        assert_eq!(second.workflow_name.as_deref(), Some("hello"));
        assert_eq!(second.parent_workflow_id.as_deref(), Some("p1"));
        assert_eq!(second.root_workflow_id.as_deref(), Some("r1"));
        assert_eq!(
            second.end_time,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap())
        );
    }

    #[test]
    fn explicit_root_replaces_self_root() {
        let first = WorkflowSummaryReducer.reduce(None, &[entry(1, "status", "Running")]);
        assert_eq!(first.root_workflow_id.as_deref(), Some("w1"));

        let second =
            WorkflowSummaryReducer.reduce(Some(&first), &[entry(2, "rootWorkflowId", "r9")]);
        assert_eq!(second.root_workflow_id.as_deref(), Some("r9"));
    }

    #[test]
    fn fold_order_across_batches_does_not_matter() {
        let older = vec![
            entry(1, "status", "Submitted"),
            entry(2, "submission", "2024-03-01T10:00:00Z"),
            entry(3, "start", "2024-03-01T10:01:00Z"),
        ];
        let newer = vec![
            entry(4, "status", "Failed"),
            entry(5, "end", "2024-03-01T12:00:00Z"),
        ];

        let forward = WorkflowSummaryReducer.reduce(
            Some(&WorkflowSummaryReducer.reduce(None, &older)),
            &newer,
        );
        let backward = WorkflowSummaryReducer.reduce(
            Some(&WorkflowSummaryReducer.reduce(None, &newer)),
            &older,
        );
        assert_eq!(forward, backward);
    }

    #[test]
    fn newest_name_and_terminal_status_win_in_either_order() {
        let older = vec![
            entry(1, "workflowName", "hello"),
            entry(2, "status", "Succeeded"),
            entry(3, "parentWorkflowId", "p-old"),
        ];
        let newer = vec![
            entry(4, "workflowName", "goodbye"),
            entry(5, "status", "Failed"),
            entry(6, "parentWorkflowId", "p-new"),
        ];

        let forward = WorkflowSummaryReducer.reduce(
            Some(&WorkflowSummaryReducer.reduce(None, &older)),
            &newer,
        );
        let backward = WorkflowSummaryReducer.reduce(
            Some(&WorkflowSummaryReducer.reduce(None, &newer)),
            &older,
        );

        assert_eq!(forward, backward);
        assert_eq!(forward.workflow_name.as_deref(), Some("goodbye"));
        assert_eq!(forward.status, Some(WorkflowStatus::Failed));
        assert_eq!(forward.parent_workflow_id.as_deref(), Some("p-new"));
        assert_eq!(forward.sources.workflow_name, Some(4));
        assert_eq!(forward.sources.status, Some(5));
    }

    #[test]
    fn older_explicit_root_does_not_replace_newer_one() {
        let newer = WorkflowSummaryReducer.reduce(None, &[entry(7, "rootWorkflowId", "r-new")]);
        let merged = WorkflowSummaryReducer.reduce(
            Some(&newer),
            &[entry(2, "rootWorkflowId", "r-old"), entry(3, "status", "Running")],
        );
        assert_eq!(merged.root_workflow_id.as_deref(), Some("r-new"));
        assert_eq!(merged.sources.root_workflow_id, Some(7));
    }

    #[test]
    fn status_without_recorded_source_yields_to_same_rank() {
        let legacy = SummaryRecord {
            status: Some(WorkflowStatus::Succeeded),
            ..SummaryRecord::new("w1")
        };
        let merged = WorkflowSummaryReducer.reduce(Some(&legacy), &[entry(9, "status", "Aborted")]);
        assert_eq!(merged.status, Some(WorkflowStatus::Aborted));
    }

    #[test]
    fn garbage_values_are_skipped() {
        let summary = WorkflowSummaryReducer.reduce(
            None,
            &[
                entry(1, "status", "Exploded"),
                entry(2, "start", "yesterday"),
            ],
        );
        assert_eq!(summary.status, None);
        assert_eq!(summary.start_time, None);
    }

    #[test]
    fn closures_are_reducers() {
        let count_only = |prev: Option<&SummaryRecord>, batch: &[LogEntry]| {
            let mut s = prev.cloned().unwrap_or_else(|| SummaryRecord::new("w1"));
            s.workflow_name = Some(batch.len().to_string());
            s
        };
        let out = count_only.reduce(None, &[entry(1, "status", "Running")]);
        assert_eq!(out.workflow_name.as_deref(), Some("1"));
    }
}
