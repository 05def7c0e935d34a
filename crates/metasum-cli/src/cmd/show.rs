//! `metasum show`: print one workflow summary with its labels.

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use clap::Args;
use metasum_core::db::query;
use metasum_core::{ErrorCode, SummaryRecord};
use serde::Serialize;
use std::collections::BTreeMap;

use super::Context;
use crate::output::{CodedError, pretty_kv, pretty_section, render};

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Workflow id to show.
    pub workflow_id: String,
}

#[derive(Debug, Serialize)]
struct ShowOutput {
    #[serde(flatten)]
    summary: SummaryRecord,
    labels: BTreeMap<String, String>,
}

fn timestamp(value: Option<DateTime<Utc>>) -> String {
    value.map_or_else(
        || "-".to_string(),
        |ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true),
    )
}

pub fn run_show(args: &ShowArgs, ctx: &Context) -> Result<()> {
    let conn = ctx.open()?;
    let Some(summary) = query::get_summary(&conn, &args.workflow_id)? else {
        return Err(CodedError::new(
            ErrorCode::WorkflowNotFound,
            format!("no summary for workflow '{}'", args.workflow_id),
        )
        .into());
    };
    let labels = query::labels_for(&conn, &args.workflow_id)?
        .into_iter()
        .map(|label| (label.key, label.value))
        .collect();

    let output = ShowOutput { summary, labels };
    render(ctx.output, &output, |o, w| {
        let s = &o.summary;
        pretty_section(w, &s.workflow_id)?;
        pretty_kv(w, "name", s.workflow_name.as_deref().unwrap_or("-"))?;
        pretty_kv(
            w,
            "status",
            s.status.map_or("-", metasum_core::WorkflowStatus::as_str),
        )?;
        pretty_kv(w, "submitted", timestamp(s.submission_time))?;
        pretty_kv(w, "started", timestamp(s.start_time))?;
        pretty_kv(w, "ended", timestamp(s.end_time))?;
        pretty_kv(w, "parent", s.parent_workflow_id.as_deref().unwrap_or("-"))?;
        pretty_kv(w, "root", s.root_workflow_id.as_deref().unwrap_or("-"))?;
        pretty_kv(w, "archive", s.archive_status.as_str())?;
        if !o.labels.is_empty() {
            writeln!(w)?;
            pretty_section(w, "labels")?;
            for (key, value) in &o.labels {
                pretty_kv(w, key, value)?;
            }
        }
        w.flush()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_render_as_utc_seconds() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).single();
        assert_eq!(timestamp(ts), "2024-03-01T10:00:00Z");
        assert_eq!(timestamp(None), "-");
    }
}
