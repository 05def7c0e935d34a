//! `metasum archive`: record the archive state of a workflow's metadata.

use anyhow::Result;
use clap::Args;
use metasum_core::db::query;
use metasum_core::{ArchiveStatus, ErrorCode};
use serde::Serialize;

use super::Context;
use crate::output::{CodedError, render};

#[derive(Args, Debug)]
pub struct ArchiveArgs {
    /// Workflow id whose summary to update.
    pub workflow_id: String,

    /// One of Unarchived, Archived, ArchivedAndDeleted, ArchiveFailed.
    pub status: ArchiveStatus,
}

#[derive(Debug, Serialize)]
struct ArchiveOutput<'a> {
    workflow_id: &'a str,
    archive_status: ArchiveStatus,
}

pub fn run_archive(args: &ArchiveArgs, ctx: &Context) -> Result<()> {
    let conn = ctx.open()?;
    if !query::set_archive_status(&conn, &args.workflow_id, args.status)? {
        return Err(CodedError::new(
            ErrorCode::WorkflowNotFound,
            format!("no summary for workflow '{}'", args.workflow_id),
        )
        .into());
    }
    tracing::info!(
        workflow_id = %args.workflow_id,
        archive_status = %args.status,
        "archive status updated"
    );

    let output = ArchiveOutput {
        workflow_id: &args.workflow_id,
        archive_status: args.status,
    };
    render(ctx.output, &output, |o, w| {
        writeln!(w, "{} -> {}", o.workflow_id, o.archive_status)?;
        w.flush()
    })
}
