//! `metasum import`: append JSONL metadata entries to the journal.

use anyhow::{Context as _, Result};
use clap::Args;
use metasum_core::db::query;
use metasum_core::{ErrorCode, entry::parse_jsonl};
use serde::Serialize;
use std::io::Read;
use std::path::PathBuf;

use super::Context;
use crate::output::{CodedError, pretty_kv, render};

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// JSONL file with one entry per line, or `-` for stdin.
    pub file: PathBuf,
}

#[derive(Debug, Serialize)]
struct ImportReport {
    source: String,
    appended: usize,
    first_id: Option<i64>,
    last_id: Option<i64>,
}

pub fn run_import(args: &ImportArgs, ctx: &Context) -> Result<()> {
    let source = args.file.display().to_string();
    let input = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("read entries from stdin")?;
        buf
    } else {
        std::fs::read_to_string(&args.file).with_context(|| format!("read {source}"))?
    };

    let entries = parse_jsonl(&input).map_err(|(line, err)| {
        CodedError::new(ErrorCode::ImportParseError, format!("{source}:{line}: {err}"))
    })?;

    let mut conn = ctx.open()?;
    let ids = query::append_entries(&mut conn, &entries)?;
    tracing::info!(source = %source, appended = ids.len(), "imported metadata entries");

    let report = ImportReport {
        source,
        appended: ids.len(),
        first_id: ids.first().copied(),
        last_id: ids.last().copied(),
    };
    render(ctx.output, &report, |r, w| {
        pretty_kv(w, "appended", r.appended.to_string())?;
        if let (Some(first), Some(last)) = (r.first_id, r.last_id) {
            pretty_kv(w, "ids", format!("{first}..={last}"))?;
        }
        w.flush()
    })
}
