//! `metasum status`: journal counters and sweep positions.

use anyhow::Result;
use metasum_core::{SweepStatus, status_report};
use std::io::{self, Write};

use super::Context;
use crate::output::{pretty_kv, pretty_section, render};

fn position(value: Option<i64>) -> String {
    value.map_or_else(|| "-".to_string(), |p| p.to_string())
}

fn sweep_section(w: &mut dyn Write, heading: &str, sweep: &SweepStatus) -> io::Result<()> {
    writeln!(w)?;
    pretty_section(w, heading)?;
    pretty_kv(w, "name", &sweep.name)?;
    pretty_kv(w, "position", position(sweep.position))?;
    pretty_kv(w, "remaining", sweep.remaining.to_string())?;
    if let Some(updated) = sweep.updated_at {
        pretty_kv(w, "updated", updated.to_rfc3339())?;
    }
    Ok(())
}

pub fn run_status(ctx: &Context) -> Result<()> {
    let config = ctx.config()?;
    let conn = ctx.open()?;
    let report = status_report(&conn, &config.sweeps)?;

    render(ctx.output, &report, |r, w| {
        pretty_section(w, "journal")?;
        pretty_kv(w, "entries", r.entries.to_string())?;
        pretty_kv(w, "max id", position(r.max_entry_id))?;
        pretty_kv(w, "flagged", r.flagged.to_string())?;
        pretty_kv(w, "summaries", r.summaries.to_string())?;
        pretty_kv(w, "labels", r.labels.to_string())?;
        sweep_section(w, "increasing sweep", &r.increasing)?;
        sweep_section(w, "decreasing sweep", &r.decreasing)?;
        w.flush()
    })
}
