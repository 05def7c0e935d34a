//! `metasum sweep`: run one batch, or catch up, with a sweep strategy.

use anyhow::Result;
use clap::{Args, ValueEnum};
use metasum_core::{
    Summarizer, Sweep, SweepOutcome, WorkflowSummaryReducer, config::SweepNames,
};
use serde::Serialize;

use super::Context;
use crate::output::{pretty_kv, render};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SweepKind {
    /// Forward from the increasing watermark.
    Increasing,
    /// Backward from the decreasing watermark toward id zero.
    Decreasing,
    /// Entries whose summarization flag is still set.
    Flagged,
}

impl SweepKind {
    fn sweep(self, names: &SweepNames) -> Sweep {
        match self {
            Self::Increasing => Sweep::increasing(names),
            Self::Decreasing => Sweep::decreasing(names),
            Self::Flagged => Sweep::Flagged,
        }
    }
}

#[derive(Args, Debug)]
pub struct SweepArgs {
    #[arg(value_enum)]
    pub kind: SweepKind,

    /// Entries per batch. Defaults to `batch_size` in .metasum/config.toml.
    #[arg(long)]
    pub limit: Option<usize>,

    /// Keep running batches until the sweep reports no more work.
    #[arg(long)]
    pub until_caught_up: bool,

    /// Upper bound on batches for --until-caught-up.
    #[arg(long, default_value_t = 10_000)]
    pub max_rounds: usize,
}

#[derive(Debug, Serialize)]
struct SweepReport {
    sweep: String,
    rounds: usize,
    processed: u64,
    more_work: bool,
    last: SweepOutcome,
}

pub fn run_sweep(args: &SweepArgs, ctx: &Context) -> Result<()> {
    let config = ctx.config()?;
    let summarizer = Summarizer::from_config(&config)?;
    let sweep = args.kind.sweep(&config.sweeps);
    let limit = args.limit.unwrap_or(config.batch_size);
    let mut conn = ctx.open()?;

    let report = if args.until_caught_up {
        let caught_up = summarizer.run_until_caught_up(
            &mut conn,
            &sweep,
            limit,
            &WorkflowSummaryReducer,
            args.max_rounds,
        )?;
        SweepReport {
            sweep: sweep.label().to_string(),
            rounds: caught_up.rounds,
            processed: caught_up.processed,
            more_work: caught_up.last.has_more_work(),
            last: caught_up.last,
        }
    } else {
        let last = summarizer.run(&mut conn, &sweep, limit, &WorkflowSummaryReducer)?;
        SweepReport {
            sweep: sweep.label().to_string(),
            rounds: 1,
            processed: last.processed(),
            more_work: last.has_more_work(),
            last,
        }
    };

    render(ctx.output, &report, |r, w| {
        pretty_kv(w, "sweep", &r.sweep)?;
        pretty_kv(w, "rounds", r.rounds.to_string())?;
        pretty_kv(w, "processed", r.processed.to_string())?;
        match r.last {
            SweepOutcome::Increasing(o) => {
                pretty_kv(w, "watermark", o.watermark.to_string())?;
                pretty_kv(w, "backlog", o.backlog.to_string())?;
            }
            SweepOutcome::Decreasing(o) => pretty_kv(w, "low bound", o.low_bound.to_string())?,
            SweepOutcome::Flagged(o) => pretty_kv(w, "exhausted", o.exhausted.to_string())?,
        }
        pretty_kv(w, "more work", r.more_work.to_string())?;
        w.flush()
    })
}
