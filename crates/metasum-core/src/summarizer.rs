//! Batch summarization sweeps.
//!
//! Three strategies advance summary coverage over the metadata journal:
//!
//! 1. **Increasing**: reads the id window just above its watermark and
//!    moves the watermark up to the highest id it saw.
//! 2. **Decreasing**: backfills the journal below the point where the
//!    increasing sweep started, moving its own watermark down toward zero.
//! 3. **Flagged**: ignores ids entirely and processes entries whose
//!    `needs_summarization` flag is still set, clearing the flag afterwards.
//!
//! All three share the [`EntryFilter`] and take the [`Reducer`] as a call
//! argument. Each `run_*` call is one transaction: the fetch, every upsert,
//! and the watermark or flag commit land together or not at all. Dropping
//! the transaction on an error or an unwinding panic rolls it back.
//!
//! The engine takes no lock. Callers must not run two sweeps with the same
//! name, or two flagged sweeps, at the same time.

use std::time::Instant;

use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;

use crate::config::{SummarizerConfig, SweepNames};
use crate::db::SqliteBatch;
use crate::db::upsert::{UpsertStrategy, strategy_for};
use crate::entry::LogEntry;
use crate::error::SummarizeError;
use crate::filter::EntryFilter;
use crate::reducer::Reducer;
use crate::store::SweepStore;

/// Position reported by an increasing sweep that has never committed.
pub const NO_WATERMARK: i64 = -1;

/// One summarization strategy and the watermark rows it uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sweep {
    Increasing { name: String },
    Decreasing { name: String, increasing: String },
    Flagged,
}

impl Sweep {
    #[must_use]
    pub fn increasing(names: &SweepNames) -> Self {
        Self::Increasing {
            name: names.increasing.clone(),
        }
    }

    #[must_use]
    pub fn decreasing(names: &SweepNames) -> Self {
        Self::Decreasing {
            name: names.decreasing.clone(),
            increasing: names.increasing.clone(),
        }
    }

    /// Label used in logs.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Increasing { name } | Self::Decreasing { name, .. } => name,
            Self::Flagged => "flagged",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IncreasingOutcome {
    /// Entries fetched from the window.
    pub processed: u64,
    /// Highest journal id minus the committed watermark.
    pub backlog: u64,
    /// Watermark after this batch.
    pub watermark: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DecreasingOutcome {
    /// Ids accounted for: previous watermark minus the new low bound.
    pub processed: u64,
    /// Watermark after this batch. Zero once backfill is complete.
    pub low_bound: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlaggedOutcome {
    /// Entries fetched and unflagged, relevant or not.
    pub processed: u64,
    /// Fewer than `limit` entries were flagged, so nothing is left.
    pub exhausted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "sweep", rename_all = "snake_case")]
pub enum SweepOutcome {
    Increasing(IncreasingOutcome),
    Decreasing(DecreasingOutcome),
    Flagged(FlaggedOutcome),
}

impl SweepOutcome {
    #[must_use]
    pub const fn processed(&self) -> u64 {
        match self {
            Self::Increasing(o) => o.processed,
            Self::Decreasing(o) => o.processed,
            Self::Flagged(o) => o.processed,
        }
    }

    /// Whether another call of the same sweep would find work.
    ///
    /// An increasing sweep whose window came back empty reports no more work
    /// even with a backlog, since repeating it would read the same window.
    #[must_use]
    pub const fn has_more_work(&self) -> bool {
        match self {
            Self::Increasing(o) => o.processed > 0 && o.backlog > 0,
            Self::Decreasing(o) => o.low_bound > 0,
            Self::Flagged(o) => !o.exhausted,
        }
    }
}

/// Result of [`Summarizer::run_until_caught_up`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CatchUpReport {
    pub rounds: usize,
    pub processed: u64,
    pub last: SweepOutcome,
}

/// What one fold step wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct FoldStats {
    summaries: usize,
    labels: usize,
    ignored: usize,
}

#[derive(Debug)]
pub struct Summarizer {
    filter: EntryFilter,
    upsert: Box<dyn UpsertStrategy>,
}

impl Summarizer {
    pub fn new(filter: EntryFilter, upsert: Box<dyn UpsertStrategy>) -> Self {
        Self { filter, upsert }
    }

    /// Build a summarizer from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SummarizeError::Config`] if the configuration is invalid.
    pub fn from_config(config: &SummarizerConfig) -> Result<Self, SummarizeError> {
        config.validate()?;
        Ok(Self::new(
            EntryFilter::from_config(config),
            strategy_for(config.upsert),
        ))
    }

    #[must_use]
    pub const fn filter(&self) -> &EntryFilter {
        &self.filter
    }

    // -----------------------------------------------------------------------
    // Transactional entry points
    // -----------------------------------------------------------------------

    /// Summarize the next window above the watermark of `sweep_name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the limit is zero or any store operation fails;
    /// the watermark and all summaries are then unchanged.
    pub fn run_increasing_sweep<R: Reducer + ?Sized>(
        &self,
        conn: &mut Connection,
        sweep_name: &str,
        limit: usize,
        reducer: &R,
    ) -> Result<IncreasingOutcome, SummarizeError> {
        let start = Instant::now();
        let outcome = self.in_transaction(conn, |store| {
            self.increasing(store, sweep_name, limit, reducer)
        })?;
        tracing::info!(
            sweep = sweep_name,
            processed = outcome.processed,
            watermark = outcome.watermark,
            backlog = outcome.backlog,
            elapsed_ms = start.elapsed().as_millis(),
            "increasing sweep batch committed"
        );
        Ok(outcome)
    }

    /// Backfill the next window below the watermark of `sweep_name`, seeding
    /// it from `increasing_name` on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the limit is zero or any store operation fails;
    /// the watermark and all summaries are then unchanged.
    pub fn run_decreasing_sweep<R: Reducer + ?Sized>(
        &self,
        conn: &mut Connection,
        sweep_name: &str,
        increasing_name: &str,
        limit: usize,
        reducer: &R,
    ) -> Result<DecreasingOutcome, SummarizeError> {
        let start = Instant::now();
        let outcome = self.in_transaction(conn, |store| {
            self.decreasing(store, sweep_name, increasing_name, limit, reducer)
        })?;
        tracing::info!(
            sweep = sweep_name,
            processed = outcome.processed,
            low_bound = outcome.low_bound,
            elapsed_ms = start.elapsed().as_millis(),
            "decreasing sweep batch committed"
        );
        Ok(outcome)
    }

    /// Summarize up to `limit` flagged entries and clear their flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the limit is zero or any store operation fails;
    /// flags and summaries are then unchanged.
    pub fn run_flagged_sweep<R: Reducer + ?Sized>(
        &self,
        conn: &mut Connection,
        limit: usize,
        reducer: &R,
    ) -> Result<FlaggedOutcome, SummarizeError> {
        let start = Instant::now();
        let outcome = self.in_transaction(conn, |store| self.flagged(store, limit, reducer))?;
        tracing::info!(
            processed = outcome.processed,
            exhausted = outcome.exhausted,
            elapsed_ms = start.elapsed().as_millis(),
            "flagged sweep batch committed"
        );
        Ok(outcome)
    }

    /// Run one batch of `sweep`.
    ///
    /// # Errors
    ///
    /// See the strategy-specific `run_*` methods.
    pub fn run<R: Reducer + ?Sized>(
        &self,
        conn: &mut Connection,
        sweep: &Sweep,
        limit: usize,
        reducer: &R,
    ) -> Result<SweepOutcome, SummarizeError> {
        match sweep {
            Sweep::Increasing { name } => self
                .run_increasing_sweep(conn, name, limit, reducer)
                .map(SweepOutcome::Increasing),
            Sweep::Decreasing { name, increasing } => self
                .run_decreasing_sweep(conn, name, increasing, limit, reducer)
                .map(SweepOutcome::Decreasing),
            Sweep::Flagged => self
                .run_flagged_sweep(conn, limit, reducer)
                .map(SweepOutcome::Flagged),
        }
    }

    /// Repeat `sweep` until it reports no more work or `max_rounds` batches
    /// have committed. Each round is its own transaction, so an error leaves
    /// the rounds before it committed.
    ///
    /// # Errors
    ///
    /// Returns the first batch error, or [`SummarizeError::InvalidLimit`]
    /// when `max_rounds` is zero.
    pub fn run_until_caught_up<R: Reducer + ?Sized>(
        &self,
        conn: &mut Connection,
        sweep: &Sweep,
        limit: usize,
        reducer: &R,
        max_rounds: usize,
    ) -> Result<CatchUpReport, SummarizeError> {
        if max_rounds == 0 {
            return Err(SummarizeError::InvalidLimit(max_rounds));
        }

        let mut processed = 0_u64;
        let mut rounds = 0;
        loop {
            let last = self.run(conn, sweep, limit, reducer)?;
            rounds += 1;
            processed = processed.saturating_add(last.processed());

            if !last.has_more_work() || rounds >= max_rounds {
                if last.has_more_work() {
                    tracing::warn!(
                        sweep = sweep.label(),
                        rounds,
                        "stopped catching up at the round cap with work remaining"
                    );
                }
                return Ok(CatchUpReport {
                    rounds,
                    processed,
                    last,
                });
            }
        }
    }

    // -----------------------------------------------------------------------
    // Store-generic sweep bodies
    // -----------------------------------------------------------------------

    /// Increasing sweep against an already transaction-scoped store.
    ///
    /// # Errors
    ///
    /// Returns an error if the limit is zero or any store call fails.
    pub fn increasing<S, R>(
        &self,
        store: &S,
        sweep_name: &str,
        limit: usize,
        reducer: &R,
    ) -> Result<IncreasingOutcome, SummarizeError>
    where
        S: SweepStore + ?Sized,
        R: Reducer + ?Sized,
    {
        let window = window_len(limit)?;
        let previous = store.get_position(sweep_name)?.unwrap_or(NO_WATERMARK);
        let min_id = previous.saturating_add(1);
        let max_id = previous.saturating_add(window);

        let entries = store.fetch_range(min_id, max_id)?;
        tracing::debug!(
            sweep = sweep_name,
            min_id,
            max_id,
            fetched = entries.len(),
            "increasing sweep window"
        );

        let processed = count(entries.len());
        let watermark = entries
            .iter()
            .map(|e| e.entry_id)
            .max()
            .unwrap_or(previous);

        self.fold(store, entries, reducer)?;

        if watermark != previous {
            store.set_position(sweep_name, watermark)?;
        }

        let backlog = store
            .max_entry_id()?
            .map_or(0, |max| u64::try_from(max.saturating_sub(watermark)).unwrap_or(0));

        if processed == 0 && backlog > 0 {
            tracing::warn!(
                sweep = sweep_name,
                watermark,
                backlog,
                window,
                "increasing window is empty but later entries exist; id gap wider than the batch size"
            );
        }

        Ok(IncreasingOutcome {
            processed,
            backlog,
            watermark,
        })
    }

    /// Decreasing sweep against an already transaction-scoped store.
    ///
    /// # Errors
    ///
    /// Returns an error if the limit is zero or any store call fails.
    pub fn decreasing<S, R>(
        &self,
        store: &S,
        sweep_name: &str,
        increasing_name: &str,
        limit: usize,
        reducer: &R,
    ) -> Result<DecreasingOutcome, SummarizeError>
    where
        S: SweepStore + ?Sized,
        R: Reducer + ?Sized,
    {
        let window = window_len(limit)?;
        let done = DecreasingOutcome {
            processed: 0,
            low_bound: 0,
        };

        let start = match store.get_position(sweep_name)? {
            Some(position) => position,
            None => match store.get_position(increasing_name)? {
                Some(position) => position.saturating_add(1),
                None => {
                    tracing::debug!(
                        sweep = sweep_name,
                        "no decreasing or increasing watermark yet; nothing to backfill"
                    );
                    return Ok(done);
                }
            },
        };
        if start <= 0 {
            return Ok(done);
        }

        let low_bound = start.saturating_sub(window).max(0);
        let high = start - 1;
        let entries = store.fetch_range(low_bound, high)?;
        tracing::debug!(
            sweep = sweep_name,
            min_id = low_bound,
            max_id = high,
            fetched = entries.len(),
            "decreasing sweep window"
        );

        self.fold(store, entries, reducer)?;
        store.set_position(sweep_name, low_bound)?;

        Ok(DecreasingOutcome {
            processed: u64::try_from(start - low_bound).unwrap_or(0),
            low_bound,
        })
    }

    /// Flagged sweep against an already transaction-scoped store.
    ///
    /// # Errors
    ///
    /// Returns an error if the limit is zero or any store call fails.
    pub fn flagged<S, R>(
        &self,
        store: &S,
        limit: usize,
        reducer: &R,
    ) -> Result<FlaggedOutcome, SummarizeError>
    where
        S: SweepStore + ?Sized,
        R: Reducer + ?Sized,
    {
        window_len(limit)?;
        let entries = store.fetch_flagged(limit)?;
        let fetched = entries.len();
        // Irrelevant entries are unflagged too, or they would be refetched forever.
        let ids: Vec<i64> = entries.iter().map(|e| e.entry_id).collect();

        let stats = self.fold(store, entries, reducer)?;
        store.clear_flags(&ids)?;
        tracing::debug!(
            fetched,
            summaries = stats.summaries,
            labels = stats.labels,
            ignored = stats.ignored,
            "flagged sweep batch"
        );

        Ok(FlaggedOutcome {
            processed: count(fetched),
            exhausted: fetched < limit,
        })
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn in_transaction<T>(
        &self,
        conn: &mut Connection,
        body: impl FnOnce(&SqliteBatch<'_>) -> Result<T, SummarizeError>,
    ) -> Result<T, SummarizeError> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = body(&SqliteBatch::new(&tx, self.upsert.as_ref()))?;
        tx.commit()?;
        Ok(out)
    }

    fn fold<S, R>(
        &self,
        store: &S,
        entries: Vec<LogEntry>,
        reducer: &R,
    ) -> Result<FoldStats, SummarizeError>
    where
        S: SweepStore + ?Sized,
        R: Reducer + ?Sized,
    {
        let partition = self.filter.partition(entries);

        for label in &partition.labels {
            store.upsert_label(label)?;
        }

        for (workflow_id, group) in &partition.groups {
            let previous = store.get_summary(workflow_id)?;
            let summary = reducer.reduce(previous.as_ref(), group);
            if summary.workflow_id != *workflow_id {
                return Err(SummarizeError::KeyMismatch {
                    expected: workflow_id.clone(),
                    actual: summary.workflow_id,
                });
            }
            store.upsert_summary(&summary)?;
        }

        Ok(FoldStats {
            summaries: partition.groups.len(),
            labels: partition.labels.len(),
            ignored: partition.ignored,
        })
    }
}

fn window_len(limit: usize) -> Result<i64, SummarizeError> {
    match i64::try_from(limit) {
        Ok(window) if window > 0 => Ok(window),
        _ => Err(SummarizeError::InvalidLimit(limit)),
    }
}

fn count(len: usize) -> u64 {
    u64::try_from(len).unwrap_or(u64::MAX)
}
