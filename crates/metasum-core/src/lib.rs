//! metasum-core library.
//!
//! Folds an append-only journal of workflow metadata entries into one
//! summary row per workflow plus a table of custom labels, using
//! watermark-driven forward and backward sweeps or a per-entry flag.
//!
//! # Conventions
//!
//! - **Errors**: sweep operations return [`SummarizeError`]; store setup,
//!   configuration and read helpers return `anyhow::Result`.
//! - **Logging**: use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`).

pub mod config;
pub mod db;
pub mod entry;
pub mod error;
pub mod filter;
pub mod reducer;
pub mod status;
pub mod store;
pub mod summarizer;

pub use config::{SummarizerConfig, SweepNames, UpsertMode, load_config};
pub use entry::{
    ArchiveStatus, FieldSources, LabelRecord, LogEntry, NewLogEntry, SummaryRecord, WorkflowStatus,
};
pub use error::{ErrorCode, SummarizeError};
pub use filter::EntryFilter;
pub use reducer::{Reducer, WorkflowSummaryReducer};
pub use status::{StatusReport, SweepStatus, status_report};
pub use summarizer::{
    CatchUpReport, DecreasingOutcome, FlaggedOutcome, IncreasingOutcome, Summarizer, Sweep,
    SweepOutcome,
};
