pub mod archive;
pub mod import;
pub mod show;
pub mod status;
pub mod sweep;

use anyhow::{Context as _, Result};
use metasum_core::{ErrorCode, SummarizeError, SummarizerConfig, db, load_config};
use rusqlite::Connection;
use std::path::PathBuf;

use crate::output::{CodedError, OutputMode};

/// Default database location relative to the project root.
pub const DEFAULT_DB_PATH: &str = ".metasum/metadata.sqlite3";

/// Resolved global options shared by every subcommand.
#[derive(Debug)]
pub struct Context {
    pub root: PathBuf,
    pub db_path: PathBuf,
    pub output: OutputMode,
}

impl Context {
    pub fn new(root: PathBuf, db_path: Option<PathBuf>, output: OutputMode) -> Self {
        let db_path = db_path.unwrap_or_else(|| root.join(DEFAULT_DB_PATH));
        Self {
            root,
            db_path,
            output,
        }
    }

    pub fn open(&self) -> Result<Connection> {
        db::open_store(&self.db_path)
            .with_context(|| format!("open metadata store {}", self.db_path.display()))
    }

    pub fn config(&self) -> Result<SummarizerConfig> {
        load_config(&self.root).map_err(|err| {
            if err.chain().any(|cause| cause.is::<SummarizeError>()) {
                err
            } else {
                err.context(CodedError::new(
                    ErrorCode::ConfigParseError,
                    ErrorCode::ConfigParseError.message(),
                ))
            }
        })
    }
}
