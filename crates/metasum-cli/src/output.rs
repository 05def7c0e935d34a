//! Shared output layer for text/JSON parity across all CLI commands.
//!
//! Every command handler receives an [`OutputMode`] and formats its output
//! accordingly: labelled text for humans or stable JSON for scripts.
//!
//! # Output mode resolution
//!
//! Precedence (highest wins):
//! 1. `--json` flag
//! 2. `METASUM_FORMAT` env var → `"pretty"` | `"json"`
//! 3. Default: [`OutputMode::Pretty`].

use metasum_core::{ErrorCode, SummarizeError};
use serde::Serialize;
use std::io::{self, Write};

/// Shared width for pretty separators.
pub const PRETTY_RULE_WIDTH: usize = 60;

pub fn pretty_rule(w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{:-<width$}", "", width = PRETTY_RULE_WIDTH)
}

/// Write a section heading followed by a separator.
pub fn pretty_section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}")?;
    pretty_rule(w)
}

/// Render a left-aligned key/value line in human output.
pub fn pretty_kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<16} {}", format!("{key}:"), value.as_ref())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Pretty,
    Json,
}

impl OutputMode {
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }
}

fn resolve_output_mode_inner(json_flag: bool, format_env: Option<&str>) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }
    match format_env.map(str::to_lowercase).as_deref() {
        Some("json") => OutputMode::Json,
        _ => OutputMode::Pretty,
    }
}

/// Resolve the output mode from the `--json` flag and `METASUM_FORMAT`.
pub fn resolve_output_mode(json_flag: bool) -> OutputMode {
    let env_val = std::env::var("METASUM_FORMAT").ok();
    resolve_output_mode_inner(json_flag, env_val.as_deref())
}

/// A command failure that maps onto an [`ErrorCode`] outside the sweep engine.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct CodedError {
    pub code: ErrorCode,
    pub message: String,
}

impl CodedError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// A structured error with optional suggestion and error code.
#[derive(Debug, Serialize)]
pub struct CliError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Catalog code such as `E2001`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl CliError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: None,
            error_code: None,
        }
    }
}

impl From<ErrorCode> for CliError {
    fn from(code: ErrorCode) -> Self {
        Self {
            message: code.message().to_string(),
            suggestion: code.hint().map(str::to_string),
            error_code: Some(code.code().to_string()),
        }
    }
}

impl From<&anyhow::Error> for CliError {
    /// Keeps the catalog code of a [`CodedError`] or [`SummarizeError`]
    /// anywhere in the chain.
    fn from(err: &anyhow::Error) -> Self {
        let code = err.downcast_ref::<CodedError>().map(|e| e.code).or_else(|| {
            err.chain()
                .find_map(|cause| cause.downcast_ref::<SummarizeError>())
                .map(SummarizeError::code)
        });
        let mut cli = code.map_or_else(|| Self::new(String::new()), Self::from);
        cli.message = format!("{err:#}");
        cli
    }
}

/// Render a serializable value to stdout in the requested format.
///
/// In JSON mode the value is serialized with `serde_json`; otherwise
/// `human_fn` produces the text.
pub fn render<T: Serialize>(
    mode: OutputMode,
    value: &T,
    human_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if mode.is_json() {
        serde_json::to_writer_pretty(&mut out, value)?;
        writeln!(out)?;
    } else {
        human_fn(value, &mut out)?;
    }
    Ok(())
}

/// Render an error to stderr in the requested format.
pub fn render_error(mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    match mode {
        OutputMode::Json => {
            let wrapper = serde_json::json!({
                "error": error,
            });
            serde_json::to_writer_pretty(&mut out, &wrapper)?;
            writeln!(out)?;
        }
        OutputMode::Pretty => {
            match &error.error_code {
                Some(code) => writeln!(out, "error[{code}]: {}", error.message)?,
                None => writeln!(out, "error: {}", error.message)?,
            }
            if let Some(suggestion) = &error.suggestion {
                writeln!(out, "  suggestion: {suggestion}")?;
            }
        }
    }
    Ok(())
}
