use std::fmt;

/// Errors surfaced by a summarization batch.
///
/// Any of these aborts the batch: the enclosing transaction is rolled back,
/// so watermarks, flags and summary rows are left exactly as they were.
#[derive(Debug, thiserror::Error)]
pub enum SummarizeError {
    /// The backing store failed (connection loss, busy timeout, bad SQL).
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// An update-by-key touched more than one row, so the key is not unique.
    #[error("integrity violation: update of {table} key {key} affected {rows} rows")]
    Integrity {
        /// Table whose key invariant is broken.
        table: &'static str,
        /// Rendered natural key of the row being written.
        key: String,
        /// Number of rows the update reported.
        rows: usize,
    },

    /// A reducer returned a summary for a different workflow than it was given.
    #[error("reducer returned summary for {actual} while folding {expected}")]
    KeyMismatch {
        /// Workflow whose entries were folded.
        expected: String,
        /// Workflow id carried by the returned summary.
        actual: String,
    },

    /// A sweep was asked to process zero rows, or more than the store can address.
    #[error("invalid batch limit {0}")]
    InvalidLimit(usize),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SummarizeError {
    /// Machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Store(_) => ErrorCode::StoreFailure,
            Self::Integrity { .. } => ErrorCode::IntegrityViolation,
            Self::KeyMismatch { .. } => ErrorCode::ReducerKeyMismatch,
            Self::InvalidLimit(_) => ErrorCode::InvalidLimit,
            Self::Config(_) => ErrorCode::ConfigInvalid,
        }
    }

    /// Whether retrying the identical call can succeed.
    ///
    /// Store failures are transient from the engine's point of view; every
    /// other variant will fail the same way again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

/// Machine-readable error codes for operators and schedulers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    ConfigInvalid,
    InvalidLimit,
    StoreFailure,
    IntegrityViolation,
    ReducerKeyMismatch,
    ImportParseError,
    WorkflowNotFound,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::ConfigInvalid => "E1002",
            Self::InvalidLimit => "E1003",
            Self::StoreFailure => "E2001",
            Self::IntegrityViolation => "E3001",
            Self::ReducerKeyMismatch => "E3002",
            Self::ImportParseError => "E4001",
            Self::WorkflowNotFound => "E4002",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::ConfigInvalid => "Invalid configuration value",
            Self::InvalidLimit => "Invalid batch limit",
            Self::StoreFailure => "Metadata store failure",
            Self::IntegrityViolation => "Summary key integrity violation",
            Self::ReducerKeyMismatch => "Reducer returned the wrong workflow",
            Self::ImportParseError => "Metadata import parse error",
            Self::WorkflowNotFound => "Workflow summary not found",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in .metasum/config.toml and retry."),
            Self::ConfigInvalid => {
                Some("Use a positive batch_size and a non-empty label_prefix.")
            }
            Self::InvalidLimit => Some("Pass a limit of at least 1."),
            Self::StoreFailure => {
                Some("Retry the sweep; watermarks were not advanced by the failed batch.")
            }
            Self::IntegrityViolation => Some(
                "Stop all sweeps and repair duplicate summary keys before resuming.",
            ),
            Self::ReducerKeyMismatch => {
                Some("Fix the reducer to keep the workflow id it was handed.")
            }
            Self::ImportParseError => Some("Each line must be one JSON metadata entry."),
            Self::WorkflowNotFound => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorCode, SummarizeError};
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorCode::ConfigParseError,
            ErrorCode::ConfigInvalid,
            ErrorCode::InvalidLimit,
            ErrorCode::StoreFailure,
            ErrorCode::IntegrityViolation,
            ErrorCode::ReducerKeyMismatch,
            ErrorCode::ImportParseError,
            ErrorCode::WorkflowNotFound,
        ];

        let mut seen = HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        let code = ErrorCode::IntegrityViolation.code();
        assert_eq!(code.len(), 5);
        assert!(code.starts_with('E'));
        assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn only_store_failures_are_retryable() {
        let store = SummarizeError::Store(rusqlite::Error::QueryReturnedNoRows);
        let integrity = SummarizeError::Integrity {
            table: "workflow_summary",
            key: "w1".into(),
            rows: 2,
        };
        assert!(store.is_retryable());
        assert!(!integrity.is_retryable());
        assert_eq!(integrity.code(), ErrorCode::IntegrityViolation);
        assert!(integrity.to_string().contains("affected 2 rows"));
    }
}
