use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::SummarizeError;

/// Metadata keys folded into a workflow summary by default.
pub const DEFAULT_SCALAR_KEYS: &[&str] = &[
    keys::WORKFLOW_NAME,
    keys::STATUS,
    keys::SUBMISSION,
    keys::START,
    keys::END,
    keys::PARENT_WORKFLOW_ID,
    keys::ROOT_WORKFLOW_ID,
];

/// Well-known workflow-level metadata keys.
pub mod keys {
    pub const WORKFLOW_NAME: &str = "workflowName";
    pub const STATUS: &str = "status";
    pub const SUBMISSION: &str = "submission";
    pub const START: &str = "start";
    pub const END: &str = "end";
    pub const PARENT_WORKFLOW_ID: &str = "parentWorkflowId";
    pub const ROOT_WORKFLOW_ID: &str = "rootWorkflowId";
    pub const LABELS: &str = "labels";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummarizerConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_label_prefix")]
    pub label_prefix: String,
    #[serde(default = "default_label_delimiter")]
    pub label_delimiter: char,
    #[serde(default = "default_scalar_keys")]
    pub scalar_keys: Vec<String>,
    #[serde(default)]
    pub upsert: UpsertMode,
    #[serde(default)]
    pub sweeps: SweepNames,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            label_prefix: default_label_prefix(),
            label_delimiter: default_label_delimiter(),
            scalar_keys: default_scalar_keys(),
            upsert: UpsertMode::default(),
            sweeps: SweepNames::default(),
        }
    }
}

impl SummarizerConfig {
    /// Reject values no sweep can run with.
    ///
    /// # Errors
    ///
    /// Returns [`SummarizeError::Config`] for a zero batch size, an empty
    /// label prefix, or identical increasing/decreasing sweep names.
    pub fn validate(&self) -> Result<(), SummarizeError> {
        if self.batch_size == 0 {
            return Err(SummarizeError::Config("batch_size must be at least 1".into()));
        }
        if self.label_prefix.is_empty() {
            return Err(SummarizeError::Config("label_prefix must not be empty".into()));
        }
        if self.sweeps.increasing == self.sweeps.decreasing {
            return Err(SummarizeError::Config(format!(
                "increasing and decreasing sweeps share the name '{}'",
                self.sweeps.increasing
            )));
        }
        Ok(())
    }
}

/// How summary and label rows are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertMode {
    /// Single `INSERT ... ON CONFLICT DO UPDATE` statement.
    #[default]
    Native,
    /// `UPDATE` by key, then `INSERT` when nothing matched.
    UpdateThenInsert,
}

/// Watermark row names for the two bookmark sweeps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepNames {
    #[serde(default = "default_increasing_sweep")]
    pub increasing: String,
    #[serde(default = "default_decreasing_sweep")]
    pub decreasing: String,
}

impl Default for SweepNames {
    fn default() -> Self {
        Self {
            increasing: default_increasing_sweep(),
            decreasing: default_decreasing_sweep(),
        }
    }
}

const fn default_batch_size() -> usize {
    1000
}

fn default_label_prefix() -> String {
    format!("{}:", keys::LABELS)
}

const fn default_label_delimiter() -> char {
    ':'
}

fn default_scalar_keys() -> Vec<String> {
    DEFAULT_SCALAR_KEYS.iter().map(|k| (*k).to_string()).collect()
}

fn default_increasing_sweep() -> String {
    "WORKFLOW_METADATA_SUMMARY_ENTRY_INCREASING".into()
}

fn default_decreasing_sweep() -> String {
    "WORKFLOW_METADATA_SUMMARY_ENTRY_DECREASING".into()
}

/// Load `.metasum/config.toml` under `root`, falling back to defaults when
/// the file does not exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read, parsed, or
/// validated.
pub fn load_config(root: &Path) -> Result<SummarizerConfig> {
    let path = root.join(".metasum/config.toml");
    if !path.exists() {
        return Ok(SummarizerConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let config = toml::from_str::<SummarizerConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid settings in {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, body: &str) {
        let config_dir = dir.path().join(".metasum");
        std::fs::create_dir_all(&config_dir).expect("create config dir");
        std::fs::write(config_dir.join("config.toml"), body).expect("write config");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().expect("tempdir");
        let config = load_config(dir.path()).expect("load");
        assert_eq!(config, SummarizerConfig::default());
        assert_eq!(config.label_prefix, "labels:");
        assert_eq!(config.scalar_keys.len(), 7);
        assert_eq!(config.upsert, UpsertMode::Native);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = TempDir::new().expect("tempdir");
        write_config(
            &dir,
            r#"
batch_size = 50
upsert = "update_then_insert"

[sweeps]
increasing = "INC"
"#,
        );
        let config = load_config(dir.path()).expect("load");
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.upsert, UpsertMode::UpdateThenInsert);
        assert_eq!(config.sweeps.increasing, "INC");
        assert_eq!(
            config.sweeps.decreasing,
            "WORKFLOW_METADATA_SUMMARY_ENTRY_DECREASING"
        );
        assert_eq!(config.label_delimiter, ':');
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let dir = TempDir::new().expect("tempdir");
        write_config(&dir, "batch_size = 0\n");
        let err = load_config(dir.path()).expect_err("zero batch");
        assert!(format!("{err:#}").contains("batch_size"));
    }

    #[test]
    fn malformed_file_names_path() {
        let dir = TempDir::new().expect("tempdir");
        write_config(&dir, "batch_size = [\n");
        let err = load_config(dir.path()).expect_err("bad toml");
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn shared_sweep_names_are_rejected() {
        let config = SummarizerConfig {
            sweeps: SweepNames {
                increasing: "SAME".into(),
                decreasing: "SAME".into(),
            },
            ..SummarizerConfig::default()
        };
        assert!(matches!(config.validate(), Err(SummarizeError::Config(_))));
    }
}
