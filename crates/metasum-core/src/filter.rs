//! Classification of journal entries into summary, label, or ignored.
//!
//! Relevance is decided with `starts_with` on the label prefix, but the
//! label/scalar split afterwards uses `contains`. A scalar key that happens
//! to embed the prefix is therefore extracted as a label. Both checks are
//! kept as-is; see `scalar_key_embedding_prefix_is_routed_to_labels`.

use std::collections::{BTreeMap, HashSet};

use crate::config::SummarizerConfig;
use crate::entry::{LabelRecord, LogEntry};

/// Where a single entry goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryClass {
    /// Folded by the reducer.
    Summary,
    /// Extracted straight into a [`LabelRecord`].
    Label,
    /// Not touched by summarization.
    Ignored,
}

/// Entries of one batch split by destination.
#[derive(Debug, Default)]
pub struct Partition {
    /// Non-label entries grouped by workflow, each group in journal order.
    pub groups: BTreeMap<String, Vec<LogEntry>>,
    /// Labels in journal order; later entries overwrite earlier ones on upsert.
    pub labels: Vec<LabelRecord>,
    /// Count of entries dropped as irrelevant.
    pub ignored: usize,
}

#[derive(Debug, Clone)]
pub struct EntryFilter {
    scalar_keys: HashSet<String>,
    label_prefix: String,
    label_delimiter: char,
}

impl EntryFilter {
    pub fn new(
        scalar_keys: impl IntoIterator<Item = impl Into<String>>,
        label_prefix: impl Into<String>,
        label_delimiter: char,
    ) -> Self {
        Self {
            scalar_keys: scalar_keys.into_iter().map(Into::into).collect(),
            label_prefix: label_prefix.into(),
            label_delimiter,
        }
    }

    #[must_use]
    pub fn from_config(config: &SummarizerConfig) -> Self {
        Self::new(
            config.scalar_keys.iter().cloned(),
            config.label_prefix.clone(),
            config.label_delimiter,
        )
    }

    /// Workflow-scoped and keyed by a scalar key or the label prefix.
    #[must_use]
    pub fn is_summary_relevant(&self, entry: &LogEntry) -> bool {
        !entry.is_call_scoped()
            && (self.scalar_keys.contains(&entry.key) || entry.key.starts_with(&self.label_prefix))
    }

    #[must_use]
    pub fn classify(&self, entry: &LogEntry) -> EntryClass {
        if !self.is_summary_relevant(entry) {
            EntryClass::Ignored
        } else if entry.key.contains(&self.label_prefix) {
            EntryClass::Label
        } else {
            EntryClass::Summary
        }
    }

    /// Build the label row for a label-class entry: the key is everything
    /// after the first delimiter.
    #[must_use]
    pub fn extract_label(&self, entry: &LogEntry) -> LabelRecord {
        let key = entry
            .key
            .split_once(self.label_delimiter)
            .map_or(entry.key.as_str(), |(_, rest)| rest);
        LabelRecord {
            workflow_id: entry.workflow_id.clone(),
            key: key.to_string(),
            value: entry.value.clone(),
        }
    }

    /// Split a fetched batch. Consumes the entries so groups own them.
    #[must_use]
    pub fn partition(&self, entries: Vec<LogEntry>) -> Partition {
        let mut partition = Partition::default();
        for entry in entries {
            match self.classify(&entry) {
                EntryClass::Summary => partition
                    .groups
                    .entry(entry.workflow_id.clone())
                    .or_default()
                    .push(entry),
                EntryClass::Label => partition.labels.push(self.extract_label(&entry)),
                EntryClass::Ignored => partition.ignored += 1,
            }
        }
        partition
    }
}
