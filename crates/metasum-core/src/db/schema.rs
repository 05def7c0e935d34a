//! SQLite schema for the metadata journal and its summaries.
//!
//! - `metadata_entry` is the append-only journal; `needs_summarization`
//!   is the only column this crate ever updates
//! - `workflow_summary` holds one row per workflow, plus the entry ids that
//!   supplied its name, status, parent and root
//! - `custom_label` holds one row per `(workflow, label key)`
//! - `summary_status` holds one watermark row per sweep name

/// Migration v1: journal, summary, label and watermark tables.
pub const MIGRATION_V1_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS metadata_entry (
    entry_id INTEGER PRIMARY KEY AUTOINCREMENT,
    workflow_id TEXT NOT NULL CHECK (length(trim(workflow_id)) > 0),
    metadata_key TEXT NOT NULL,
    call_name TEXT,
    job_index INTEGER,
    job_attempt INTEGER,
    metadata_value TEXT NOT NULL,
    needs_summarization INTEGER DEFAULT 1 CHECK (needs_summarization IN (0, 1)),
    created_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS workflow_summary (
    workflow_id TEXT PRIMARY KEY,
    workflow_name TEXT,
    workflow_status TEXT,
    submission_at_us INTEGER,
    start_at_us INTEGER,
    end_at_us INTEGER,
    parent_workflow_id TEXT,
    root_workflow_id TEXT,
    archive_status TEXT NOT NULL DEFAULT 'Unarchived'
);

CREATE TABLE IF NOT EXISTS custom_label (
    workflow_id TEXT NOT NULL,
    label_key TEXT NOT NULL,
    label_value TEXT NOT NULL,
    PRIMARY KEY (workflow_id, label_key)
);

CREATE TABLE IF NOT EXISTS summary_status (
    sweep_name TEXT PRIMARY KEY,
    position INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL
);
"#;

/// Migration v2: read-path indexes, including the partial index that keeps
/// flag-mode fetches from scanning already summarized rows.
pub const MIGRATION_V2_SQL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_metadata_entry_workflow
    ON metadata_entry(workflow_id, entry_id);

CREATE INDEX IF NOT EXISTS idx_metadata_entry_needs_summarization
    ON metadata_entry(entry_id)
    WHERE needs_summarization = 1;

CREATE INDEX IF NOT EXISTS idx_workflow_summary_status
    ON workflow_summary(workflow_status, end_at_us DESC);

CREATE INDEX IF NOT EXISTS idx_workflow_summary_root
    ON workflow_summary(root_workflow_id);

CREATE INDEX IF NOT EXISTS idx_custom_label_key_value
    ON custom_label(label_key, label_value, workflow_id);
"#;

/// Migration v3: journal ids backing the last-writer summary fields, so a
/// fold can tell whether an incoming value is newer than the stored one.
pub const MIGRATION_V3_SQL: &str = r#"
ALTER TABLE workflow_summary ADD COLUMN name_entry_id INTEGER;
ALTER TABLE workflow_summary ADD COLUMN status_entry_id INTEGER;
ALTER TABLE workflow_summary ADD COLUMN parent_entry_id INTEGER;
ALTER TABLE workflow_summary ADD COLUMN root_entry_id INTEGER;
"#;

/// Indexes expected after all migrations have run.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_metadata_entry_workflow",
    "idx_metadata_entry_needs_summarization",
    "idx_workflow_summary_status",
    "idx_workflow_summary_root",
    "idx_custom_label_key_value",
];
