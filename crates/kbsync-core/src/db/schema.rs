//! Canonical SQLite schema for the local sync store.
//!
//! - `ticket_index` holds one row per processed root ticket: its summary,
//!   the descendant count the summary was generated from, and the summary hash
//! - `ticket_descendants` holds the flattened descendant list of each row
//! - `bot_submissions` records what each classifier bot is believed to hold,
//!   keyed by (ticket, bot)

/// Migration v1: ticket index, descendants and bot submissions.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS ticket_index (
    ticket_key TEXT PRIMARY KEY,
    summary TEXT NOT NULL,
    child_count INTEGER NOT NULL DEFAULT 0 CHECK (child_count >= 0),
    summary_hash TEXT NOT NULL CHECK (length(summary_hash) = 64),
    bot_response_received INTEGER NOT NULL DEFAULT 0 CHECK (bot_response_received IN (0, 1)),
    processed_version INTEGER NOT NULL DEFAULT 1,
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS ticket_descendants (
    parent_key TEXT NOT NULL REFERENCES ticket_index(ticket_key) ON DELETE CASCADE,
    child_key TEXT NOT NULL,
    title TEXT NOT NULL,
    position INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL,
    PRIMARY KEY (parent_key, child_key)
);

CREATE TABLE IF NOT EXISTS bot_submissions (
    ticket_key TEXT NOT NULL,
    bot_name TEXT NOT NULL CHECK (length(trim(bot_name)) > 0),
    bot_kind TEXT NOT NULL CHECK (bot_kind IN ('ai_bot_platform', 'alpha_knowledge')),
    remote_id TEXT,
    summary_text TEXT NOT NULL,
    summary_hash TEXT NOT NULL,
    action TEXT NOT NULL CHECK (action IN ('add', 'update')),
    status TEXT NOT NULL DEFAULT 'submitted',
    submitted_at_us INTEGER NOT NULL,
    PRIMARY KEY (ticket_key, bot_name)
);
";

/// Migration v2: read-path indexes.
pub const MIGRATION_V2_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_bot_submissions_bot
    ON bot_submissions(bot_name, submitted_at_us);

CREATE INDEX IF NOT EXISTS idx_ticket_descendants_parent_position
    ON ticket_descendants(parent_key, position);
";

/// Indexes expected after all migrations have run.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_bot_submissions_bot",
    "idx_ticket_descendants_parent_position",
];
