//! Database schema

/// Classification results. Timestamps are fixed-width UTC text with
/// millisecond precision, so text order is time order.
pub(crate) const CREATE_CLASSIFICATION_RESULTS: &str = r#"
CREATE TABLE IF NOT EXISTS classification_results (
    result_id TEXT PRIMARY KEY,
    user_id TEXT,
    filename TEXT NOT NULL,
    prediction TEXT NOT NULL CHECK (prediction IN ('Parasitized', 'Uninfected')),
    confidence REAL NOT NULL CHECK (confidence BETWEEN 0 AND 1),
    processing_time REAL NOT NULL CHECK (processing_time >= 0),
    timestamp TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    image_metadata TEXT
)
"#;

pub(crate) const CREATE_RESULTS_BY_USER_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_results_user_time
    ON classification_results (user_id, timestamp DESC, result_id DESC)
"#;

pub(crate) const CREATE_RESULTS_BY_TIME_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_results_time
    ON classification_results (timestamp DESC, result_id DESC)
"#;

/// Accounts; populated by an external auth service
pub(crate) const CREATE_USERS: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    user_id TEXT PRIMARY KEY,
    username TEXT UNIQUE NOT NULL,
    email TEXT UNIQUE NOT NULL,
    password_hash TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    last_login TEXT
)
"#;

pub(crate) const CREATE_MODEL_VERSIONS: &str = r#"
CREATE TABLE IF NOT EXISTS model_versions (
    version_id TEXT PRIMARY KEY,
    model_path TEXT NOT NULL,
    accuracy REAL CHECK (accuracy IS NULL OR accuracy BETWEEN 0 AND 1),
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    is_active INTEGER NOT NULL DEFAULT 0 CHECK (is_active IN (0, 1))
)
"#;

/// Applied in order on startup
pub(crate) const SCHEMA: &[&str] = &[
    CREATE_CLASSIFICATION_RESULTS,
    CREATE_RESULTS_BY_USER_INDEX,
    CREATE_RESULTS_BY_TIME_INDEX,
    CREATE_USERS,
    CREATE_MODEL_VERSIONS,
];
