//! Database schema management

use rusqlite::Connection;
use tokio_rusqlite::Error;

/// Initialize the database schema and connection pragmas.
pub fn init_schema(conn: &Connection) -> Result<(), Error> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- Learned selector patterns, one per (app, signature)
CREATE TABLE IF NOT EXISTS patterns (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    app_package TEXT NOT NULL,
    signature TEXT NOT NULL,
    selector TEXT NOT NULL,
    success_count INTEGER NOT NULL DEFAULT 0,
    failure_count INTEGER NOT NULL DEFAULT 0,
    confidence REAL NOT NULL DEFAULT 0.5,
    created_at TEXT NOT NULL,
    last_used_at TEXT NOT NULL,
    UNIQUE (app_package, signature)
);

-- Append-only outcome log; prunable independently of patterns
CREATE TABLE IF NOT EXISTS interaction_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pattern_id INTEGER NOT NULL,
    outcome TEXT NOT NULL,
    latency_ms INTEGER,
    recorded_at TEXT NOT NULL,
    FOREIGN KEY (pattern_id) REFERENCES patterns(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_patterns_app ON patterns(app_package);
CREATE INDEX IF NOT EXISTS idx_patterns_last_used ON patterns(last_used_at);
CREATE INDEX IF NOT EXISTS idx_log_pattern ON interaction_log(pattern_id);
CREATE INDEX IF NOT EXISTS idx_log_recorded ON interaction_log(recorded_at);
"#;
