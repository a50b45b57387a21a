//! Database schema definitions
//!
//! One SQLite file holds the three state namespaces and the work queues.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Job State: identifier -> full task envelope
CREATE TABLE IF NOT EXISTS jobs (
    identifier TEXT PRIMARY KEY,
    correlation TEXT NOT NULL,
    status TEXT NOT NULL,
    body TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
CREATE INDEX IF NOT EXISTS idx_jobs_correlation ON jobs(correlation);

-- Domain State: per-domain politeness policy and lock (times in unix millis)
CREATE TABLE IF NOT EXISTS domains (
    domain TEXT PRIMARY KEY,
    valid INTEGER NOT NULL,
    locked INTEGER NOT NULL DEFAULT 0,
    holder TEXT,
    crawl_delay REAL NOT NULL,
    depth INTEGER NOT NULL DEFAULT 1,
    robots TEXT NOT NULL,
    lease_until INTEGER,
    expires_at INTEGER NOT NULL
);

-- Dedup index: hash(correlation, url) -> first claiming task
CREATE TABLE IF NOT EXISTS dedup (
    fingerprint TEXT PRIMARY KEY,
    identifier TEXT NOT NULL,
    claimed_at TEXT NOT NULL
);

-- Durable work queues
CREATE TABLE IF NOT EXISTS queue_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    queue TEXT NOT NULL,
    body TEXT NOT NULL,
    deliveries INTEGER NOT NULL DEFAULT 0,
    visible_at INTEGER NOT NULL,
    published_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_queue_visible ON queue_messages(queue, visible_at, id);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
