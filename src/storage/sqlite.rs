//! SQLite storage implementation
//!
//! This module provides a SQLite-backed implementation of the `StateStore`
//! and `WorkQueue` traits. Several worker processes may open the same
//! database file; every trait method maps to one statement or one
//! `BEGIN IMMEDIATE` transaction so the check and the write cannot be
//! interleaved by another connection.

use crate::robots::ParsedRobots;
use crate::state::{DomainState, JobStatus};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{
    DedupClaim, Delivery, StateStore, StorageError, StorageResult, WorkQueue,
};
use crate::task::Task;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// How long a statement waits on another process's write lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite storage backend
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) the shared database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStore)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        // WAL lets readers proceed while one worker writes
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates a private in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Appends an already serialized message to a queue
    pub fn publish_raw(&self, queue: &str, body: &str) -> StorageResult<()> {
        let now = Utc::now();
        self.conn()?.execute(
            "INSERT INTO queue_messages (queue, body, deliveries, visible_at, published_at)
             VALUES (?1, ?2, 0, ?3, ?4)",
            params![queue, body, to_millis(now), now.to_rfc3339()],
        )?;
        Ok(())
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Database("connection mutex poisoned".to_string()))
    }
}

fn to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn deadline(delay: Duration) -> i64 {
    let delay = chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::days(1));
    to_millis(Utc::now() + delay)
}

/// Raw `domains` row; robots rules are decoded after the row is read
struct DomainRow {
    domain: String,
    valid: bool,
    locked: bool,
    holder: Option<String>,
    crawl_delay: f64,
    depth: u32,
    robots: String,
    lease_until: Option<i64>,
    expires_at: i64,
}

impl DomainRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            domain: row.get(0)?,
            valid: row.get(1)?,
            locked: row.get(2)?,
            holder: row.get(3)?,
            crawl_delay: row.get(4)?,
            depth: row.get(5)?,
            robots: row.get(6)?,
            lease_until: row.get(7)?,
            expires_at: row.get(8)?,
        })
    }

    fn into_state(self) -> StorageResult<DomainState> {
        let robots: ParsedRobots = serde_json::from_str(&self.robots)?;
        Ok(DomainState {
            domain: self.domain,
            valid: self.valid,
            lock: self.locked,
            holder: self.holder,
            crawl_delay: self.crawl_delay,
            depth: self.depth,
            robots,
            lease_until: self.lease_until.map(from_millis),
            expires_at: from_millis(self.expires_at),
        })
    }
}

const DOMAIN_COLUMNS: &str =
    "domain, valid, locked, holder, crawl_delay, depth, robots, lease_until, expires_at";

impl StateStore for SqliteStore {
    // ===== Job State =====

    fn put_job(&self, task: &Task) -> StorageResult<()> {
        let body = task.to_json()?;
        let now = Utc::now().to_rfc3339();
        self.conn()?.execute(
            "INSERT INTO jobs (identifier, correlation, status, body, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(identifier) DO UPDATE SET
                status = excluded.status,
                body = excluded.body,
                updated_at = excluded.updated_at",
            params![
                task.identifier,
                task.correlation,
                task.status.to_db_string(),
                body,
                now
            ],
        )?;
        Ok(())
    }

    fn get_job(&self, identifier: &str) -> StorageResult<Option<Task>> {
        let body: Option<String> = self
            .conn()?
            .query_row(
                "SELECT body FROM jobs WHERE identifier = ?1",
                params![identifier],
                |row| row.get(0),
            )
            .optional()?;

        match body {
            Some(body) => Ok(Some(Task::from_json(&body)?)),
            None => Ok(None),
        }
    }

    fn jobs_for_correlation(&self, correlation: &str) -> StorageResult<Vec<Task>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT body FROM jobs WHERE correlation = ?1 ORDER BY rowid")?;
        let bodies = stmt
            .query_map(params![correlation], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        bodies
            .iter()
            .map(|body| Task::from_json(body).map_err(StorageError::from))
            .collect()
    }

    fn count_jobs_by_status(&self) -> StorageResult<HashMap<JobStatus, u64>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status")?;

        let mut counts = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        for row in rows {
            let (status, count) = row?;
            if let Some(status) = JobStatus::from_db_string(&status) {
                counts.insert(status, count as u64);
            }
        }

        Ok(counts)
    }

    // ===== Domain State =====

    fn get_domain(&self, domain: &str) -> StorageResult<Option<DomainState>> {
        let row = self
            .conn()?
            .query_row(
                &format!("SELECT {} FROM domains WHERE domain = ?1", DOMAIN_COLUMNS),
                params![domain],
                DomainRow::from_row,
            )
            .optional()?;

        match row {
            Some(row) if row.expires_at > to_millis(Utc::now()) => Ok(Some(row.into_state()?)),
            _ => Ok(None),
        }
    }

    fn store_domain_policy(&self, state: &DomainState) -> StorageResult<DomainState> {
        let robots = serde_json::to_string(&state.robots)?;
        let now = to_millis(Utc::now());

        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // An expired entry is replaced unless its lock is still leased
        tx.execute(
            "INSERT INTO domains (domain, valid, locked, holder, crawl_delay, depth, robots, lease_until, expires_at)
             VALUES (?1, ?2, 0, NULL, ?3, ?4, ?5, NULL, ?6)
             ON CONFLICT(domain) DO UPDATE SET
                valid = excluded.valid,
                locked = 0,
                holder = NULL,
                crawl_delay = excluded.crawl_delay,
                depth = excluded.depth,
                robots = excluded.robots,
                lease_until = NULL,
                expires_at = excluded.expires_at
             WHERE domains.expires_at <= ?7
               AND (domains.locked = 0 OR domains.lease_until <= ?7)",
            params![
                state.domain,
                state.valid,
                state.crawl_delay,
                state.depth,
                robots,
                to_millis(state.expires_at),
                now
            ],
        )?;

        let row = tx.query_row(
            &format!("SELECT {} FROM domains WHERE domain = ?1", DOMAIN_COLUMNS),
            params![state.domain],
            DomainRow::from_row,
        )?;
        tx.commit()?;

        row.into_state()
    }

    fn try_lock_domain(
        &self,
        domain: &str,
        holder: &str,
        lease: Duration,
    ) -> StorageResult<bool> {
        let now = to_millis(Utc::now());
        let changed = self.conn()?.execute(
            "UPDATE domains SET locked = 1, holder = ?2, lease_until = ?3
             WHERE domain = ?1 AND (locked = 0 OR lease_until IS NULL OR lease_until <= ?4)",
            params![domain, holder, deadline(lease), now],
        )?;
        Ok(changed == 1)
    }

    fn unlock_domain(&self, domain: &str, holder: &str) -> StorageResult<bool> {
        let changed = self.conn()?.execute(
            "UPDATE domains SET locked = 0, holder = NULL, lease_until = NULL, depth = depth + 1
             WHERE domain = ?1 AND locked = 1 AND holder = ?2",
            params![domain, holder],
        )?;
        Ok(changed == 1)
    }

    // ===== Dedup Index =====

    fn claim_fingerprint(&self, fingerprint: &str, identifier: &str) -> StorageResult<DedupClaim> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO dedup (fingerprint, identifier, claimed_at) VALUES (?1, ?2, ?3)",
            params![fingerprint, identifier, Utc::now().to_rfc3339()],
        )?;

        if inserted == 1 {
            return Ok(DedupClaim::Claimed);
        }

        let owner: String = conn.query_row(
            "SELECT identifier FROM dedup WHERE fingerprint = ?1",
            params![fingerprint],
            |row| row.get(0),
        )?;
        Ok(DedupClaim::AlreadyClaimed(owner))
    }

    fn fingerprint_owner(&self, fingerprint: &str) -> StorageResult<Option<String>> {
        let owner = self
            .conn()?
            .query_row(
                "SELECT identifier FROM dedup WHERE fingerprint = ?1",
                params![fingerprint],
                |row| row.get(0),
            )
            .optional()?;
        Ok(owner)
    }

    fn count_fingerprints(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM dedup", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl WorkQueue for SqliteStore {
    fn publish(&self, queue: &str, task: &Task) -> StorageResult<()> {
        self.publish_raw(queue, &task.to_json()?)
    }

    fn receive(&self, queue: &str, visibility: Duration) -> StorageResult<Option<Delivery>> {
        let now = to_millis(Utc::now());
        let delivery = self
            .conn()?
            .query_row(
                "UPDATE queue_messages SET visible_at = ?1, deliveries = deliveries + 1
                 WHERE id = (
                    SELECT id FROM queue_messages
                    WHERE queue = ?2 AND visible_at <= ?3
                    ORDER BY id LIMIT 1
                 )
                 RETURNING id, queue, body, deliveries",
                params![deadline(visibility), queue, now],
                |row| {
                    Ok(Delivery {
                        id: row.get(0)?,
                        queue: row.get(1)?,
                        body: row.get(2)?,
                        deliveries: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(delivery)
    }

    fn ack(&self, delivery: &Delivery) -> StorageResult<()> {
        self.conn()?.execute(
            "DELETE FROM queue_messages WHERE id = ?1",
            params![delivery.id],
        )?;
        Ok(())
    }

    fn nack(&self, delivery: &Delivery, delay: Duration) -> StorageResult<()> {
        self.conn()?.execute(
            "UPDATE queue_messages SET visible_at = ?1 WHERE id = ?2",
            params![deadline(delay), delivery.id],
        )?;
        Ok(())
    }

    fn depth(&self, queue: &str) -> StorageResult<u64> {
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM queue_messages WHERE queue = ?1",
            params![queue],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
