//! `SQLite`-backed Signal Queue and Extraction Cache.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]

use super::{ExtractionCache, Signal, SignalQueue, SignalStatus};
use crate::models::{DecisionId, Module, SignalId};
use crate::{Error, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

fn acquire_lock(mutex: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("queue sqlite mutex was poisoned, recovering");
            metrics::counter!("membria_queue_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Column order matches the `signals` table definition: id, source_prompt,
/// source_response, patterns, module, status, attempts, next_retry_at,
/// created_at.
fn signal_from_row(row: &Row<'_>) -> rusqlite::Result<Signal> {
    let patterns_json: String = row.get(3)?;
    let module: String = row.get(4)?;
    let status: String = row.get(5)?;
    Ok(Signal {
        id: SignalId::from_raw(row.get::<_, String>(0)?),
        source_prompt: row.get(1)?,
        source_response: row.get(2)?,
        patterns: serde_json::from_str(&patterns_json).unwrap_or_default(),
        module: Module::parse(&module),
        status: parse_status(&status),
        attempts: row.get::<_, i64>(6)? as u32,
        next_retry_at: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn parse_status(s: &str) -> SignalStatus {
    match s {
        "extracting" => SignalStatus::Extracting,
        "extracted" => SignalStatus::Extracted,
        "failed" => SignalStatus::Failed,
        "dead" => SignalStatus::Dead,
        _ => SignalStatus::Pending,
    }
}

/// `SQLite`-backed [`SignalQueue`] and [`ExtractionCache`].
///
/// Both live in the same database file (and the same struct) because they
/// share a single writer connection and are always opened together by the
/// daemon.
pub struct SqliteQueue {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl SqliteQueue {
    /// Opens (creating if absent) a queue database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::OperationFailed {
                operation: "create_queue_data_dir".to_string(),
                cause: e.to_string(),
            })?;
        }
        let conn = Connection::open(&db_path).map_err(|e| Error::OperationFailed {
            operation: "open_queue_sqlite".to_string(),
            cause: e.to_string(),
        })?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Opens an in-memory queue database (tests only).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::OperationFailed {
            operation: "open_queue_sqlite_memory".to_string(),
            cause: e.to_string(),
        })?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };
        store.initialize()?;
        Ok(store)
    }

    /// Returns the database file path, if persistent.
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn initialize(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");
        let _ = conn.pragma_update(None, "busy_timeout", "5000");

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS signals (
                id TEXT PRIMARY KEY,
                source_prompt TEXT NOT NULL,
                source_response TEXT NOT NULL,
                patterns TEXT NOT NULL,
                module TEXT NOT NULL,
                status TEXT NOT NULL,
                attempts INTEGER NOT NULL,
                next_retry_at INTEGER,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_signals_status ON signals(status);

            CREATE TABLE IF NOT EXISTS extraction_cache (
                fingerprint TEXT PRIMARY KEY,
                decision_id TEXT NOT NULL
            );",
        )
        .map_err(|e| Error::OperationFailed {
            operation: "create_queue_schema".to_string(),
            cause: e.to_string(),
        })?;

        Ok(())
    }
}

impl SignalQueue for SqliteQueue {
    fn enqueue(&self, signal: &Signal) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        let patterns_json = serde_json::to_string(&signal.patterns).map_err(|e| Error::OperationFailed {
            operation: "serialize_signal_patterns".to_string(),
            cause: e.to_string(),
        })?;
        conn.execute(
            "INSERT INTO signals
                (id, source_prompt, source_response, patterns, module, status, attempts, next_retry_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                source_prompt=?2, source_response=?3, patterns=?4, module=?5,
                status=?6, attempts=?7, next_retry_at=?8, created_at=?9",
            params![
                signal.id.as_str(),
                signal.source_prompt,
                signal.source_response,
                patterns_json,
                signal.module.as_str(),
                signal.status.as_str(),
                i64::from(signal.attempts),
                signal.next_retry_at,
                signal.created_at,
            ],
        )?;
        Ok(())
    }

    fn dequeue_batch(&self, limit: usize, now: i64) -> Result<Vec<Signal>> {
        let conn = acquire_lock(&self.conn);
        let ids: Vec<String> = {
            let mut stmt = conn.prepare(
                "SELECT id FROM signals
                 WHERE status = 'pending'
                    OR (status = 'failed' AND (next_retry_at IS NULL OR next_retry_at <= ?1))
                 ORDER BY created_at ASC
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![now, limit as i64], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<Vec<String>>>()?
        };

        for id in &ids {
            conn.execute("UPDATE signals SET status = 'extracting' WHERE id = ?1", params![id])?;
        }

        let mut out = Vec::with_capacity(ids.len());
        for id in &ids {
            let signal = conn
                .query_row("SELECT * FROM signals WHERE id = ?1", params![id], signal_from_row)
                .optional()?;
            if let Some(signal) = signal {
                out.push(signal);
            }
        }
        Ok(out)
    }

    fn update(&self, signal: &Signal) -> Result<()> {
        self.enqueue(signal)
    }

    fn get(&self, id: &SignalId) -> Result<Option<Signal>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row("SELECT * FROM signals WHERE id = ?1", params![id.as_str()], signal_from_row)
            .optional()
            .map_err(Error::from)
    }

    fn count_by_status(&self, status: SignalStatus) -> Result<usize> {
        let conn = acquire_lock(&self.conn);
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM signals WHERE status = ?1",
            params![status.as_str()],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }
}

impl ExtractionCache for SqliteQueue {
    fn get(&self, fingerprint: &str) -> Result<Option<DecisionId>> {
        let conn = acquire_lock(&self.conn);
        let raw: Option<String> = conn
            .query_row(
                "SELECT decision_id FROM extraction_cache WHERE fingerprint = ?1",
                params![fingerprint],
                |row| row.get(0),
            )
            .optional()?;
        Ok(raw.map(DecisionId::from_raw))
    }

    fn put(&self, fingerprint: &str, decision_id: &DecisionId) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        let existing: Option<String> = conn
            .query_row(
                "SELECT decision_id FROM extraction_cache WHERE fingerprint = ?1",
                params![fingerprint],
                |row| row.get(0),
            )
            .optional()?;
        match existing {
            Some(ref d) if d != decision_id.as_str() => Err(Error::Validation(format!(
                "fingerprint {fingerprint} already mapped to a different decision"
            ))),
            Some(_) => Ok(()),
            None => {
                conn.execute(
                    "INSERT INTO extraction_cache (fingerprint, decision_id) VALUES (?1, ?2)",
                    params![fingerprint, decision_id.as_str()],
                )?;
                Ok(())
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_then_dequeue_claims_batch() {
        let queue = SqliteQueue::in_memory().unwrap();
        let signal = Signal::new("p", "r", vec!["I recommend".to_string()], Module::Backend, 100);
        let id = signal.id.clone();
        queue.enqueue(&signal).unwrap();

        let batch = queue.dequeue_batch(10, 200).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].status, SignalStatus::Extracting);

        let reloaded = queue.get(&id).unwrap().unwrap();
        assert_eq!(reloaded.status, SignalStatus::Extracting);
    }

    #[test]
    fn failed_signal_respects_backoff_window() {
        let queue = SqliteQueue::in_memory().unwrap();
        let mut signal = Signal::new("p", "r", vec![], Module::Other, 0);
        signal.record_failure(0);
        let retry_at = signal.next_retry_at.unwrap();
        queue.enqueue(&signal).unwrap();

        assert!(queue.dequeue_batch(10, retry_at - 1).unwrap().is_empty());
        assert_eq!(queue.dequeue_batch(10, retry_at).unwrap().len(), 1);
    }

    #[test]
    fn extraction_cache_rejects_reassignment() {
        let queue = SqliteQueue::in_memory().unwrap();
        let d1 = DecisionId::generate();
        let d2 = DecisionId::generate();
        queue.put("fp1", &d1).unwrap();
        assert!(queue.put("fp1", &d1).is_ok());
        assert!(queue.put("fp1", &d2).is_err());
        assert_eq!(ExtractionCache::get(&queue, "fp1").unwrap(), Some(d1));
    }

    #[test]
    fn count_by_status_reflects_transitions() {
        let queue = SqliteQueue::in_memory().unwrap();
        queue.enqueue(&Signal::new("p", "r", vec![], Module::Other, 0)).unwrap();
        assert_eq!(queue.count_by_status(SignalStatus::Pending).unwrap(), 1);
        queue.dequeue_batch(10, 0).unwrap();
        assert_eq!(queue.count_by_status(SignalStatus::Extracting).unwrap(), 1);
    }
}
