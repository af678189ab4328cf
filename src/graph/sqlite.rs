//! `SQLite` graph store: the default persistent backend.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]

use super::{Direction, GraphStats, GraphStore};
use crate::models::{
    AntiPattern, AntiPatternId, CalibrationProfile, CodeChange, CodeChangeId, Decision,
    DecisionId, DecisionOutcome, Engram, EngramId, Module, NegativeKnowledge,
    NegativeKnowledgeId, NodeRef, Outcome, OutcomeId, Relationship, RelationshipType, Skill,
    SkillId,
};
use crate::{Error, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Acquires the connection mutex, recovering from poisoning rather than
/// propagating a panic across worker tasks.
fn acquire_lock(mutex: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("graph sqlite mutex was poisoned, recovering");
            metrics::counter!("membria_graph_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

fn json_to_row<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::OperationFailed {
        operation: "serialize_graph_row".to_string(),
        cause: e.to_string(),
    })
}

fn json_from_row<T: for<'de> serde::Deserialize<'de>>(raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| Error::OperationFailed {
        operation: "deserialize_graph_row".to_string(),
        cause: e.to_string(),
    })
}

/// `SQLite`-backed [`GraphStore`].
///
/// # Concurrency model
///
/// A single `Mutex<Connection>` serializes all access; WAL mode and a
/// `busy_timeout` absorb the rest. Every node kind is stored in its own
/// table as an id column plus a `data` JSON blob — simple typed columns for
/// the fields queries actually filter on (module, outcome, domain, version),
/// full fidelity in the blob.
pub struct SqliteGraphStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl SqliteGraphStore {
    /// Opens (creating if absent) a `SQLite`-backed graph store at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::OperationFailed {
                operation: "create_graph_data_dir".to_string(),
                cause: e.to_string(),
            })?;
        }
        let conn = Connection::open(&db_path).map_err(|e| Error::OperationFailed {
            operation: "open_graph_sqlite".to_string(),
            cause: e.to_string(),
        })?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Opens an in-memory `SQLite` graph store (tests only).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::OperationFailed {
            operation: "open_graph_sqlite_memory".to_string(),
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
            "CREATE TABLE IF NOT EXISTS decisions (
                id TEXT PRIMARY KEY,
                module TEXT NOT NULL,
                outcome TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                session_id TEXT,
                data TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_decisions_module ON decisions(module);
            CREATE INDEX IF NOT EXISTS idx_decisions_outcome ON decisions(outcome);
            CREATE INDEX IF NOT EXISTS idx_decisions_session ON decisions(session_id);

            CREATE TABLE IF NOT EXISTS engrams (
                id TEXT PRIMARY KEY,
                created_at INTEGER NOT NULL,
                data TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_engrams_created_at ON engrams(created_at);

            CREATE TABLE IF NOT EXISTS code_changes (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS outcomes (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS negative_knowledge (
                id TEXT PRIMARY KEY,
                domain TEXT NOT NULL,
                expires_at INTEGER,
                data TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_nk_domain ON negative_knowledge(domain);

            CREATE TABLE IF NOT EXISTS antipatterns (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS skills (
                id TEXT PRIMARY KEY,
                domain TEXT NOT NULL,
                version INTEGER NOT NULL,
                data TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_skills_domain ON skills(domain);

            CREATE TABLE IF NOT EXISTS relationships (
                from_ref TEXT NOT NULL,
                to_ref TEXT NOT NULL,
                rel_type TEXT NOT NULL,
                weight REAL NOT NULL,
                created_at INTEGER NOT NULL,
                data TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_rel_from ON relationships(from_ref);
            CREATE INDEX IF NOT EXISTS idx_rel_to ON relationships(to_ref);

            CREATE TABLE IF NOT EXISTS calibration (
                domain TEXT PRIMARY KEY,
                data TEXT NOT NULL
            );",
        )
        .map_err(|e| Error::OperationFailed {
            operation: "create_graph_schema".to_string(),
            cause: e.to_string(),
        })?;

        Ok(())
    }

    fn row_to<T: for<'de> serde::Deserialize<'de>>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
        let raw: String = row.get(idx)?;
        serde_json::from_str(&raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
    }
}

impl GraphStore for SqliteGraphStore {
    fn put_decision(&self, decision: &Decision) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO decisions (id, module, outcome, created_at, session_id, data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET module=?2, outcome=?3, created_at=?4, session_id=?5, data=?6",
            params![
                decision.id.as_str(),
                decision.module.as_str(),
                decision.outcome.as_str(),
                decision.created_at,
                decision.session_id,
                json_to_row(decision)?,
            ],
        )?;
        Ok(())
    }

    fn get_decision(&self, id: &DecisionId) -> Result<Option<Decision>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT data FROM decisions WHERE id = ?1",
            params![id.as_str()],
            |row| Self::row_to(row, 0),
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_decisions(
        &self,
        module: Option<Module>,
        outcome: Option<DecisionOutcome>,
    ) -> Result<Vec<Decision>> {
        let conn = acquire_lock(&self.conn);
        let mut sql = "SELECT data FROM decisions WHERE 1=1".to_string();
        if module.is_some() {
            sql.push_str(" AND module = ?1");
        }
        if outcome.is_some() {
            sql.push_str(if module.is_some() { " AND outcome = ?2" } else { " AND outcome = ?1" });
        }
        let mut stmt = conn.prepare(&sql)?;
        let rows = match (module, outcome) {
            (Some(m), Some(o)) => stmt.query_map(params![m.as_str(), o.as_str()], |r| Self::row_to(r, 0)),
            (Some(m), None) => stmt.query_map(params![m.as_str()], |r| Self::row_to(r, 0)),
            (None, Some(o)) => stmt.query_map(params![o.as_str()], |r| Self::row_to(r, 0)),
            (None, None) => stmt.query_map(params![], |r| Self::row_to(r, 0)),
        }?;
        rows.collect::<rusqlite::Result<Vec<Decision>>>().map_err(Error::from)
    }

    fn put_engram(&self, engram: &Engram) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO engrams (id, created_at, data) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET created_at=?2, data=?3",
            params![engram.id.as_str(), engram.created_at, json_to_row(engram)?],
        )?;
        Ok(())
    }

    fn get_engram(&self, id: &EngramId) -> Result<Option<Engram>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row("SELECT data FROM engrams WHERE id = ?1", params![id.as_str()], |row| {
            Self::row_to(row, 0)
        })
        .optional()
        .map_err(Error::from)
    }

    fn list_engrams(&self) -> Result<Vec<Engram>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn.prepare("SELECT data FROM engrams ORDER BY created_at DESC")?;
        let rows = stmt.query_map(params![], |row| Self::row_to(row, 0))?;
        rows.collect::<rusqlite::Result<Vec<Engram>>>().map_err(Error::from)
    }

    fn list_decisions_by_session_window(
        &self,
        session_id: &str,
        since: i64,
        until: i64,
    ) -> Result<Vec<Decision>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn.prepare(
            "SELECT data FROM decisions WHERE session_id = ?1 AND created_at >= ?2 AND created_at <= ?3",
        )?;
        let rows = stmt.query_map(params![session_id, since, until], |row| Self::row_to(row, 0))?;
        rows.collect::<rusqlite::Result<Vec<Decision>>>().map_err(Error::from)
    }

    fn put_code_change(&self, change: &CodeChange) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO code_changes (id, data) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET data=?2",
            params![change.id.as_str(), json_to_row(change)?],
        )?;
        Ok(())
    }

    fn get_code_change(&self, id: &CodeChangeId) -> Result<Option<CodeChange>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row("SELECT data FROM code_changes WHERE id = ?1", params![id.as_str()], |row| {
            Self::row_to(row, 0)
        })
        .optional()
        .map_err(Error::from)
    }

    fn put_outcome(&self, outcome: &Outcome) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO outcomes (id, data) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET data=?2",
            params![outcome.id.as_str(), json_to_row(outcome)?],
        )?;
        Ok(())
    }

    fn get_outcome(&self, id: &OutcomeId) -> Result<Option<Outcome>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row("SELECT data FROM outcomes WHERE id = ?1", params![id.as_str()], |row| {
            Self::row_to(row, 0)
        })
        .optional()
        .map_err(Error::from)
    }

    fn put_negative_knowledge(&self, nk: &NegativeKnowledge) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO negative_knowledge (id, domain, expires_at, data) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET domain=?2, expires_at=?3, data=?4",
            params![nk.id.as_str(), nk.domain.as_str(), nk.expires_at, json_to_row(nk)?],
        )?;
        Ok(())
    }

    fn list_negative_knowledge(
        &self,
        domain: Option<Module>,
        now: i64,
    ) -> Result<Vec<NegativeKnowledge>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn.prepare(
            "SELECT data FROM negative_knowledge
             WHERE (expires_at IS NULL OR expires_at > ?1)
             AND (?2 IS NULL OR domain = ?2)",
        )?;
        let rows = stmt.query_map(params![now, domain.map(|d| d.as_str())], |row| Self::row_to(row, 0))?;
        rows.collect::<rusqlite::Result<Vec<NegativeKnowledge>>>().map_err(Error::from)
    }

    fn get_negative_knowledge(&self, id: &NegativeKnowledgeId) -> Result<Option<NegativeKnowledge>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT data FROM negative_knowledge WHERE id = ?1",
            params![id.as_str()],
            |row| Self::row_to(row, 0),
        )
        .optional()
        .map_err(Error::from)
    }

    fn put_antipattern(&self, ap: &AntiPattern) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO antipatterns (id, data) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET data=?2",
            params![ap.id.as_str(), json_to_row(ap)?],
        )?;
        Ok(())
    }

    fn list_antipatterns(&self) -> Result<Vec<AntiPattern>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn.prepare("SELECT data FROM antipatterns")?;
        let rows = stmt.query_map(params![], |row| Self::row_to(row, 0))?;
        rows.collect::<rusqlite::Result<Vec<AntiPattern>>>().map_err(Error::from)
    }

    fn put_skill(&self, skill: &Skill) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO skills (id, domain, version, data) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET domain=?2, version=?3, data=?4",
            params![skill.id.as_str(), skill.domain.as_str(), skill.version, json_to_row(skill)?],
        )?;
        Ok(())
    }

    fn get_skill(&self, id: &SkillId) -> Result<Option<Skill>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row("SELECT data FROM skills WHERE id = ?1", params![id.as_str()], |row| {
            Self::row_to(row, 0)
        })
        .optional()
        .map_err(Error::from)
    }

    fn list_skills(&self, domain: Module) -> Result<Vec<Skill>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt =
            conn.prepare("SELECT data FROM skills WHERE domain = ?1 ORDER BY version ASC")?;
        let rows = stmt.query_map(params![domain.as_str()], |row| Self::row_to(row, 0))?;
        rows.collect::<rusqlite::Result<Vec<Skill>>>().map_err(Error::from)
    }

    fn put_relationship(&self, rel: &Relationship) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO relationships (from_ref, to_ref, rel_type, weight, created_at, data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                rel.from.as_str(),
                rel.to.as_str(),
                rel.rel_type.as_str(),
                f64::from(rel.weight),
                rel.created_at,
                json_to_row(rel)?,
            ],
        )?;
        Ok(())
    }

    fn list_relationships(
        &self,
        node: &NodeRef,
        rel_type: Option<RelationshipType>,
        direction: Direction,
    ) -> Result<Vec<Relationship>> {
        let conn = acquire_lock(&self.conn);
        let col_clause = match direction {
            Direction::Outgoing => "from_ref = ?1",
            Direction::Incoming => "to_ref = ?1",
            Direction::Both => "(from_ref = ?1 OR to_ref = ?1)",
        };
        let sql = if rel_type.is_some() {
            format!("SELECT data FROM relationships WHERE {col_clause} AND rel_type = ?2")
        } else {
            format!("SELECT data FROM relationships WHERE {col_clause}")
        };
        let mut stmt = conn.prepare(&sql)?;
        let rows = if let Some(t) = rel_type {
            stmt.query_map(params![node.as_str(), t.as_str()], |row| Self::row_to(row, 0))
        } else {
            stmt.query_map(params![node.as_str()], |row| Self::row_to(row, 0))
        }?;
        rows.collect::<rusqlite::Result<Vec<Relationship>>>().map_err(Error::from)
    }

    fn get_calibration(&self, domain: Module) -> Result<CalibrationProfile> {
        let conn = acquire_lock(&self.conn);
        let found: Option<CalibrationProfile> = conn
            .query_row(
                "SELECT data FROM calibration WHERE domain = ?1",
                params![domain.as_str()],
                |row| Self::row_to(row, 0),
            )
            .optional()?;
        Ok(found.unwrap_or_else(|| CalibrationProfile::empty(domain, crate::current_timestamp())))
    }

    fn put_calibration(&self, profile: &CalibrationProfile) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO calibration (domain, data) VALUES (?1, ?2)
             ON CONFLICT(domain) DO UPDATE SET data=?2",
            params![profile.domain.as_str(), json_to_row(profile)?],
        )?;
        Ok(())
    }

    fn stats(&self) -> Result<GraphStats> {
        let conn = acquire_lock(&self.conn);
        let count = |table: &str| -> Result<usize> {
            let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?;
            Ok(n as usize)
        };
        Ok(GraphStats {
            decision_count: count("decisions")?,
            engram_count: count("engrams")?,
            code_change_count: count("code_changes")?,
            outcome_count: count("outcomes")?,
            negative_knowledge_count: count("negative_knowledge")?,
            antipattern_count: count("antipatterns")?,
            skill_count: count("skills")?,
            relationship_count: count("relationships")?,
        })
    }

    fn clear(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute_batch(
            "DELETE FROM decisions; DELETE FROM engrams; DELETE FROM code_changes;
             DELETE FROM outcomes; DELETE FROM negative_knowledge; DELETE FROM antipatterns;
             DELETE FROM skills; DELETE FROM relationships; DELETE FROM calibration;",
        )?;
        Ok(())
    }
}
