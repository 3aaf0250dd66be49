//! SQLite-backed training-trace store.
//!
//! Trajectories are append-only. Task traces (plan records) are stored
//! alongside so the plan cache can rehydrate after eviction.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};

use super::{TraceOrigin, Trajectory};

/// Append-only trace store.
pub struct TraceStore {
    conn: Arc<Mutex<Connection>>,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS traces (
    id         TEXT PRIMARY KEY,
    goal       TEXT NOT NULL,
    origin     TEXT NOT NULL,
    accepted   INTEGER NOT NULL,
    payload    TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_traces_created ON traces(created_at);
CREATE TABLE IF NOT EXISTS task_traces (
    trace_id   TEXT PRIMARY KEY,
    payload    TEXT NOT NULL,
    created_at TEXT NOT NULL
);
";

impl TraceStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| Error::TraceStore(e.to_string()))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| Error::TraceStore(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory store, for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::TraceStore(e.to_string()))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| Error::TraceStore(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| Error::internal(format!("trace store lock: {e}")))?;
        f(&conn).map_err(|e| Error::TraceStore(e.to_string()))
    }

    /// Append a full accepted trajectory.
    pub fn append_trajectory(&self, trajectory: &Trajectory) -> Result<()> {
        let payload = serde_json::to_string(trajectory)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO traces (id, goal, origin, accepted, payload, created_at)
                 VALUES (?1, ?2, ?3, 1, ?4, ?5)",
                params![
                    trajectory.id,
                    trajectory.goal,
                    trajectory.origin.to_string(),
                    payload,
                    trajectory.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// Append a minimal block record for a denied trace.
    pub fn append_block_record(&self, id: &str, origin: TraceOrigin, run: f64) -> Result<()> {
        let payload = serde_json::json!({ "blocked": true, "alpha_run": run }).to_string();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO traces (id, goal, origin, accepted, payload, created_at)
                 VALUES (?1, '', ?2, 0, ?3, ?4)",
                params![id, origin.to_string(), payload, chrono::Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
    }

    /// Origins of the most recent accepted traces, newest first.
    pub fn recent_origins(&self, window: usize) -> Result<Vec<TraceOrigin>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT origin FROM traces WHERE accepted = 1
                 ORDER BY created_at DESC, rowid DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![window as i64], |row| {
                let origin: String = row.get(0)?;
                Ok(origin)
            })?;
            let mut origins = Vec::new();
            for row in rows {
                if let Some(origin) = TraceOrigin::parse(&row?) {
                    origins.push(origin);
                }
            }
            Ok(origins)
        })
    }

    /// Count accepted traces (for status endpoints).
    pub fn accepted_count(&self) -> Result<u64> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM traces WHERE accepted = 1", [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|c| c as u64)
        })
    }

    /// Persist a task trace (serialized plan record) for rehydration.
    pub fn save_task_trace(&self, trace_id: &str, payload: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO task_traces (trace_id, payload, created_at)
                 VALUES (?1, ?2, ?3)",
                params![trace_id, payload, chrono::Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
    }

    /// Load a task trace by id.
    pub fn load_task_trace(&self, trace_id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT payload FROM task_traces WHERE trace_id = ?1",
                params![trace_id],
                |row| row.get(0),
            )
            .optional()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_recent_origins() {
        let store = TraceStore::in_memory().unwrap();
        for i in 0..3i64 {
            let mut t = Trajectory::new(format!("goal {i}"), TraceOrigin::Live);
            t.created_at = chrono::Utc::now() + chrono::Duration::milliseconds(i);
            store.append_trajectory(&t).unwrap();
        }
        let t = Trajectory::new("variant goal", TraceOrigin::Variant);
        store.append_trajectory(&t).unwrap();

        let origins = store.recent_origins(10).unwrap();
        assert_eq!(origins.len(), 4);
        assert_eq!(store.accepted_count().unwrap(), 4);
    }

    #[test]
    fn block_records_are_not_accepted() {
        let store = TraceStore::in_memory().unwrap();
        store
            .append_block_record("blocked-1", TraceOrigin::Variant, 0.5)
            .unwrap();
        assert_eq!(store.accepted_count().unwrap(), 0);
        assert!(store.recent_origins(10).unwrap().is_empty());
    }

    #[test]
    fn task_traces_round_trip() {
        let store = TraceStore::in_memory().unwrap();
        store.save_task_trace("tr-1", "{\"plan\":true}").unwrap();
        assert_eq!(
            store.load_task_trace("tr-1").unwrap().as_deref(),
            Some("{\"plan\":true}")
        );
        assert!(store.load_task_trace("missing").unwrap().is_none());
    }

    #[test]
    fn persists_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traces.db");
        {
            let store = TraceStore::open(&path).unwrap();
            store
                .append_trajectory(&Trajectory::new("g", TraceOrigin::Live))
                .unwrap();
        }
        let store = TraceStore::open(&path).unwrap();
        assert_eq!(store.accepted_count().unwrap(), 1);
    }
}
