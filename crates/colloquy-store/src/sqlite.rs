use chrono::{DateTime, SecondsFormat, Utc};
use futures::future::BoxFuture;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

use colloquy_core::error::{ColloquyError, Result};
use colloquy_core::state::{SessionSnapshot, SessionState, SNAPSHOT_VERSION};
use colloquy_core::traits::{SessionStore, StoredSession};
use colloquy_core::types::SessionId;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS sessions (
        session_id TEXT PRIMARY KEY,
        version INTEGER NOT NULL,
        state_json TEXT NOT NULL,
        position TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_sessions_updated ON sessions(updated_at);";

fn db_err(e: impl ToString) -> ColloquyError {
    ColloquyError::Database(e.to_string())
}

fn timestamp(dt: &DateTime<Utc>) -> String {
    // Fixed precision keeps the text column sortable.
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// SQLite-backed store of session snapshots, one row per session.
pub struct SqliteSessionStore {
    conn: Mutex<Connection>,
}

impl SqliteSessionStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Create parent directories
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ColloquyError::Database(format!("Failed to create db directory: {}", e))
            })?;
        }

        let conn = Connection::open(path).map_err(db_err)?;

        // Enable WAL mode for better concurrent performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        debug!(path = %path.display(), "Session store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl SessionStore for SqliteSessionStore {
    fn save(&self, snapshot: &SessionSnapshot) -> BoxFuture<'_, Result<()>> {
        let sid = snapshot.session_id.0.clone();
        let version = snapshot.version;
        let position = snapshot.state.position.as_str();
        let updated_at = timestamp(&snapshot.updated_at);
        let state_json = serde_json::to_string(&snapshot.state);

        Box::pin(async move {
            let state_json = state_json?;
            let conn = self.conn.lock().map_err(db_err)?;
            conn.execute(
                "INSERT INTO sessions (session_id, version, state_json, position, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(session_id) DO UPDATE SET
                    version = excluded.version,
                    state_json = excluded.state_json,
                    position = excluded.position,
                    updated_at = excluded.updated_at",
                params![sid, version, state_json, position, updated_at],
            )
            .map_err(db_err)?;
            debug!(session_id = %sid, position, "Snapshot saved");
            Ok(())
        })
    }

    fn load(&self, sid: &SessionId) -> BoxFuture<'_, Result<Option<SessionSnapshot>>> {
        let sid = sid.clone();

        Box::pin(async move {
            let row = {
                let conn = self.conn.lock().map_err(db_err)?;
                conn.query_row(
                    "SELECT version, state_json, updated_at FROM sessions WHERE session_id = ?1",
                    params![sid.0],
                    |row| {
                        let version: u32 = row.get(0)?;
                        let state_json: String = row.get(1)?;
                        let updated_at: String = row.get(2)?;
                        Ok((version, state_json, updated_at))
                    },
                )
                .optional()
                .map_err(db_err)?
            };

            let Some((version, state_json, updated_at)) = row else {
                return Ok(None);
            };

            if version != SNAPSHOT_VERSION {
                return Err(ColloquyError::Persistence(format!(
                    "Session {} has snapshot version {} (expected {})",
                    sid, version, SNAPSHOT_VERSION
                )));
            }

            let state: SessionState = serde_json::from_str(&state_json).map_err(|e| {
                ColloquyError::Persistence(format!("Corrupt state for session {}: {}", sid, e))
            })?;

            Ok(Some(SessionSnapshot {
                version,
                session_id: sid,
                state,
                updated_at: parse_timestamp(&updated_at),
            }))
        })
    }

    fn delete(&self, sid: &SessionId) -> BoxFuture<'_, Result<bool>> {
        let sid = sid.0.clone();

        Box::pin(async move {
            let conn = self.conn.lock().map_err(db_err)?;
            let removed = conn
                .execute("DELETE FROM sessions WHERE session_id = ?1", params![sid])
                .map_err(db_err)?;
            Ok(removed > 0)
        })
    }

    fn list(&self) -> BoxFuture<'_, Result<Vec<StoredSession>>> {
        Box::pin(async move {
            let conn = self.conn.lock().map_err(db_err)?;

            let mut stmt = conn
                .prepare(
                    "SELECT session_id, json_extract(state_json, '$.topic'), position, updated_at
                     FROM sessions
                     ORDER BY updated_at DESC",
                )
                .map_err(db_err)?;

            let rows = stmt
                .query_map([], |row| {
                    let sid: String = row.get(0)?;
                    let topic: Option<String> = row.get(1)?;
                    let position: String = row.get(2)?;
                    let updated_at: String = row.get(3)?;
                    Ok(StoredSession {
                        session_id: SessionId(sid),
                        topic: topic.unwrap_or_default(),
                        position,
                        updated_at: parse_timestamp(&updated_at),
                    })
                })
                .map_err(db_err)?;

            let mut sessions = Vec::new();
            for row in rows {
                sessions.push(row.map_err(db_err)?);
            }
            Ok(sessions)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use colloquy_core::state::WorkflowNode;
    use colloquy_test_utils::sample_state;

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let store = SqliteSessionStore::in_memory().unwrap();
        let sid = SessionId::new();
        let snapshot = SessionSnapshot::capture(&sid, &sample_state());

        store.save(&snapshot).await.unwrap();
        let loaded = store.load(&sid).await.unwrap().unwrap();

        assert_eq!(loaded.state, snapshot.state);
        assert_eq!(loaded.session_id, sid);
        assert_eq!(loaded.version, SNAPSHOT_VERSION);
    }

    #[tokio::test]
    async fn save_replaces_previous_snapshot() {
        let store = SqliteSessionStore::in_memory().unwrap();
        let sid = SessionId::new();
        let mut state = sample_state();
        store.save(&SessionSnapshot::capture(&sid, &state)).await.unwrap();

        state.position = WorkflowNode::GenerateReport;
        store.save(&SessionSnapshot::capture(&sid, &state)).await.unwrap();

        let loaded = store.load(&sid).await.unwrap().unwrap();
        assert_eq!(loaded.state.position, WorkflowNode::GenerateReport);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_session_loads_as_none() {
        let store = SqliteSessionStore::in_memory().unwrap();
        assert!(store.load(&SessionId::from_str("nope")).await.unwrap().is_none());
        assert!(!store.delete(&SessionId::from_str("nope")).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_version_is_rejected() {
        let store = SqliteSessionStore::in_memory().unwrap();
        let sid = SessionId::new();
        let mut snapshot = SessionSnapshot::capture(&sid, &sample_state());
        snapshot.version = SNAPSHOT_VERSION + 1;
        store.save(&snapshot).await.unwrap();

        let err = store.load(&sid).await.unwrap_err();
        assert!(matches!(err, ColloquyError::Persistence(_)));
    }

    #[tokio::test]
    async fn list_orders_by_most_recent() {
        let store = SqliteSessionStore::in_memory().unwrap();
        let older = SessionId::from_str("older");
        let newer = SessionId::from_str("newer");

        let mut snapshot = SessionSnapshot::capture(&older, &sample_state());
        snapshot.updated_at = Utc::now() - Duration::minutes(5);
        store.save(&snapshot).await.unwrap();
        store
            .save(&SessionSnapshot::capture(&newer, &sample_state()))
            .await
            .unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed[0].session_id, newer);
        assert_eq!(listed[1].session_id, older);
        assert_eq!(listed[0].topic, "renewable energy policy");
        assert_eq!(listed[0].position, "review_interviews");

        assert!(store.delete(&older).await.unwrap());
        assert_eq!(store.list().await.unwrap().len(), 1);
    }
}
