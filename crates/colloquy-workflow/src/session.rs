use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Utc};

use colloquy_core::state::SessionState;
use colloquy_core::types::SessionId;

/// One session held in memory.
///
/// Changes are serialized by the run lock, which is held for a whole stage.
/// The committed state sits behind its own lock and is only written when a
/// change is committed, so readers never wait on a stage in flight.
pub struct SessionEntry {
    run: tokio::sync::Mutex<()>,
    committed: RwLock<SessionState>,
}

impl SessionEntry {
    fn new(state: SessionState) -> Self {
        Self {
            run: tokio::sync::Mutex::new(()),
            committed: RwLock::new(state),
        }
    }

    /// Wait for exclusive right to change the session.
    pub async fn begin(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.run.lock().await
    }

    /// The last committed state.
    pub fn snapshot(&self) -> SessionState {
        self.committed
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Replace the committed state. Callers hold the guard from [`begin`](Self::begin).
    pub fn commit(&self, state: SessionState) {
        *self.committed.write().unwrap_or_else(|e| e.into_inner()) = state;
    }
}

pub type SessionCell = Arc<SessionEntry>;

struct SessionInfo {
    cell: SessionCell,
    started_at: DateTime<Utc>,
}

/// Tracks the sessions an engine has in memory.
pub struct SessionTable {
    sessions: Mutex<HashMap<SessionId, SessionInfo>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, SessionInfo>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, sid: &SessionId) -> Option<SessionCell> {
        self.lock().get(sid).map(|info| info.cell.clone())
    }

    /// Return the existing cell for `sid`, or insert `state` as a new one.
    pub fn get_or_insert(&self, sid: &SessionId, state: SessionState) -> SessionCell {
        self.lock()
            .entry(sid.clone())
            .or_insert_with(|| SessionInfo {
                cell: Arc::new(SessionEntry::new(state)),
                started_at: Utc::now(),
            })
            .cell
            .clone()
    }

    /// List known session ids, oldest first.
    pub fn list(&self) -> Vec<SessionId> {
        let sessions = self.lock();
        let mut entries: Vec<(DateTime<Utc>, SessionId)> = sessions
            .iter()
            .map(|(sid, info)| (info.started_at, sid.clone()))
            .collect();
        entries.sort_by_key(|(started_at, _)| *started_at);
        entries.into_iter().map(|(_, sid)| sid).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new()
    }
}
