use std::collections::HashMap;

use futures::future::BoxFuture;
use tokio::sync::RwLock;

use colloquy_core::error::Result;
use colloquy_core::state::SessionSnapshot;
use colloquy_core::traits::{SessionStore, StoredSession};
use colloquy_core::types::SessionId;

/// Process-local snapshot store. Nothing survives a restart.
#[derive(Default)]
pub struct MemorySessionStore {
    snapshots: RwLock<HashMap<SessionId, SessionSnapshot>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn save(&self, snapshot: &SessionSnapshot) -> BoxFuture<'_, Result<()>> {
        let snapshot = snapshot.clone();
        Box::pin(async move {
            self.snapshots
                .write()
                .await
                .insert(snapshot.session_id.clone(), snapshot);
            Ok(())
        })
    }

    fn load(&self, sid: &SessionId) -> BoxFuture<'_, Result<Option<SessionSnapshot>>> {
        let sid = sid.clone();
        Box::pin(async move { Ok(self.snapshots.read().await.get(&sid).cloned()) })
    }

    fn delete(&self, sid: &SessionId) -> BoxFuture<'_, Result<bool>> {
        let sid = sid.clone();
        Box::pin(async move { Ok(self.snapshots.write().await.remove(&sid).is_some()) })
    }

    fn list(&self) -> BoxFuture<'_, Result<Vec<StoredSession>>> {
        Box::pin(async move {
            let mut sessions: Vec<StoredSession> = self
                .snapshots
                .read()
                .await
                .values()
                .map(|s| StoredSession {
                    session_id: s.session_id.clone(),
                    topic: s.state.topic.clone(),
                    position: s.state.position.as_str().to_string(),
                    updated_at: s.updated_at,
                })
                .collect();
            sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            Ok(sessions)
        })
    }
}
