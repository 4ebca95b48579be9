//! The workflow engine: drives sessions through the research graph one
//! suspension point at a time.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use colloquy_core::error::{ColloquyError, Result};
use colloquy_core::event::{EventBus, WorkflowEvent};
use colloquy_core::state::{SessionSnapshot, SessionState, WorkflowNode, SNAPSHOT_VERSION};
use colloquy_core::traits::{SessionStore, StructuredGenerator};
use colloquy_core::types::{SessionId, SourceConfig};
use colloquy_tools::ToolRegistry;

use crate::graph::WorkflowGraph;
use crate::session::{SessionCell, SessionTable};
use crate::stages::{QuestionExtractor, StageRunner};
use crate::transition;

/// Returned by [`WorkflowEngine::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub session_id: SessionId,
    pub suspended_at: WorkflowNode,
}

/// Resumable, checkpointed research workflow.
///
/// Each call runs at most one stage, commits its update, and persists the
/// session at the gate that follows. A failing call leaves the session
/// exactly as it was.
pub struct WorkflowEngine {
    graph: WorkflowGraph,
    runner: StageRunner,
    sessions: SessionTable,
    store: Option<Arc<dyn SessionStore>>,
    events: Arc<EventBus>,
}

impl WorkflowEngine {
    pub fn new(generator: Arc<dyn StructuredGenerator>, tools: ToolRegistry) -> Result<Self> {
        Ok(Self {
            graph: WorkflowGraph::research()?,
            runner: StageRunner::new(generator, Arc::new(tools)),
            sessions: SessionTable::new(),
            store: None,
            events: Arc::new(EventBus::default()),
        })
    }

    /// Persist snapshots to `store` and fall back to it for unknown sessions.
    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn QuestionExtractor>) -> Self {
        self.runner = self.runner.with_extractor(extractor);
        self
    }

    /// Abandon any stage that runs longer than `timeout`.
    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.runner = self.runner.with_stage_timeout(timeout);
        self
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Validate the session setup, run the first stage and suspend at its gate.
    pub async fn start(
        &self,
        topic: &str,
        max_participants: usize,
        sources: Vec<SourceConfig>,
    ) -> Result<SessionHandle> {
        self.validate_start(topic, max_participants, &sources)?;

        let sid = SessionId::new();
        let mut initial = SessionState::new(topic, max_participants, sources);
        initial.position = self.graph.entry();

        info!(session_id = %sid, topic, max_participants, "Session started");
        self.events.publish(WorkflowEvent::SessionStarted {
            session_id: sid.clone(),
            topic: topic.to_string(),
        });

        let state = self.advance(&sid, initial).await?;
        self.persist(&sid, &state).await?;

        let suspended_at = state.position;
        self.sessions.get_or_insert(&sid, state);
        self.announce(&sid, suspended_at);

        Ok(SessionHandle {
            session_id: sid,
            suspended_at,
        })
    }

    /// Inject `feedback`, route from the current gate and run at most one stage.
    ///
    /// At `Terminal` this is a no-op and the feedback is discarded.
    pub async fn resume(&self, sid: &SessionId, feedback: Option<String>) -> Result<WorkflowNode> {
        let cell = self.session(sid).await?;
        let run = cell.begin().await;
        let current = cell.snapshot();

        if current.is_terminal() {
            if feedback.as_deref().is_some_and(|f| !f.trim().is_empty()) {
                info!(session_id = %sid, "Session is terminal, feedback discarded");
            }
            return Ok(WorkflowNode::Terminal);
        }

        let mut staged = current;
        staged.pending_feedback = feedback;

        let next = self.advance(sid, staged).await?;
        self.persist(sid, &next).await?;

        let position = next.position;
        cell.commit(next);
        drop(run);

        self.announce(sid, position);
        Ok(position)
    }

    /// The session's last committed state. Does not wait for a stage in
    /// flight.
    pub async fn inspect(&self, sid: &SessionId) -> Result<SessionState> {
        let cell = self.session(sid).await?;
        Ok(cell.snapshot())
    }

    /// Load a persisted snapshot, replacing any in-memory state for its session.
    pub async fn restore(&self, snapshot: SessionSnapshot) -> Result<()> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(ColloquyError::Persistence(format!(
                "Unsupported snapshot version {} (expected {})",
                snapshot.version, SNAPSHOT_VERSION
            )));
        }

        let sid = snapshot.session_id;
        let position = snapshot.state.position;
        match self.sessions.get(&sid) {
            Some(cell) => {
                let _run = cell.begin().await;
                cell.commit(snapshot.state);
            }
            None => {
                self.sessions.get_or_insert(&sid, snapshot.state);
            }
        }
        info!(session_id = %sid, node = %position, "Session restored");
        Ok(())
    }

    /// Session ids held in memory, oldest first.
    pub fn sessions(&self) -> Vec<SessionId> {
        self.sessions.list()
    }

    fn validate_start(&self, topic: &str, max_participants: usize, sources: &[SourceConfig]) -> Result<()> {
        let invalid = |msg: String| -> Result<()> { Err(ColloquyError::Configuration(msg)) };

        if topic.trim().is_empty() {
            return invalid("topic must not be empty".into());
        }
        if max_participants == 0 {
            return invalid("max_participants must be at least 1".into());
        }

        let mut names = HashSet::new();
        for source in sources {
            if !names.insert(source.name.as_str()) {
                return invalid(format!("duplicate source '{}'", source.name));
            }
        }

        let enabled: Vec<&SourceConfig> = sources.iter().filter(|s| s.enabled).collect();
        if enabled.is_empty() {
            return invalid("at least one source must be enabled".into());
        }
        if let Some(missing) = enabled.iter().find(|s| !self.runner.tools().contains(&s.name)) {
            return invalid(format!(
                "source '{}' is enabled but no tool is registered for it",
                missing.name
            ));
        }
        Ok(())
    }

    /// Find a session in memory, falling back to the store.
    async fn session(&self, sid: &SessionId) -> Result<SessionCell> {
        if let Some(cell) = self.sessions.get(sid) {
            return Ok(cell);
        }
        if let Some(store) = &self.store {
            if let Some(snapshot) = store.load(sid).await? {
                debug!(session_id = %sid, "Session loaded from store");
                return Ok(self.sessions.get_or_insert(sid, snapshot.state));
            }
        }
        Err(ColloquyError::SessionNotFound(sid.to_string()))
    }

    /// Route from the current position and run at most one stage on a copy
    /// of the state. The caller commits the returned state.
    async fn advance(&self, sid: &SessionId, mut state: SessionState) -> Result<SessionState> {
        let mut node = state.position;

        if node.is_gate() {
            let route = transition::decide(node, &state).ok_or_else(|| {
                ColloquyError::Configuration(format!("no route out of '{}'", node))
            })?;
            node = route.target();
            debug!(session_id = %sid, ?route, node = %node, "Routed from review gate");
        }

        if node.is_terminal() {
            state.position = WorkflowNode::Terminal;
            state.pending_feedback = None;
            return Ok(state);
        }

        let stage = node.stage().ok_or_else(|| {
            ColloquyError::Configuration(format!("node '{}' does not run a stage", node))
        })?;
        state.position = node;

        let feedback = state.feedback().map(str::to_string);
        info!(session_id = %sid, stage = %stage, feedback = feedback.is_some(), "Stage started");
        self.events.publish(WorkflowEvent::StageStarted {
            session_id: sid.clone(),
            stage,
            feedback,
        });

        let started = Instant::now();
        let update = match self.runner.run(stage, &state).await {
            Ok(update) => update,
            Err(e) => {
                error!(session_id = %sid, stage = %stage, error = %e, "Stage failed");
                self.events.publish(WorkflowEvent::StageFailed {
                    session_id: sid.clone(),
                    stage,
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        state.apply(update);
        state.pending_feedback = None;
        state.position = self.graph.next(node, &state).ok_or_else(|| {
            ColloquyError::Configuration(format!("stage '{}' has no review gate", node))
        })?;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(session_id = %sid, stage = %stage, elapsed_ms, "Stage committed");
        self.events.publish(WorkflowEvent::StageCommitted {
            session_id: sid.clone(),
            stage,
            elapsed_ms,
        });

        Ok(state)
    }

    async fn persist(&self, sid: &SessionId, state: &SessionState) -> Result<()> {
        if let Some(store) = &self.store {
            store.save(&SessionSnapshot::capture(sid, state)).await?;
        }
        Ok(())
    }

    fn announce(&self, sid: &SessionId, position: WorkflowNode) {
        if position.is_terminal() {
            info!(session_id = %sid, "Session complete");
            self.events.publish(WorkflowEvent::Completed {
                session_id: sid.clone(),
            });
        } else {
            info!(session_id = %sid, node = %position, "Suspended for review");
            self.events.publish(WorkflowEvent::Suspended {
                session_id: sid.clone(),
                gate: position,
            });
        }
    }
}
