//! Runtime for executing chat sessions
//!
//! Each session runtime sits behind an async mutex so one session is
//! processed strictly sequentially. A caller that finds the lock taken is
//! turned away as busy instead of queueing behind an in-flight reply.

mod executor;

#[cfg(test)]
pub mod testing;

pub use executor::SessionRuntime;

use crate::moderation::ModerationGate;
use crate::reply::{ProtocolKind, ReplyError, ReplyProtocol};
use crate::state_machine::{EventType, Session, SessionPhase, SessionState, TransitionError};
use crate::transcript::{self, Transcript};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, watch, Mutex, OwnedMutexGuard, RwLock};
use tokio::time::Instant;

/// Upper bound on how often idle sessions are swept
const REAP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Reply(#[from] ReplyError),
}

/// Result of an intake submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeOutcome {
    Started { greeting: String },
    /// Form re-presented, nothing changed
    Incomplete,
}

/// Result of a user turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Replied { reply: String },
    /// Moderation flagged the text; nothing was appended or sent
    Blocked { warning: String },
}

/// Updates pushed to connected clients
#[derive(Debug, Clone)]
pub enum SessionUpdate {
    Transcript { transcript: Transcript },
    Warning { message: String },
}

/// Read-only view of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub phase: SessionPhase,
    pub state: SessionState,
    pub busy: bool,
    pub intake_complete: bool,
    pub event_type: EventType,
    pub key_fact: String,
    pub transcript: Transcript,
}

impl SessionSnapshot {
    pub fn of(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            phase: session.state.phase(),
            state: session.state.clone(),
            busy: session.state.is_busy(),
            intake_complete: session.intake_complete,
            event_type: session.event_type,
            key_fact: session.key_fact.clone(),
            transcript: transcript::render(&session.conversation),
        }
    }
}

/// Handle to interact with one session
#[derive(Clone)]
pub struct SessionHandle {
    runtime: Arc<Mutex<SessionRuntime>>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
    pub broadcast_tx: broadcast::Sender<SessionUpdate>,
}

impl SessionHandle {
    /// Exclusive access for a state-changing call; busy while another runs
    pub fn try_acquire(&self) -> Result<OwnedMutexGuard<SessionRuntime>, SessionError> {
        Arc::clone(&self.runtime)
            .try_lock_owned()
            .map_err(|_| SessionError::Transition(TransitionError::Busy))
    }

    /// Latest published state, readable while a turn is in flight
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.broadcast_tx.subscribe()
    }

    /// A turn holds the lock or a client is streaming updates
    fn in_use(&self) -> bool {
        self.runtime.try_lock().is_err() || self.broadcast_tx.receiver_count() > 0
    }
}

struct SessionEntry {
    handle: SessionHandle,
    last_seen: Instant,
}

/// Table of live sessions
pub struct SessionManager {
    gate: ModerationGate,
    protocol: Arc<dyn ReplyProtocol>,
    sessions: RwLock<HashMap<String, SessionEntry>>,
}

impl SessionManager {
    pub fn new(gate: ModerationGate, protocol: Arc<dyn ReplyProtocol>) -> Self {
        Self {
            gate,
            protocol,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn protocol_kind(&self) -> ProtocolKind {
        self.protocol.kind()
    }

    /// Start a new session in `AwaitingIntake`
    pub async fn create(&self) -> SessionHandle {
        let id = uuid::Uuid::new_v4().to_string();
        let (broadcast_tx, _) = broadcast::channel(128);
        let runtime = SessionRuntime::new(
            id.clone(),
            self.gate.clone(),
            Arc::clone(&self.protocol),
            broadcast_tx.clone(),
        );
        let handle = SessionHandle {
            snapshot_rx: runtime.subscribe_snapshots(),
            runtime: Arc::new(Mutex::new(runtime)),
            broadcast_tx,
        };

        self.sessions.write().await.insert(
            id.clone(),
            SessionEntry {
                handle: handle.clone(),
                last_seen: Instant::now(),
            },
        );
        tracing::info!(session_id = %id, protocol = self.protocol.kind().as_str(), "Session started");
        handle
    }

    /// Look up a session and mark it as seen
    pub async fn get(&self, id: &str) -> Result<SessionHandle, SessionError> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        entry.last_seen = Instant::now();
        Ok(entry.handle.clone())
    }

    /// Drop a session; an in-flight turn finishes on its own
    pub async fn end(&self, id: &str) -> Result<(), SessionError> {
        match self.sessions.write().await.remove(id) {
            Some(_) => {
                tracing::info!(session_id = %id, "Session ended");
                Ok(())
            }
            None => Err(SessionError::NotFound(id.to_string())),
        }
    }

    /// Drop sessions untouched for `max_idle` that nobody is using
    pub async fn reap_idle(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|id, entry| {
            let keep = now.duration_since(entry.last_seen) < max_idle || entry.handle.in_use();
            if !keep {
                tracing::info!(session_id = %id, "Session expired");
            }
            keep
        });
        before - sessions.len()
    }

    /// Start the background sweep that expires idle sessions.
    /// `max_idle` must be non-zero.
    pub fn start_reaper(self: &Arc<Self>, max_idle: Duration) {
        let manager = Arc::clone(self);
        let period = max_idle.min(REAP_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let expired = manager.reap_idle(max_idle).await;
                if expired > 0 {
                    tracing::debug!(expired, "Idle sessions swept");
                }
            }
        });
    }
}
