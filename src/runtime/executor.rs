//! Session runtime executor

use super::{IntakeOutcome, SessionError, SessionSnapshot, SessionUpdate, TurnOutcome};

use crate::llm::Role;
use crate::moderation::ModerationGate;
use crate::reply::{ReplyContext, ReplyError, ReplyProtocol};
use crate::state_machine::{
    transition, Effect, Event, EventType, Message, Session, SessionContext, TransitionError,
};
use crate::transcript;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

/// What one call into the runtime produced
#[derive(Debug, Default)]
struct RunReport {
    last_reply: Option<String>,
    warning: Option<String>,
    failure: Option<ReplyError>,
}

/// Drives one session: runs transitions, executes their effects and feeds
/// generated events back in until the session settles.
pub struct SessionRuntime {
    context: SessionContext,
    session: Session,
    gate: ModerationGate,
    protocol: Arc<dyn ReplyProtocol>,
    broadcast_tx: broadcast::Sender<SessionUpdate>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

impl SessionRuntime {
    pub fn new(
        session_id: impl Into<String>,
        gate: ModerationGate,
        protocol: Arc<dyn ReplyProtocol>,
        broadcast_tx: broadcast::Sender<SessionUpdate>,
    ) -> Self {
        let session_id = session_id.into();
        let context = SessionContext::new(session_id.clone(), protocol.kind());
        let session = Session::new(session_id);
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::of(&session));
        Self {
            context,
            session,
            gate,
            protocol,
            broadcast_tx,
            snapshot_tx,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Receiver that always holds the latest published snapshot
    pub fn subscribe_snapshots(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub async fn submit_intake(
        &mut self,
        event_type: EventType,
        key_fact: String,
    ) -> Result<IntakeOutcome, SessionError> {
        let event = Event::IntakeSubmitted {
            event_type,
            key_fact,
        };
        match self.run(event).await {
            Err(TransitionError::IncompleteIntake) => {
                tracing::debug!(session_id = %self.context.session_id, "Intake incomplete, form re-presented");
                Ok(IntakeOutcome::Incomplete)
            }
            Err(e) => Err(e.into()),
            Ok(RunReport {
                failure: Some(e), ..
            }) => Err(e.into()),
            Ok(report) => Ok(IntakeOutcome::Started {
                greeting: report.last_reply.unwrap_or_default(),
            }),
        }
    }

    pub async fn send_message(&mut self, text: String) -> Result<TurnOutcome, SessionError> {
        let report = self.run(Event::UserMessage { text }).await?;
        if let Some(e) = report.failure {
            return Err(e.into());
        }
        if let Some(warning) = report.warning {
            return Ok(TurnOutcome::Blocked { warning });
        }
        Ok(TurnOutcome::Replied {
            reply: report.last_reply.unwrap_or_default(),
        })
    }

    /// Process an event and every event its effects generate
    async fn run(&mut self, event: Event) -> Result<RunReport, TransitionError> {
        let mut report = RunReport::default();
        let mut queue = VecDeque::new();

        // Exclusive access means nobody else is mid-turn: a busy state here
        // was left behind by a turn whose future got dropped
        if self.session.state.is_busy() {
            tracing::warn!(
                session_id = %self.context.session_id,
                state = ?self.session.state,
                "Recovering abandoned turn"
            );
            queue.push_back(Event::TurnAbandoned);
        }
        queue.push_back(event);

        while let Some(event) = queue.pop_front() {
            let result = transition(&self.session.state, &self.context, event)?;

            tracing::debug!(
                session_id = %self.context.session_id,
                from = ?self.session.state,
                to = ?result.new_state,
                effects = result.effects.len(),
                "State transition"
            );
            self.session.state = result.new_state;

            for effect in result.effects {
                match self.execute_effect(effect, &mut report).await {
                    Ok(Some(next)) => queue.push_back(next),
                    Ok(None) => {}
                    Err(e) => {
                        // Remaining effects of this transition are abandoned
                        queue.push_back(Event::ReplyFailed {
                            message: e.to_string(),
                        });
                        report.failure = Some(e);
                        break;
                    }
                }
            }

            self.publish_snapshot();
        }

        Ok(report)
    }

    async fn execute_effect(
        &mut self,
        effect: Effect,
        report: &mut RunReport,
    ) -> Result<Option<Event>, ReplyError> {
        match effect {
            Effect::RecordIntake {
                event_type,
                key_fact,
            } => {
                self.session.event_type = event_type;
                self.session.key_fact = key_fact;
                Ok(None)
            }

            Effect::AppendMessage { role, content } => {
                if role == Role::Assistant {
                    report.last_reply = Some(content.clone());
                }
                self.session.conversation.push(Message::new(role, content));
                Ok(None)
            }

            Effect::OpenThread => {
                if let Some(thread) = &self.session.thread_ref {
                    tracing::debug!(session_id = %self.context.session_id, thread = %thread, "Reusing existing thread");
                    return Ok(None);
                }
                self.session.thread_ref = self.protocol.open_thread().await?;
                Ok(None)
            }

            Effect::MirrorToThread { role, content } => {
                let thread = self
                    .session
                    .thread_ref
                    .as_ref()
                    .ok_or(ReplyError::MissingThread)?;
                self.protocol.mirror(thread, role, &content).await?;
                Ok(None)
            }

            Effect::PrimeThread { content } => {
                if self.session.thread_primer.as_deref() == Some(content.as_str()) {
                    tracing::debug!(session_id = %self.context.session_id, "Thread already primed");
                    return Ok(None);
                }
                let thread = self
                    .session
                    .thread_ref
                    .as_ref()
                    .ok_or(ReplyError::MissingThread)?;
                self.protocol.mirror(thread, Role::User, &content).await?;
                self.session.thread_primer = Some(content);
                Ok(None)
            }

            Effect::Screen { text } => {
                let verdict = self.gate.screen(&text).await;
                Ok(Some(Event::Screened { verdict }))
            }

            Effect::RequestReply => {
                let history = self.session.chat_history();
                let reply = self
                    .protocol
                    .get_reply(ReplyContext {
                        history: &history,
                        thread: self.session.thread_ref.as_ref(),
                    })
                    .await?;
                Ok(Some(Event::ReplyReceived { text: reply }))
            }

            Effect::ActivateSession => {
                if self.session.intake_complete {
                    tracing::warn!(session_id = %self.context.session_id, "Session activated twice");
                }
                self.session.intake_complete = true;
                tracing::info!(
                    session_id = %self.context.session_id,
                    event_type = self.session.event_type.label(),
                    "Session active"
                );
                Ok(None)
            }

            Effect::ResetIntake => {
                tracing::info!(session_id = %self.context.session_id, "Intake reopened");
                self.session.conversation.clear();
                self.session.intake_complete = false;
                self.session.event_type = EventType::Unset;
                self.session.key_fact.clear();
                Ok(None)
            }

            Effect::Warn { message } => {
                let _ = self
                    .broadcast_tx
                    .send(SessionUpdate::Warning { message: message.clone() });
                report.warning = Some(message);
                Ok(None)
            }

            Effect::Render => {
                let _ = self.broadcast_tx.send(SessionUpdate::Transcript {
                    transcript: transcript::render(&self.session.conversation),
                });
                Ok(None)
            }
        }
    }

    fn publish_snapshot(&self) {
        self.snapshot_tx
            .send_replace(SessionSnapshot::of(&self.session));
    }
}
