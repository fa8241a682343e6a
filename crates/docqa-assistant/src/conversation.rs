//! The ask/answer cycle and its transcript.
//!
//! Each exchange is one User turn followed by exactly one Assistant or
//! SystemError turn. The User turn is recorded before the engine is called,
//! so a failed exchange still shows the question, answered by an error.
//! Asks on one session are serialized so exchanges never interleave.

use std::time::Instant;

use anyhow::anyhow;

use docqa_core::{KnowledgeHandle, Organization, QueryError, Role, Session, SessionId, Turn};
use docqa_session::{SessionGates, SessionStore};

use crate::engine::{Answer, KnowledgeEngine};

/// Build the prompt sent to the engine for a user query.
///
/// The transcript keeps the raw query; only the engine sees the preamble.
pub fn compose_prompt(organization: Organization, query: &str) -> String {
    format!(
        "You are a Q&A assistant for the {organization} portal. \
         When the user says \"project\", \"uploaded project\" or \"PDF\", \
         they most likely mean the most recently uploaded document unless they say otherwise. \
         Answer from the uploaded documents first.\n{query}"
    )
}

/// Reply recorded for a question whose exchange never completed.
pub const INTERRUPTED_REPLY: &str =
    "Your previous question was interrupted before it could be answered. Please ask it again.";

pub struct ConversationManager<E> {
    engine: E,
    gates: SessionGates,
}

impl<E: KnowledgeEngine> ConversationManager<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            gates: SessionGates::new(),
        }
    }

    /// Ask a question against the session's knowledge base.
    ///
    /// Returns the Assistant turn on success. Engine failures are recorded
    /// as a SystemError turn and returned as [`QueryError::EngineFailure`].
    pub fn ask(
        &self,
        store: &dyn SessionStore,
        session_id: &SessionId,
        query: &str,
    ) -> Result<Turn, QueryError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(QueryError::EmptyQuery);
        }

        self.gates
            .with_gate(session_id, || self.exchange(store, session_id, query))
    }

    fn exchange(
        &self,
        store: &dyn SessionStore,
        session_id: &SessionId,
        query: &str,
    ) -> Result<Turn, QueryError> {
        // Readiness check and User turn in one atomic write. We hold the
        // gate, so a trailing User turn belongs to an exchange that died
        // before its reply was written; close it first.
        let mut opened: Option<(KnowledgeHandle, Organization, Turn)> = None;
        let mut interrupted = false;
        store.modify(session_id, &mut |s: &mut Session| {
            if let Some(handle) = s.serving_handle().cloned() {
                if s.transcript.turns().last().is_some_and(|t| t.role == Role::User) {
                    s.transcript.append(Role::SystemError, INTERRUPTED_REPLY);
                    interrupted = true;
                }
                let turn = s.transcript.append(Role::User, query);
                opened = Some((handle, s.organization, turn));
            }
        })?;

        let Some((handle, organization, user_turn)) = opened else {
            return Err(QueryError::NotReady);
        };
        if interrupted {
            tracing::warn!(session_id = %session_id, "Closed an unanswered question left by an interrupted exchange");
        }

        let start = Instant::now();
        let prompt = compose_prompt(organization, query);
        let reply = self.engine.query(&handle, &prompt).and_then(|reply| {
            reply
                .into_answer()
                .ok_or_else(|| anyhow!("engine returned an empty answer"))
        });

        match reply {
            Ok(Answer { text }) => {
                let turn = self.close_exchange(
                    store,
                    session_id,
                    &user_turn,
                    Role::Assistant,
                    &text,
                    query,
                )?;
                tracing::info!(
                    session_id = %session_id,
                    sequence_number = turn.sequence_number,
                    handle_id = %handle.id,
                    duration_ms = start.elapsed().as_millis(),
                    "Query answered"
                );
                Ok(turn)
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %session_id,
                    handle_id = %handle.id,
                    error = ?e,
                    "Engine query failed"
                );
                let message = format!(
                    "Sorry, I couldn't answer \"{query}\" because the knowledge engine failed. Please try again."
                );
                let turn = self.close_exchange(
                    store,
                    session_id,
                    &user_turn,
                    Role::SystemError,
                    &message,
                    query,
                )?;
                Err(QueryError::EngineFailure {
                    query: query.to_string(),
                    turn,
                })
            }
        }
    }

    /// Append the reply to `user_turn`, provided the exchange is still open.
    fn close_exchange(
        &self,
        store: &dyn SessionStore,
        session_id: &SessionId,
        user_turn: &Turn,
        role: Role,
        content: &str,
        query: &str,
    ) -> Result<Turn, QueryError> {
        let mut reply = None;
        store.modify(session_id, &mut |s: &mut Session| {
            let open = s.transcript.turns().last() == Some(user_turn);
            if open {
                reply = Some(s.transcript.append(role, content));
            }
        })?;

        reply.ok_or_else(|| {
            tracing::warn!(session_id = %session_id, "Session reset during query, dropping reply");
            QueryError::SessionReset {
                query: query.to_string(),
            }
        })
    }
}
