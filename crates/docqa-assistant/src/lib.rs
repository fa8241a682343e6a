//! docqa-assistant: Session, ingestion, and conversation orchestration for document Q&A.
//!
//! Every user action (login, upload, ask, reset) is handled as an isolated
//! event: the session is rehydrated from the [`SessionStore`], the event is
//! routed through the ingestor, knowledge-base builder, or conversation
//! manager, and the result is persisted before the response is returned.
//! No state lives in the orchestrator between events apart from the per-session
//! gates that serialize overlapping events.

pub mod auth;
pub mod conversation;
pub mod engine;
pub mod knowledge;
pub mod local_engine;
pub mod timeout;

pub use auth::{CredentialVerifier, StaticCredentials};
pub use conversation::ConversationManager;
pub use engine::{Answer, EngineReply, KnowledgeEngine};
pub use knowledge::{BuildOutcome, KnowledgeBaseBuilder};
pub use local_engine::LocalIndexEngine;

use std::sync::Arc;

use docqa_core::config::{IngestConfig, MergeMode, PartialFailurePolicy};
use docqa_core::error::Result;
use docqa_core::events::{Event, IngestResult, Response, SessionStatus, UploadedFile};
use docqa_core::{AuthError, DocumentSet, Fingerprint, Organization, Session, SessionId, Turn};
use docqa_ingest::{DocumentIngestor, PlainTextExtractor, TextExtractor};
use docqa_session::{fingerprint, SessionStore};

/// Documents extracted from an upload, ready to build from.
pub(crate) struct Prepared {
    pub documents: DocumentSet,
    pub fingerprint: Fingerprint,
    pub skipped: Vec<String>,
    /// Session generation the upload was accepted under.
    pub generation: u64,
}

/// The public surface consumed by the UI/CLI layer.
pub struct Orchestrator<E, X = PlainTextExtractor> {
    store: Arc<dyn SessionStore>,
    credentials: Box<dyn CredentialVerifier>,
    ingestor: DocumentIngestor<X>,
    partial_failure: PartialFailurePolicy,
    builder: KnowledgeBaseBuilder<Arc<E>>,
    conversation: ConversationManager<Arc<E>>,
    default_organization: Organization,
}

impl<E: KnowledgeEngine, X: TextExtractor> Orchestrator<E, X> {
    pub fn new(
        store: Arc<dyn SessionStore>,
        credentials: impl CredentialVerifier + 'static,
        engine: E,
        extractor: X,
        ingest: &IngestConfig,
    ) -> Self {
        let engine = Arc::new(engine);
        Self {
            store,
            credentials: Box::new(credentials),
            ingestor: DocumentIngestor::new(extractor, ingest.combined_separator.clone()),
            partial_failure: ingest.partial_failure,
            builder: KnowledgeBaseBuilder::new(engine.clone()),
            conversation: ConversationManager::new(engine),
            default_organization: Organization::default(),
        }
    }

    /// Organization assigned to sessions when they log in.
    pub fn with_default_organization(mut self, organization: Organization) -> Self {
        self.default_organization = organization;
        self
    }

    /// Handle one event end to end. Errors become [`Response::Failed`].
    pub fn handle(&self, session_id: &SessionId, event: Event) -> Response {
        let outcome = match event {
            Event::Login { username, password } => self
                .login(session_id, &username, password.expose())
                .map(|()| Response::LoggedIn),
            Event::Logout => self.logout(session_id).map(|()| Response::LoggedOut),
            Event::SelectOrganization { organization } => self
                .select_organization(session_id, organization)
                .map(|()| Response::OrganizationSelected { organization }),
            Event::Upload { files, merge_mode } => self
                .ingest_documents(session_id, &files, merge_mode)
                .map(Response::Ingested),
            Event::Ask { query } => self
                .ask(session_id, &query)
                .map(|turn| Response::Answered { turn }),
            Event::GetTranscript => self
                .get_transcript(session_id)
                .map(|turns| Response::Transcript { turns }),
            Event::Status => self.status(session_id).map(Response::Status),
            Event::Reset => self.reset(session_id).map(|()| Response::Reset),
        };

        outcome.unwrap_or_else(|e| Response::Failed {
            message: e.to_string(),
        })
    }

    pub fn login(&self, session_id: &SessionId, username: &str, password: &str) -> Result<()> {
        if !self.credentials.verify(username, password) {
            tracing::warn!(session_id = %session_id, "Login rejected");
            return Err(AuthError::InvalidCredentials.into());
        }

        let default_organization = self.default_organization;
        self.store.modify(session_id, &mut |s: &mut Session| {
            if !s.authenticated {
                s.authenticated = true;
                s.organization = default_organization;
            }
        })?;

        tracing::info!(session_id = %session_id, "Logged in");
        Ok(())
    }

    /// Log out, discarding everything the session held.
    pub fn logout(&self, session_id: &SessionId) -> Result<()> {
        self.reset(session_id)
    }

    pub fn select_organization(
        &self,
        session_id: &SessionId,
        organization: Organization,
    ) -> Result<()> {
        self.require_login(session_id)?;
        self.store.modify(session_id, &mut |s: &mut Session| {
            if s.authenticated {
                s.organization = organization;
            }
        })?;
        Ok(())
    }

    /// Extract the uploaded files and build (or reuse) a knowledge base.
    ///
    /// An empty upload changes nothing and reports the current readiness.
    pub fn ingest_documents(
        &self,
        session_id: &SessionId,
        files: &[UploadedFile],
        merge_mode: MergeMode,
    ) -> Result<IngestResult> {
        let Some(prepared) = self.prepare(session_id, files, merge_mode)? else {
            return self.unchanged(session_id);
        };
        self.build(session_id, prepared)
    }

    /// Ask a question. Engine failures are recorded in the transcript and
    /// returned as [`docqa_core::QueryError::EngineFailure`].
    pub fn ask(&self, session_id: &SessionId, query: &str) -> Result<Turn> {
        self.require_login(session_id)?;
        Ok(self.conversation.ask(self.store.as_ref(), session_id, query)?)
    }

    pub fn get_transcript(&self, session_id: &SessionId) -> Result<Vec<Turn>> {
        let session = self.store.get(session_id)?;
        Ok(session.transcript.turns().to_vec())
    }

    pub fn status(&self, session_id: &SessionId) -> Result<SessionStatus> {
        let session = self.store.get(session_id)?;
        Ok(SessionStatus {
            phase: session.phase(),
            organization: session.organization,
            fingerprint: session.document_fingerprint.clone(),
            turns: session.transcript.len(),
        })
    }

    pub fn reset(&self, session_id: &SessionId) -> Result<()> {
        self.store.reset(session_id)?;
        tracing::info!(session_id = %session_id, "Session reset");
        Ok(())
    }

    fn require_login(&self, session_id: &SessionId) -> Result<Session> {
        let session = self.store.get(session_id)?;
        if !session.authenticated {
            return Err(AuthError::NotAuthenticated(session_id.clone()).into());
        }
        Ok(session)
    }

    /// Extract and resolve an upload. `None` for an empty upload.
    pub(crate) fn prepare(
        &self,
        session_id: &SessionId,
        files: &[UploadedFile],
        merge_mode: MergeMode,
    ) -> Result<Option<Prepared>> {
        let generation = self.require_login(session_id)?.generation;
        if files.is_empty() {
            return Ok(None);
        }

        let (documents, skipped) = self
            .ingestor
            .ingest(files, merge_mode)
            .resolve(self.partial_failure)?;
        if !skipped.is_empty() {
            tracing::warn!(session_id = %session_id, skipped = ?skipped, "Unreadable files skipped");
        }

        Ok(Some(Prepared {
            fingerprint: fingerprint(&documents),
            documents,
            skipped,
            generation,
        }))
    }

    pub(crate) fn build(&self, session_id: &SessionId, prepared: Prepared) -> Result<IngestResult> {
        let outcome = self.builder.build_for(
            self.store.as_ref(),
            session_id,
            prepared.generation,
            &prepared.documents,
        )?;

        Ok(IngestResult {
            ready: true,
            rebuilt: outcome.rebuilt,
            fingerprint: Some(outcome.handle.fingerprint),
            documents: prepared.documents.len(),
            skipped: prepared.skipped,
        })
    }

    pub(crate) fn unchanged(&self, session_id: &SessionId) -> Result<IngestResult> {
        let session = self.store.get(session_id)?;
        Ok(IngestResult {
            ready: session.ready,
            rebuilt: false,
            fingerprint: None,
            documents: 0,
            skipped: Vec::new(),
        })
    }
}
