//! Core domain types for document sessions.
//!
//! A [`Session`] is the persisted record that every event rehydrates:
//! auth flag, organization, the knowledge handle currently serving, and the
//! conversation transcript.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

// ── Session identity ──────────────────────────────────────────────

const MAX_SESSION_ID_LEN: usize = 64;

/// Identifier of one logical user session.
///
/// Ids are used as file names by the file-backed store, so only ASCII
/// alphanumerics, `-` and `_` are accepted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        let valid = !raw.is_empty()
            && raw.len() <= MAX_SESSION_ID_LEN
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::InvalidSessionId(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    /// A random session id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SessionId {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Organization ──────────────────────────────────────────────────

/// The organization portal a session is working under.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Organization {
    #[default]
    Pedagogy,
    AlFayhaa,
}

impl Organization {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Pedagogy => "Pedagogy",
            Self::AlFayhaa => "Al Fayhaa",
        }
    }

    /// Portal title shown above the conversation.
    pub fn title(&self) -> String {
        format!("{} Knowledge Assistant", self.display_name())
    }

    pub fn introduction(&self) -> &'static str {
        match self {
            Self::Pedagogy => {
                "Your personal assistant for educational resources and insights. \
                 Upload your documents and start asking questions!"
            }
            Self::AlFayhaa => {
                "Al-Fayhaa Association: Empowering Communities Through Education and Advocacy. \
                 Upload documents and explore our initiatives."
            }
        }
    }
}

impl std::fmt::Display for Organization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

impl std::str::FromStr for Organization {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', ' '], "_").as_str() {
            "pedagogy" => Ok(Self::Pedagogy),
            "al_fayhaa" | "alfayhaa" => Ok(Self::AlFayhaa),
            _ => Err(format!(
                "Unknown organization: {s}. Choose: pedagogy, al-fayhaa"
            )),
        }
    }
}

// ── Documents ─────────────────────────────────────────────────────

/// Normalized text of one uploaded file (or of all files, when combined).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    /// Position in upload order.
    pub source_index: usize,
    /// Uploaded file name, or `"combined"` for a merged document.
    pub source_name: String,
    /// Extracted text; may be empty.
    pub text: String,
}

/// Ordered documents submitted together for one knowledge-base build.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentSet {
    documents: Vec<Document>,
}

impl DocumentSet {
    pub fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// Document texts in order. This is everything the fingerprint covers.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.documents.iter().map(|d| d.text.as_str())
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// True when there are no documents or every document has empty text.
    pub fn is_blank(&self) -> bool {
        self.documents.iter().all(|d| d.text.is_empty())
    }
}

/// Hex digest identifying the content of a [`DocumentSet`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    /// First 12 hex characters, for messages and logs.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(12);
        &self.0[..end]
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to a knowledge base built by the external engine.
///
/// Never mutated: a rebuild produces a new handle that replaces this one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KnowledgeHandle {
    pub id: Uuid,
    /// Opaque reference returned by the engine's ingest call.
    pub engine_ref: String,
    /// Fingerprint of the document set this handle was built from.
    pub fingerprint: Fingerprint,
    pub document_count: usize,
    pub built_at: DateTime<Utc>,
}

impl KnowledgeHandle {
    pub fn new(engine_ref: String, fingerprint: Fingerprint, document_count: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            engine_ref,
            fingerprint,
            document_count,
            built_at: Utc::now(),
        }
    }
}

// ── Transcript ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    SystemError,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::User => "You",
            Self::Assistant => "Assistant",
            Self::SystemError => "Error",
        };
        f.write_str(label)
    }
}

/// One entry of a conversation transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    pub sequence_number: u64,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Append-only, ordered record of a session's conversation.
///
/// Only the conversation manager appends to it; there is no way to edit or
/// remove a turn short of resetting the whole session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    /// Append a turn with the next sequence number and return a copy of it.
    pub fn append(&mut self, role: Role, content: impl Into<String>) -> Turn {
        let turn = Turn {
            sequence_number: self.next_sequence(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        };
        self.turns.push(turn.clone());
        turn
    }

    pub fn next_sequence(&self) -> u64 {
        self.turns.last().map_or(1, |t| t.sequence_number + 1)
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Checks the exchange structure: strictly increasing sequence numbers,
    /// and every User turn answered by exactly one Assistant or SystemError
    /// turn. A trailing unanswered User turn (exchange in flight) is allowed.
    pub fn is_well_formed(&self) -> bool {
        let increasing = self
            .turns
            .windows(2)
            .all(|w| w[0].sequence_number < w[1].sequence_number);

        let mut expecting_reply = false;
        for turn in &self.turns {
            match (turn.role, expecting_reply) {
                (Role::User, false) => expecting_reply = true,
                (Role::Assistant | Role::SystemError, true) => expecting_reply = false,
                _ => return false,
            }
        }

        increasing
    }
}

// ── Session ───────────────────────────────────────────────────────

/// Where a session is in its lifecycle. Derived from [`Session`] fields.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    LoggedOut,
    /// Logged in, nothing serving, no build in flight.
    Authenticated,
    /// A knowledge-base build is in flight. A previous handle, if any,
    /// keeps serving until the build succeeds.
    AwaitingIngestion,
    Ready,
}

/// Persisted per-session state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: SessionId,
    pub authenticated: bool,
    pub organization: Organization,
    pub document_fingerprint: Option<Fingerprint>,
    pub knowledge_handle: Option<KnowledgeHandle>,
    pub ready: bool,
    /// Fingerprint of the build currently in flight, if any.
    pub pending_fingerprint: Option<Fingerprint>,
    pub transcript: Transcript,
    /// Bumped by every reset. Work that started under an older generation
    /// must not write into this one.
    #[serde(default)]
    pub generation: u64,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// A fresh, unauthenticated session.
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            authenticated: false,
            organization: Organization::default(),
            document_fingerprint: None,
            knowledge_handle: None,
            ready: false,
            pending_fingerprint: None,
            transcript: Transcript::default(),
            generation: 0,
            updated_at: Utc::now(),
        }
    }

    /// The fresh session that replaces this one on reset.
    pub fn successor(&self) -> Self {
        Self {
            generation: self.generation + 1,
            ..Self::new(self.id.clone())
        }
    }

    pub fn phase(&self) -> Phase {
        if !self.authenticated {
            Phase::LoggedOut
        } else if self.pending_fingerprint.is_some() {
            Phase::AwaitingIngestion
        } else if self.ready {
            Phase::Ready
        } else {
            Phase::Authenticated
        }
    }

    /// The handle, if its fingerprint is the one this session serves.
    pub fn serving_handle(&self) -> Option<&KnowledgeHandle> {
        if !self.ready {
            return None;
        }
        self.knowledge_handle
            .as_ref()
            .filter(|h| Some(&h.fingerprint) == self.document_fingerprint.as_ref())
    }

    /// True when the current handle was built from `fingerprint`.
    pub fn has_handle_for(&self, fingerprint: &Fingerprint) -> bool {
        self.knowledge_handle
            .as_ref()
            .is_some_and(|h| &h.fingerprint == fingerprint)
    }

    /// Swap in a freshly built handle and mark the session ready.
    pub fn install_handle(&mut self, handle: KnowledgeHandle) {
        self.document_fingerprint = Some(handle.fingerprint.clone());
        self.knowledge_handle = Some(handle);
        self.ready = true;
    }

    /// `ready` implies a handle whose fingerprint matches the document fingerprint.
    pub fn is_consistent(&self) -> bool {
        !self.ready || self.serving_handle().is_some()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
