use thiserror::Error;

use crate::types::{Fingerprint, SessionId, Turn};

/// Errors from session persistence.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid session id: {0:?}")]
    InvalidSessionId(String),

    #[error("Integrity check failed for session {0}: stored checksum does not match content")]
    IntegrityViolation(SessionId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Session {0} is not logged in")]
    NotAuthenticated(SessionId),
}

/// Failure to turn an uploaded file into text.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Could not extract text from {filename}: {reason}")]
    Extraction { filename: String, reason: String },
}

impl IngestError {
    pub fn filename(&self) -> &str {
        match self {
            Self::Extraction { filename, .. } => filename,
        }
    }
}

/// Failure to build a knowledge base. The session keeps its previous handle.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Knowledge base build failed for document set {}", .fingerprint.short())]
    Engine {
        fingerprint: Fingerprint,
        #[source]
        source: anyhow::Error,
    },

    #[error("Knowledge base build for document set {} timed out after {secs}s", .fingerprint.short())]
    Timeout { fingerprint: Fingerprint, secs: u64 },

    /// The session was reset or logged out while the engine was building.
    #[error("Session was reset while document set {} was being built", .fingerprint.short())]
    SessionReset { fingerprint: Fingerprint },

    #[error("Session store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("No knowledge base is ready yet: upload documents first")]
    NotReady,

    #[error("Query is empty")]
    EmptyQuery,

    /// The engine failed; `turn` is the SystemError turn recorded for it.
    #[error("The assistant could not answer {query:?}")]
    EngineFailure { query: String, turn: Turn },

    #[error("The assistant did not answer {query:?} within {secs}s")]
    Timeout { query: String, secs: u64 },

    /// The session was reset while the engine was answering; the answer was dropped.
    #[error("Session was reset before {query:?} was answered")]
    SessionReset { query: String },

    #[error("Session store error: {0}")]
    Store(#[from] StoreError),
}

/// Top-level error type for orchestrator operations.
#[derive(Error, Debug)]
pub enum DocQaError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, DocQaError>;
