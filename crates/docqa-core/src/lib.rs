//! docqa-core: Shared types, configuration, and error handling for the document Q&A orchestrator.
//!
//! This crate provides the foundational types used across all docqa components:
//! - Session, document, knowledge handle, and transcript types
//! - Events and responses exchanged with the UI/CLI layer
//! - Configuration sections and their defaults
//! - The error taxonomy (auth, ingest, build, query, store)

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use error::{AuthError, BuildError, DocQaError, IngestError, QueryError, StoreError};
pub use types::{
    Document, DocumentSet, Fingerprint, KnowledgeHandle, Organization, Phase, Role, Session,
    SessionId, Transcript, Turn,
};
