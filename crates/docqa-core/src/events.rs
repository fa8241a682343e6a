//! Events triggered by the user and the responses returned for them.
//!
//! Every user action arrives as one [`Event`]. The orchestrator rehydrates
//! the session, applies the event, persists the result, and answers with a
//! [`Response`]. Nothing survives between events except the persisted session.

use serde::{Deserialize, Serialize};

use crate::config::{MergeMode, Secret};
use crate::types::{Fingerprint, Organization, Phase, Turn};

/// One uploaded file as received from the UI layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

/// An externally triggered action on one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum Event {
    Login { username: String, password: Secret },
    Logout,
    SelectOrganization { organization: Organization },
    Upload { files: Vec<UploadedFile>, merge_mode: MergeMode },
    Ask { query: String },
    GetTranscript,
    Status,
    Reset,
}

/// Outcome of an ingestion request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestResult {
    /// Whether the session can answer questions after this ingestion.
    pub ready: bool,
    /// Whether the engine was invoked (false on a cache hit or a no-op).
    pub rebuilt: bool,
    /// Fingerprint of the ingested document set; absent for an empty upload.
    pub fingerprint: Option<Fingerprint>,
    pub documents: usize,
    /// Files left out under the skip-failed policy.
    pub skipped: Vec<String>,
}

/// Summary of a session for status displays.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionStatus {
    pub phase: Phase,
    pub organization: Organization,
    pub fingerprint: Option<Fingerprint>,
    pub turns: usize,
}

/// What the orchestrator returns for an [`Event`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "response_type")]
pub enum Response {
    LoggedIn,
    LoggedOut,
    OrganizationSelected { organization: Organization },
    Ingested(IngestResult),
    Answered { turn: Turn },
    Transcript { turns: Vec<Turn> },
    Status(SessionStatus),
    Reset,
    /// The event failed. `message` is safe to show to the user.
    Failed { message: String },
}
