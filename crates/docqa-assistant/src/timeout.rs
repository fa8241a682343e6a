//! Caller-side time limits for the blocking orchestrator calls.
//!
//! Builds and queries run on tokio's blocking pool under
//! `tokio::time::timeout`. Expiry is reported as a timeout error, but the
//! underlying call is not cancelled: it keeps running and, if it succeeds,
//! still persists its result to the session.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinError, JoinHandle};

use docqa_core::config::MergeMode;
use docqa_core::error::Result;
use docqa_core::events::{IngestResult, UploadedFile};
use docqa_core::{BuildError, DocQaError, QueryError, SessionId, Turn};
use docqa_ingest::TextExtractor;

use crate::engine::KnowledgeEngine;
use crate::Orchestrator;

impl<E, X> Orchestrator<E, X>
where
    E: KnowledgeEngine + 'static,
    X: TextExtractor + 'static,
{
    /// [`Orchestrator::ingest_documents`] with an optional limit on the build.
    ///
    /// Extraction is not covered by the limit.
    pub async fn ingest_documents_within(
        self: &Arc<Self>,
        session_id: &SessionId,
        files: Vec<UploadedFile>,
        merge_mode: MergeMode,
        limit: Option<Duration>,
    ) -> Result<IngestResult> {
        let this = Arc::clone(self);
        let id = session_id.clone();
        let prepared = tokio::task::spawn_blocking(move || this.prepare(&id, &files, merge_mode))
            .await
            .map_err(join_error)??;

        let Some(prepared) = prepared else {
            return self.unchanged(session_id);
        };

        let fingerprint = prepared.fingerprint.clone();
        let this = Arc::clone(self);
        let id = session_id.clone();
        let task = tokio::task::spawn_blocking(move || this.build(&id, prepared));

        match run_limited(task, limit).await? {
            Some(result) => result,
            None => {
                tracing::warn!(
                    session_id = %session_id,
                    fingerprint = %fingerprint.short(),
                    "Knowledge base build exceeded time limit"
                );
                Err(BuildError::Timeout {
                    fingerprint,
                    secs: limit.map_or(0, |l| l.as_secs()),
                }
                .into())
            }
        }
    }

    /// [`Orchestrator::ask`] with an optional limit on the engine call.
    pub async fn ask_within(
        self: &Arc<Self>,
        session_id: &SessionId,
        query: String,
        limit: Option<Duration>,
    ) -> Result<Turn> {
        let this = Arc::clone(self);
        let id = session_id.clone();
        let asked = query.clone();
        let task = tokio::task::spawn_blocking(move || this.ask(&id, &asked));

        match run_limited(task, limit).await? {
            Some(result) => result,
            None => {
                tracing::warn!(session_id = %session_id, "Query exceeded time limit");
                Err(QueryError::Timeout {
                    query,
                    secs: limit.map_or(0, |l| l.as_secs()),
                }
                .into())
            }
        }
    }
}

/// Await `task`, giving up after `limit`. `None` means the limit expired.
async fn run_limited<T>(task: JoinHandle<T>, limit: Option<Duration>) -> Result<Option<T>> {
    let joined = match limit {
        Some(limit) => match tokio::time::timeout(limit, task).await {
            Ok(joined) => joined,
            Err(_) => return Ok(None),
        },
        None => task.await,
    };
    joined.map(Some).map_err(join_error)
}

fn join_error(e: JoinError) -> DocQaError {
    DocQaError::Internal(format!("blocking task failed: {e}"))
}
