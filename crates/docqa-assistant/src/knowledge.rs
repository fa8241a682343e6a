//! Knowledge-base builds, at most one per document fingerprint.
//!
//! A build is skipped when the session's current handle was built from the
//! same fingerprint. Otherwise the engine is called under the session's
//! build gate, and the new handle replaces the old one only after the
//! engine returns successfully. Until then the old handle keeps serving.
//!
//! Overlapping build requests for one session queue on the gate. The second
//! request rehydrates the session once it gets the gate, so a duplicate
//! submission of the same documents sees the first build's handle and
//! returns it as a cache hit.
//!
//! Every write is conditioned on the session generation the documents were
//! gathered under, so a reset at any point before the install leaves the
//! session logged out and empty.

use std::time::Instant;

use docqa_core::{BuildError, DocumentSet, Fingerprint, KnowledgeHandle, Session, SessionId};
use docqa_session::{fingerprint, SessionGates, SessionStore};

use crate::engine::KnowledgeEngine;

/// Outcome of [`KnowledgeBaseBuilder::build_or_reuse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    pub handle: KnowledgeHandle,
    /// False when an existing handle was reused.
    pub rebuilt: bool,
}

pub struct KnowledgeBaseBuilder<E> {
    engine: E,
    gates: SessionGates,
}

impl<E: KnowledgeEngine> KnowledgeBaseBuilder<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            gates: SessionGates::new(),
        }
    }

    /// Return the session's handle for `documents`, building it if needed.
    ///
    /// Binds to the session's current generation; see [`Self::build_for`].
    pub fn build_or_reuse(
        &self,
        store: &dyn SessionStore,
        session_id: &SessionId,
        documents: &DocumentSet,
    ) -> Result<BuildOutcome, BuildError> {
        let generation = store.get(session_id)?.generation;
        self.build_for(store, session_id, generation, documents)
    }

    /// Like [`Self::build_or_reuse`], for documents gathered while the
    /// session was at `generation`.
    ///
    /// If the session has been reset since, nothing is written and
    /// [`BuildError::SessionReset`] is returned.
    pub fn build_for(
        &self,
        store: &dyn SessionStore,
        session_id: &SessionId,
        generation: u64,
        documents: &DocumentSet,
    ) -> Result<BuildOutcome, BuildError> {
        let fingerprint = fingerprint(documents);

        let session = store.get(session_id)?;
        if session.generation != generation {
            return Err(reset_before_build(session_id, fingerprint));
        }
        // A pending mark means a build may be running; wait for it below.
        if session.pending_fingerprint.is_none() {
            if let Some(handle) = cached_handle(&session, &fingerprint) {
                tracing::debug!(session_id = %session_id, fingerprint = %fingerprint.short(), "Knowledge base cache hit");
                return Ok(BuildOutcome {
                    handle,
                    rebuilt: false,
                });
            }
        }

        self.gates.with_gate(session_id, || {
            let session = store.get(session_id)?;
            if session.generation != generation {
                return Err(reset_before_build(session_id, fingerprint.clone()));
            }

            // Another build may have finished while we waited for the gate.
            if let Some(handle) = cached_handle(&session, &fingerprint) {
                if session.pending_fingerprint.is_some() {
                    self.clear_stale_mark(store, session_id, generation)?;
                }
                tracing::debug!(
                    session_id = %session_id,
                    fingerprint = %fingerprint.short(),
                    "Knowledge base built by concurrent request"
                );
                return Ok(BuildOutcome {
                    handle,
                    rebuilt: false,
                });
            }

            self.build(store, session_id, generation, documents, fingerprint.clone())
        })
    }

    /// Holding the gate, no build of ours is in flight: a pending mark is
    /// left over from a process that died mid-build.
    fn clear_stale_mark(
        &self,
        store: &dyn SessionStore,
        session_id: &SessionId,
        generation: u64,
    ) -> Result<(), BuildError> {
        store.modify(session_id, &mut |s: &mut Session| {
            if s.generation == generation {
                s.pending_fingerprint = None;
            }
        })?;
        tracing::info!(session_id = %session_id, "Cleared stale pending build");
        Ok(())
    }

    /// Run the engine build. Caller holds the session's build gate.
    fn build(
        &self,
        store: &dyn SessionStore,
        session_id: &SessionId,
        generation: u64,
        documents: &DocumentSet,
        fingerprint: Fingerprint,
    ) -> Result<BuildOutcome, BuildError> {
        let mut marked = false;
        store.modify(session_id, &mut |s: &mut Session| {
            if s.generation == generation {
                s.pending_fingerprint = Some(fingerprint.clone());
                marked = true;
            }
        })?;
        if !marked {
            return Err(reset_before_build(session_id, fingerprint));
        }

        tracing::info!(
            session_id = %session_id,
            fingerprint = %fingerprint.short(),
            documents = documents.len(),
            blank = documents.is_blank(),
            "Building knowledge base"
        );
        let start = Instant::now();

        let engine_ref = match self.engine.ingest(documents) {
            Ok(engine_ref) => engine_ref,
            Err(source) => {
                tracing::warn!(
                    session_id = %session_id,
                    fingerprint = %fingerprint.short(),
                    error = ?source,
                    "Knowledge base build failed"
                );
                store.modify(session_id, &mut |s: &mut Session| {
                    if s.generation == generation
                        && s.pending_fingerprint.as_ref() == Some(&fingerprint)
                    {
                        s.pending_fingerprint = None;
                    }
                })?;
                return Err(BuildError::Engine {
                    fingerprint,
                    source,
                });
            }
        };

        let handle = KnowledgeHandle::new(engine_ref, fingerprint.clone(), documents.len());

        // A reset while the engine was running starts a new generation;
        // the finished build must not resurrect the session.
        let mut installed = false;
        store.modify(session_id, &mut |s: &mut Session| {
            if s.generation == generation && s.pending_fingerprint.as_ref() == Some(&fingerprint) {
                s.install_handle(handle.clone());
                s.pending_fingerprint = None;
                installed = true;
            }
        })?;

        if !installed {
            tracing::warn!(
                session_id = %session_id,
                fingerprint = %fingerprint.short(),
                "Session reset during build, discarding knowledge base"
            );
            return Err(BuildError::SessionReset { fingerprint });
        }

        tracing::info!(
            session_id = %session_id,
            fingerprint = %fingerprint.short(),
            handle_id = %handle.id,
            duration_ms = start.elapsed().as_millis(),
            "Knowledge base ready"
        );

        Ok(BuildOutcome {
            handle,
            rebuilt: true,
        })
    }
}

fn reset_before_build(session_id: &SessionId, fingerprint: Fingerprint) -> BuildError {
    tracing::warn!(
        session_id = %session_id,
        fingerprint = %fingerprint.short(),
        "Session reset before build started"
    );
    BuildError::SessionReset { fingerprint }
}

fn cached_handle(session: &Session, fingerprint: &Fingerprint) -> Option<KnowledgeHandle> {
    session
        .knowledge_handle
        .as_ref()
        .filter(|h| session.ready && &h.fingerprint == fingerprint)
        .cloned()
}
