//! Resets and restarts that land in the middle of an event.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use docqa_assistant::conversation::INTERRUPTED_REPLY;
use docqa_assistant::{EngineReply, KnowledgeEngine, Orchestrator, StaticCredentials};
use docqa_core::config::{IngestConfig, MergeMode};
use docqa_core::events::UploadedFile;
use docqa_core::{
    BuildError, DocQaError, DocumentSet, KnowledgeHandle, Phase, Role, Session, SessionId,
};
use docqa_ingest::{ExtractionError, PlainTextExtractor, TextExtractor};
use docqa_session::{FileSessionStore, InMemorySessionStore, SessionStore};

#[derive(Default)]
struct CountingEngine {
    ingests: AtomicUsize,
}

impl KnowledgeEngine for CountingEngine {
    fn ingest(&self, _documents: &DocumentSet) -> anyhow::Result<String> {
        let n = self.ingests.fetch_add(1, Ordering::SeqCst);
        Ok(format!("kb-{n}"))
    }

    fn query(&self, _handle: &KnowledgeHandle, _prompt: &str) -> anyhow::Result<EngineReply> {
        Ok(EngineReply::from("an answer"))
    }
}

/// Plain text extraction that takes a while, like a large PDF would.
struct SlowExtractor(Duration);

impl TextExtractor for SlowExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<Vec<String>, ExtractionError> {
        std::thread::sleep(self.0);
        PlainTextExtractor.extract(bytes)
    }
}

fn sid(raw: &str) -> SessionId {
    SessionId::parse(raw).unwrap()
}

fn upload() -> Vec<UploadedFile> {
    vec![UploadedFile::new("a.txt", b"Hello world".to_vec())]
}

fn slow_app() -> (
    Orchestrator<Arc<CountingEngine>, SlowExtractor>,
    Arc<CountingEngine>,
) {
    let engine = Arc::new(CountingEngine::default());
    let app = Orchestrator::new(
        Arc::new(InMemorySessionStore::new()),
        StaticCredentials::new("admin", "secret"),
        engine.clone(),
        SlowExtractor(Duration::from_millis(150)),
        &IngestConfig::default(),
    );
    (app, engine)
}

#[test]
fn reset_during_extraction_leaves_session_logged_out() {
    let (app, engine) = slow_app();
    let id = sid("extracting");
    app.login(&id, "admin", "secret").unwrap();

    let result = std::thread::scope(|scope| {
        let ingest = scope.spawn(|| app.ingest_documents(&id, &upload(), MergeMode::PerFile));
        std::thread::sleep(Duration::from_millis(50));
        app.reset(&id).unwrap();
        ingest.join().unwrap()
    });

    assert!(matches!(
        result,
        Err(DocQaError::Build(BuildError::SessionReset { .. }))
    ));
    assert_eq!(engine.ingests.load(Ordering::SeqCst), 0);

    let status = app.status(&id).unwrap();
    assert_eq!(status.phase, Phase::LoggedOut);
    assert_eq!(status.fingerprint, None);
}

#[test]
fn logout_and_login_during_extraction_does_not_adopt_the_upload() {
    let (app, engine) = slow_app();
    let id = sid("relogin");
    app.login(&id, "admin", "secret").unwrap();

    let result = std::thread::scope(|scope| {
        let ingest = scope.spawn(|| app.ingest_documents(&id, &upload(), MergeMode::PerFile));
        std::thread::sleep(Duration::from_millis(50));
        app.logout(&id).unwrap();
        app.login(&id, "admin", "secret").unwrap();
        ingest.join().unwrap()
    });

    assert!(result.is_err());
    assert_eq!(engine.ingests.load(Ordering::SeqCst), 0);
    assert_eq!(app.status(&id).unwrap().phase, Phase::Authenticated);
}

#[test]
fn unanswered_question_from_a_dead_process_is_closed() {
    let dir = tempfile::tempdir().unwrap();
    let id = sid("interrupted");
    let app_on = |store: Arc<FileSessionStore>| {
        Orchestrator::new(
            store,
            StaticCredentials::new("admin", "secret"),
            CountingEngine::default(),
            PlainTextExtractor,
            &IngestConfig::default(),
        )
    };

    {
        let store = Arc::new(FileSessionStore::new(dir.path()).unwrap());
        let app = app_on(store.clone());
        app.login(&id, "admin", "secret").unwrap();
        app.ingest_documents(&id, &upload(), MergeMode::PerFile)
            .unwrap();
        // The process died after recording the question.
        store
            .modify(&id, &mut |s: &mut Session| {
                s.transcript.append(Role::User, "lost question");
            })
            .unwrap();
    }

    let app = app_on(Arc::new(FileSessionStore::new(dir.path()).unwrap()));
    let answer = app.ask(&id, "next question").unwrap();
    assert_eq!(answer.content, "an answer");

    let turns = app.get_transcript(&id).unwrap();
    let roles: Vec<Role> = turns.iter().map(|t| t.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::SystemError, Role::User, Role::Assistant]
    );
    assert_eq!(turns[1].content, INTERRUPTED_REPLY);
}
