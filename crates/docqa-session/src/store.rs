//! Session storage: trait + in-memory and file-backed implementations.
//!
//! The store is the only state that survives between events. Each event
//! reads the session through [`SessionStore::get`], and every write goes
//! through [`SessionStore::modify`] so concurrent events on one session
//! never overwrite each other's changes.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use docqa_core::{Session, SessionId, StoreError};

use crate::hash::session_checksum;

/// Trait for session persistence backends.
pub trait SessionStore: Send + Sync {
    /// Load a session, or a fresh unauthenticated one if none is stored.
    fn get(&self, id: &SessionId) -> Result<Session, StoreError>;

    /// Replace the stored session atomically.
    fn put(&self, id: &SessionId, session: Session) -> Result<(), StoreError>;

    /// Forget everything stored for the session. The fresh session that
    /// replaces it carries the next [`Session::generation`].
    fn reset(&self, id: &SessionId) -> Result<(), StoreError>;

    /// Atomic read-modify-write. Returns the session as stored afterwards.
    fn modify(
        &self,
        id: &SessionId,
        f: &mut dyn FnMut(&mut Session),
    ) -> Result<Session, StoreError>;
}

// ── In-memory ─────────────────────────────────────────────────────

/// Process-local store. Sessions live as long as the store does.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, id: &SessionId) -> Result<Session, StoreError> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        Ok(sessions
            .get(id)
            .cloned()
            .unwrap_or_else(|| Session::new(id.clone())))
    }

    fn put(&self, id: &SessionId, mut session: Session) -> Result<(), StoreError> {
        session.id = id.clone();
        session.touch();
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.insert(id.clone(), session);
        Ok(())
    }

    fn reset(&self, id: &SessionId) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(session) = sessions.get_mut(id) {
            *session = session.successor();
        }
        Ok(())
    }

    fn modify(
        &self,
        id: &SessionId,
        f: &mut dyn FnMut(&mut Session),
    ) -> Result<Session, StoreError> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let session = sessions
            .entry(id.clone())
            .or_insert_with(|| Session::new(id.clone()));
        f(session);
        session.touch();
        Ok(session.clone())
    }
}

// ── File-backed ───────────────────────────────────────────────────

/// On-disk envelope: the session plus a checksum of its content.
#[derive(Serialize, Deserialize)]
struct StoredSession {
    checksum: String,
    session: Session,
}

/// File-system backed session store.
///
/// Stores one JSON file per session:
/// ```text
/// {root}/
///   {session_id}.json
/// ```
///
/// Writes go to a temporary file that is renamed over the old one, so a
/// reader never sees a half-written session. Each file carries a BLAKE3
/// checksum; a file edited outside the store is rejected on load.
/// Read-modify-write is serialized within one process only.
#[derive(Debug)]
pub struct FileSessionStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileSessionStore {
    /// Create a new store rooted at the given directory.
    /// Creates the directory if it doesn't exist.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_path(&self, id: &SessionId) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }

    fn load(&self, id: &SessionId) -> Result<Session, StoreError> {
        let path = self.session_path(id);
        if !path.exists() {
            return Ok(Session::new(id.clone()));
        }

        let json = fs::read_to_string(&path)?;
        let stored: StoredSession = serde_json::from_str(&json)?;

        if stored.session.id != *id || session_checksum(&stored.session)? != stored.checksum {
            return Err(StoreError::IntegrityViolation(id.clone()));
        }

        Ok(stored.session)
    }

    fn save(&self, id: &SessionId, session: &Session) -> Result<(), StoreError> {
        let stored = StoredSession {
            checksum: session_checksum(session)?,
            session: session.clone(),
        };
        let json = serde_json::to_string_pretty(&stored)?;

        let path = self.session_path(id);
        let tmp = self.root.join(format!("{id}.json.tmp"));
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;

        tracing::debug!(
            session_id = %id,
            path = %path.display(),
            turns = session.transcript.len(),
            "Session saved"
        );

        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, id: &SessionId) -> Result<Session, StoreError> {
        self.load(id)
    }

    fn put(&self, id: &SessionId, mut session: Session) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        session.id = id.clone();
        session.touch();
        self.save(id, &session)
    }

    fn reset(&self, id: &SessionId) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.session_path(id).exists() {
            return Ok(());
        }
        // A damaged file is still reset; its generation restarts at zero.
        let previous = self.load(id).unwrap_or_else(|e| {
            tracing::warn!(session_id = %id, error = %e, "Resetting unreadable session file");
            Session::new(id.clone())
        });
        let fresh = previous.successor();
        self.save(id, &fresh)?;
        tracing::debug!(session_id = %id, generation = fresh.generation, "Session reset");
        Ok(())
    }

    fn modify(
        &self,
        id: &SessionId,
        f: &mut dyn FnMut(&mut Session),
    ) -> Result<Session, StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut session = self.load(id)?;
        f(&mut session);
        session.touch();
        self.save(id, &session)?;
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_core::{Fingerprint, KnowledgeHandle, Role};

    fn id(raw: &str) -> SessionId {
        SessionId::parse(raw).unwrap()
    }

    fn populated(id: &SessionId) -> Session {
        let mut session = Session::new(id.clone());
        session.authenticated = true;
        session.install_handle(KnowledgeHandle::new(
            "engine-ref".to_string(),
            Fingerprint("abc123".to_string()),
            2,
        ));
        session.transcript.append(Role::User, "what is this?");
        session.transcript.append(Role::Assistant, "A greeting.");
        session
    }

    fn exercise_basic_contract(store: &dyn SessionStore) {
        let alice = id("alice");
        let bob = id("bob");

        let fresh = store.get(&alice).unwrap();
        assert!(!fresh.authenticated);
        assert!(fresh.transcript.is_empty());

        store.put(&alice, populated(&alice)).unwrap();
        let loaded = store.get(&alice).unwrap();
        assert!(loaded.ready);
        assert_eq!(loaded.transcript.len(), 2);

        // Other sessions are unaffected.
        assert!(!store.get(&bob).unwrap().authenticated);

        store.reset(&alice).unwrap();
        let cleared = store.get(&alice).unwrap();
        assert!(!cleared.ready);
        assert!(cleared.knowledge_handle.is_none());
        assert!(cleared.transcript.is_empty());
    }

    #[test]
    fn in_memory_contract() {
        exercise_basic_contract(&InMemorySessionStore::new());
    }

    #[test]
    fn file_contract() {
        let dir = tempfile::tempdir().unwrap();
        exercise_basic_contract(&FileSessionStore::new(dir.path()).unwrap());
    }

    #[test]
    fn modify_is_read_your_writes() {
        let store = InMemorySessionStore::new();
        let alice = id("alice");

        let after = store
            .modify(&alice, &mut |s: &mut Session| {
                s.authenticated = true;
            })
            .unwrap();
        assert!(after.authenticated);
        assert!(store.get(&alice).unwrap().authenticated);
    }

    #[test]
    fn concurrent_modifies_do_not_lose_writes() {
        let store = InMemorySessionStore::new();
        let alice = id("alice");

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..10 {
                        store
                            .modify(&alice, &mut |s: &mut Session| {
                                s.transcript.append(Role::User, "q");
                            })
                            .unwrap();
                    }
                });
            }
        });

        assert_eq!(store.get(&alice).unwrap().transcript.len(), 80);
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let alice = id("alice");

        {
            let store = FileSessionStore::new(dir.path()).unwrap();
            store.put(&alice, populated(&alice)).unwrap();
        }

        let reopened = FileSessionStore::new(dir.path()).unwrap();
        let session = reopened.get(&alice).unwrap();
        assert!(session.ready);
        assert!(session.is_consistent());
        assert_eq!(session.transcript.turns()[1].content, "A greeting.");
    }

    #[test]
    fn file_store_detects_tampering() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path()).unwrap();
        let alice = id("alice");
        store.put(&alice, populated(&alice)).unwrap();

        // Flip the auth flag behind the store's back.
        let path = store.session_path(&alice);
        let mut stored: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        stored["session"]["authenticated"] = serde_json::Value::Bool(false);
        fs::write(&path, serde_json::to_string_pretty(&stored).unwrap()).unwrap();

        let result = store.get(&alice);
        assert!(matches!(result, Err(StoreError::IntegrityViolation(_))));
    }

    #[test]
    fn file_store_rejects_file_for_another_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path()).unwrap();
        let alice = id("alice");
        let bob = id("bob");
        store.put(&alice, populated(&alice)).unwrap();

        fs::copy(store.session_path(&alice), store.session_path(&bob)).unwrap();

        assert!(matches!(
            store.get(&bob),
            Err(StoreError::IntegrityViolation(_))
        ));
    }

    fn exercise_reset_generation(store: &dyn SessionStore) {
        let alice = id("alice");

        // Nothing stored yet: reset is a no-op.
        store.reset(&alice).unwrap();
        assert_eq!(store.get(&alice).unwrap().generation, 0);

        store.put(&alice, populated(&alice)).unwrap();
        store.reset(&alice).unwrap();
        let once = store.get(&alice).unwrap();
        assert_eq!(once.generation, 1);
        assert!(!once.authenticated);

        store.reset(&alice).unwrap();
        assert_eq!(store.get(&alice).unwrap().generation, 2);
    }

    #[test]
    fn in_memory_reset_bumps_generation() {
        exercise_reset_generation(&InMemorySessionStore::new());
    }

    #[test]
    fn file_reset_bumps_generation() {
        let dir = tempfile::tempdir().unwrap();
        exercise_reset_generation(&FileSessionStore::new(dir.path()).unwrap());
    }

    #[test]
    fn file_store_resets_a_tampered_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path()).unwrap();
        let alice = id("alice");
        store.put(&alice, populated(&alice)).unwrap();
        fs::write(store.session_path(&alice), "{ not json").unwrap();

        store.reset(&alice).unwrap();
        let session = store.get(&alice).unwrap();
        assert!(!session.authenticated);
        assert!(session.transcript.is_empty());
    }

    #[test]
    fn put_stamps_the_target_id() {
        let store = InMemorySessionStore::new();
        let alice = id("alice");
        let bob = id("bob");

        store.put(&bob, populated(&alice)).unwrap();
        assert_eq!(store.get(&bob).unwrap().id, bob);
    }
}
