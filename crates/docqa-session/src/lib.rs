//! docqa-session: Session persistence for the document Q&A orchestrator.
//!
//! Sessions are the only state that survives between user events. This crate
//! provides the store backends, the BLAKE3 document fingerprint used to detect
//! whether a knowledge base must be rebuilt, and the per-session gates that
//! serialize overlapping events on one session.

pub mod gate;
pub mod hash;
pub mod store;

pub use gate::SessionGates;
pub use hash::fingerprint;
pub use store::{FileSessionStore, InMemorySessionStore, SessionStore};
