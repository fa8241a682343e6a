//! Per-session mutual exclusion.
//!
//! Overlapping events on the same session (a double-clicked "Proceed", two
//! rapid questions) are serialized through a gate keyed by session id.
//! Different sessions never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use docqa_core::SessionId;

/// Gates held only by the map itself are dropped once the map grows past this.
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug, Default)]
pub struct SessionGates {
    gates: Mutex<HashMap<SessionId, Arc<Mutex<()>>>>,
}

impl SessionGates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the gate for `session_id`.
    ///
    /// Blocks until any other holder of the same gate is done.
    pub fn with_gate<R>(&self, session_id: &SessionId, f: impl FnOnce() -> R) -> R {
        let gate = self.gate(session_id);
        let _held = gate.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }

    fn gate(&self, session_id: &SessionId) -> Arc<Mutex<()>> {
        let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
        if gates.len() > PRUNE_THRESHOLD {
            // Nobody holds or waits on a gate whose only reference is the map.
            gates.retain(|_, g| Arc::strong_count(g) > 1);
        }
        gates.entry(session_id.clone()).or_default().clone()
    }
}
