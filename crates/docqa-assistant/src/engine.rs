//! Knowledge engine seam.
//!
//! The retrieval engine that actually indexes documents and answers
//! questions lives behind [`KnowledgeEngine`]. Both calls are blocking and
//! may be slow.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use docqa_core::{DocumentSet, KnowledgeHandle};

pub trait KnowledgeEngine: Send + Sync {
    /// Build a knowledge base from `documents`, returning an opaque reference to it.
    fn ingest(&self, documents: &DocumentSet) -> anyhow::Result<String>;

    /// Answer `prompt` against the knowledge base behind `handle`.
    fn query(&self, handle: &KnowledgeHandle, prompt: &str) -> anyhow::Result<EngineReply>;
}

impl<E: KnowledgeEngine + ?Sized> KnowledgeEngine for Arc<E> {
    fn ingest(&self, documents: &DocumentSet) -> anyhow::Result<String> {
        (**self).ingest(documents)
    }

    fn query(&self, handle: &KnowledgeHandle, prompt: &str) -> anyhow::Result<EngineReply> {
        (**self).query(handle, prompt)
    }
}

/// What an engine may answer with: a bare string or a message object
/// carrying `content`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum EngineReply {
    Text(String),
    Message { content: String },
}

/// An engine reply reduced to its text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
}

impl EngineReply {
    /// Normalize to plain text. A blank reply is not an answer.
    pub fn into_answer(self) -> Option<Answer> {
        let text = match self {
            Self::Text(text) => text,
            Self::Message { content } => content,
        };
        if text.trim().is_empty() {
            return None;
        }
        Some(Answer { text })
    }
}

impl From<String> for EngineReply {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for EngineReply {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}
