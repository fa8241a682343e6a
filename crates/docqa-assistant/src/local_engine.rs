//! File-backed demo engine for the CLI.
//!
//! Splits documents into paragraphs, stores them as one JSON index per
//! build, and answers by returning the paragraphs that share the most
//! terms with the question. It keeps the CLI usable end to end without an
//! external retrieval service; it is not a retrieval engine.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use docqa_core::{DocumentSet, KnowledgeHandle};

use crate::engine::{EngineReply, KnowledgeEngine};

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "was", "what", "which", "who", "how", "does", "this", "that",
    "with", "from", "about", "into", "have", "has", "you", "your", "can", "why", "when", "where",
];

#[derive(Debug, Serialize, Deserialize)]
struct Passage {
    source: String,
    text: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredIndex {
    passages: Vec<Passage>,
}

pub struct LocalIndexEngine {
    index_dir: PathBuf,
    max_passages: usize,
}

impl LocalIndexEngine {
    pub fn new(index_dir: impl Into<PathBuf>, max_passages: usize) -> anyhow::Result<Self> {
        let index_dir = index_dir.into();
        fs::create_dir_all(&index_dir)
            .with_context(|| format!("creating index directory {}", index_dir.display()))?;
        Ok(Self {
            index_dir,
            max_passages: max_passages.max(1),
        })
    }

    fn index_path(&self, engine_ref: &str) -> anyhow::Result<PathBuf> {
        let id = Uuid::parse_str(engine_ref).context("malformed knowledge base reference")?;
        Ok(self.index_dir.join(format!("{id}.json")))
    }
}

impl KnowledgeEngine for LocalIndexEngine {
    fn ingest(&self, documents: &DocumentSet) -> anyhow::Result<String> {
        let passages: Vec<Passage> = documents
            .documents()
            .iter()
            .flat_map(|doc| {
                paragraphs(&doc.text).map(move |text| Passage {
                    source: doc.source_name.clone(),
                    text: text.to_string(),
                })
            })
            .collect();

        if passages.is_empty() {
            bail!("document set contains no text");
        }

        let engine_ref = Uuid::new_v4().to_string();
        let path = self.index_path(&engine_ref)?;
        let json = serde_json::to_vec(&StoredIndex { passages })?;
        fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;

        Ok(engine_ref)
    }

    /// The question is taken from the last line of the prompt.
    fn query(&self, handle: &KnowledgeHandle, prompt: &str) -> anyhow::Result<EngineReply> {
        let path = self.index_path(&handle.engine_ref)?;
        let json = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
        let index: StoredIndex = serde_json::from_slice(&json)?;

        let question = prompt.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
        let wanted = terms(question);
        if wanted.is_empty() {
            bail!("question has no searchable terms");
        }

        let mut scored: Vec<(usize, usize)> = index
            .passages
            .iter()
            .enumerate()
            .map(|(i, p)| (terms(&p.text).intersection(&wanted).count(), i))
            .filter(|(score, _)| *score > 0)
            .collect();
        // Highest score first; earlier passages win ties.
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        if scored.is_empty() {
            bail!("no passage matches the question");
        }

        let content = scored
            .iter()
            .take(self.max_passages)
            .map(|&(_, i)| {
                let p = &index.passages[i];
                format!("[{}] {}", p.source, p.text)
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        Ok(EngineReply::Message { content })
    }
}

fn paragraphs(text: &str) -> impl Iterator<Item = &str> {
    text.split("\n\n").map(str::trim).filter(|p| !p.is_empty())
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 3)
        .map(str::to_lowercase)
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_core::{Document, Fingerprint};

    fn docs(texts: &[(&str, &str)]) -> DocumentSet {
        DocumentSet::new(
            texts
                .iter()
                .enumerate()
                .map(|(i, (name, text))| Document {
                    source_index: i,
                    source_name: name.to_string(),
                    text: text.to_string(),
                })
                .collect(),
        )
    }

    fn handle(engine_ref: String) -> KnowledgeHandle {
        KnowledgeHandle::new(engine_ref, Fingerprint("ff".to_string()), 1)
    }

    #[test]
    fn answers_from_best_matching_passage() {
        let dir = tempfile::tempdir().unwrap();
        let engine = LocalIndexEngine::new(dir.path(), 1).unwrap();
        let engine_ref = engine
            .ingest(&docs(&[(
                "report.txt",
                "The school opened in 1999.\n\nTeachers received curriculum training.",
            )]))
            .unwrap();

        let reply = engine
            .query(&handle(engine_ref), "preamble line\nWhen was the school opened?")
            .unwrap();
        assert_eq!(
            reply,
            EngineReply::Message {
                content: "[report.txt] The school opened in 1999.".to_string()
            }
        );
    }

    #[test]
    fn blank_documents_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let engine = LocalIndexEngine::new(dir.path(), 3).unwrap();
        assert!(engine.ingest(&docs(&[("a.txt", "  \n\n ")])).is_err());
        assert!(engine.ingest(&DocumentSet::default()).is_err());
    }

    #[test]
    fn unmatched_question_fails() {
        let dir = tempfile::tempdir().unwrap();
        let engine = LocalIndexEngine::new(dir.path(), 3).unwrap();
        let engine_ref = engine.ingest(&docs(&[("a.txt", "Hello world")])).unwrap();
        assert!(engine.query(&handle(engine_ref), "quantum chromodynamics").is_err());
    }

    #[test]
    fn malformed_reference_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let engine = LocalIndexEngine::new(dir.path(), 3).unwrap();
        assert!(engine
            .query(&handle("../../etc/passwd".to_string()), "hello world")
            .is_err());
    }

    #[test]
    fn index_survives_a_new_engine_instance() {
        let dir = tempfile::tempdir().unwrap();
        let engine_ref = LocalIndexEngine::new(dir.path(), 3)
            .unwrap()
            .ingest(&docs(&[("a.txt", "Hello world")]))
            .unwrap();

        let reopened = LocalIndexEngine::new(dir.path(), 3).unwrap();
        assert!(reopened.query(&handle(engine_ref), "hello").is_ok());
    }
}
