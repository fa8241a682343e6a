//! docqa-ingest: Document ingestion for the document Q&A orchestrator.
//!
//! Runs each uploaded file through a [`TextExtractor`], concatenates its
//! pages, and produces a [`docqa_core::DocumentSet`] in upload order, either
//! one document per file or a single combined document.

pub mod extract;
pub mod ingestor;

pub use extract::{ExtractionError, PlainTextExtractor, TextExtractor};
pub use ingestor::{DocumentIngestor, IngestReport};
