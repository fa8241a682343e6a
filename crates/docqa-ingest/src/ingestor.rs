//! Uploaded files → ordered [`DocumentSet`].

use std::time::Instant;

use docqa_core::config::{MergeMode, PartialFailurePolicy};
use docqa_core::events::UploadedFile;
use docqa_core::{Document, DocumentSet, IngestError};

use crate::extract::TextExtractor;

/// Name given to the single document produced in combined mode.
pub const COMBINED_SOURCE_NAME: &str = "combined";

/// Result of extracting a batch of uploads.
///
/// Files that could not be read are listed in `failures`; every other file
/// is in `documents`, in upload order.
#[derive(Debug)]
pub struct IngestReport {
    pub documents: DocumentSet,
    pub failures: Vec<IngestError>,
}

impl IngestReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Apply a partial-failure policy.
    ///
    /// Returns the documents to build from plus the names of skipped files.
    /// Under [`PartialFailurePolicy::Abort`] any failure is an error; under
    /// [`PartialFailurePolicy::SkipFailed`] failures are skipped unless no
    /// file could be read at all.
    pub fn resolve(
        self,
        policy: PartialFailurePolicy,
    ) -> Result<(DocumentSet, Vec<String>), IngestError> {
        let mut failures = self.failures.into_iter();
        let Some(first) = failures.next() else {
            return Ok((self.documents, Vec::new()));
        };

        match policy {
            PartialFailurePolicy::Abort => Err(first),
            PartialFailurePolicy::SkipFailed if self.documents.is_empty() => Err(first),
            PartialFailurePolicy::SkipFailed => {
                let skipped = std::iter::once(first)
                    .chain(failures)
                    .map(|e| e.filename().to_string())
                    .collect();
                Ok((self.documents, skipped))
            }
        }
    }
}

/// Normalizes uploaded files into text documents.
pub struct DocumentIngestor<X> {
    extractor: X,
    combined_separator: String,
}

impl<X: TextExtractor> DocumentIngestor<X> {
    pub fn new(extractor: X, combined_separator: impl Into<String>) -> Self {
        Self {
            extractor,
            combined_separator: combined_separator.into(),
        }
    }

    /// Extract every file, in upload order.
    ///
    /// A file that fails extraction is reported in the result and does not
    /// stop the others. An empty upload yields an empty report.
    pub fn ingest(&self, files: &[UploadedFile], merge_mode: MergeMode) -> IngestReport {
        let start = Instant::now();
        let mut documents = Vec::with_capacity(files.len());
        let mut failures = Vec::new();

        for (source_index, file) in files.iter().enumerate() {
            match self.extractor.extract(&file.bytes) {
                Ok(pages) => documents.push(Document {
                    source_index,
                    source_name: file.filename.clone(),
                    text: pages.concat(),
                }),
                Err(e) => {
                    tracing::warn!(filename = %file.filename, error = %e, "Text extraction failed");
                    failures.push(IngestError::Extraction {
                        filename: file.filename.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let documents = match merge_mode {
            MergeMode::PerFile => documents,
            MergeMode::SingleCombined => self.combine(documents),
        };

        tracing::info!(
            files = files.len(),
            documents = documents.len(),
            failed = failures.len(),
            merge_mode = ?merge_mode,
            duration_ms = start.elapsed().as_millis(),
            "Ingestion complete"
        );

        IngestReport {
            documents: DocumentSet::new(documents),
            failures,
        }
    }

    fn combine(&self, documents: Vec<Document>) -> Vec<Document> {
        if documents.is_empty() {
            return documents;
        }
        let text = documents
            .iter()
            .map(|d| d.text.as_str())
            .collect::<Vec<_>>()
            .join(&self.combined_separator);
        vec![Document {
            source_index: 0,
            source_name: COMBINED_SOURCE_NAME.to_string(),
            text,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{ExtractionError, PlainTextExtractor};

    /// Extractor that fails on anything starting with "%BAD".
    struct PickyExtractor;

    impl TextExtractor for PickyExtractor {
        fn extract(&self, bytes: &[u8]) -> Result<Vec<String>, ExtractionError> {
            if bytes.starts_with(b"%BAD") {
                return Err(ExtractionError::Corrupt("bad header".to_string()));
            }
            PlainTextExtractor.extract(bytes)
        }
    }

    fn ingestor() -> DocumentIngestor<PickyExtractor> {
        DocumentIngestor::new(PickyExtractor, "\n\n")
    }

    #[test]
    fn per_file_preserves_upload_order() {
        let files = vec![
            UploadedFile::new("b.txt", "second upload"),
            UploadedFile::new("a.txt", "first\x0cpages"),
        ];
        let report = ingestor().ingest(&files, MergeMode::PerFile);

        assert!(report.is_complete());
        let docs = report.documents.documents();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].source_name, "b.txt");
        assert_eq!(docs[0].source_index, 0);
        assert_eq!(docs[1].text, "firstpages");
        assert_eq!(docs[1].source_index, 1);
    }

    #[test]
    fn combined_joins_with_separator() {
        let files = vec![UploadedFile::new("a.txt", "one"), UploadedFile::new("b.txt", "two")];
        let report = ingestor().ingest(&files, MergeMode::SingleCombined);

        let docs = report.documents.documents();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].text, "one\n\ntwo");
        assert_eq!(docs[0].source_name, COMBINED_SOURCE_NAME);
    }

    #[test]
    fn empty_upload_is_empty_set_in_both_modes() {
        for mode in [MergeMode::PerFile, MergeMode::SingleCombined] {
            let report = ingestor().ingest(&[], mode);
            assert!(report.documents.is_empty());
            assert!(report.is_complete());
        }
    }

    #[test]
    fn single_file_texts_match_across_modes() {
        let files = vec![UploadedFile::new("a.txt", "Hello world")];
        let per_file = ingestor().ingest(&files, MergeMode::PerFile);
        let combined = ingestor().ingest(&files, MergeMode::SingleCombined);

        let a: Vec<&str> = per_file.documents.texts().collect();
        let b: Vec<&str> = combined.documents.texts().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn failure_is_isolated_to_its_file() {
        let files = vec![
            UploadedFile::new("good.txt", "fine"),
            UploadedFile::new("broken.pdf", "%BAD data"),
            UploadedFile::new("also-good.txt", "also fine"),
        ];
        let report = ingestor().ingest(&files, MergeMode::PerFile);

        assert_eq!(report.documents.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].filename(), "broken.pdf");
        // Upload positions are kept even with a gap.
        assert_eq!(report.documents.documents()[1].source_index, 2);
    }

    #[test]
    fn abort_policy_rejects_partial_ingestion() {
        let files = vec![
            UploadedFile::new("good.txt", "fine"),
            UploadedFile::new("broken.pdf", "%BAD data"),
        ];
        let result = ingestor()
            .ingest(&files, MergeMode::PerFile)
            .resolve(PartialFailurePolicy::Abort);

        match result {
            Err(e) => assert_eq!(e.filename(), "broken.pdf"),
            Ok(_) => panic!("abort policy accepted a partial ingestion"),
        }
    }

    #[test]
    fn skip_policy_keeps_readable_files() {
        let files = vec![
            UploadedFile::new("good.txt", "fine"),
            UploadedFile::new("broken.pdf", "%BAD data"),
        ];
        let (documents, skipped) = ingestor()
            .ingest(&files, MergeMode::SingleCombined)
            .resolve(PartialFailurePolicy::SkipFailed)
            .unwrap();

        assert_eq!(documents.len(), 1);
        assert_eq!(documents.documents()[0].text, "fine");
        assert_eq!(skipped, vec!["broken.pdf".to_string()]);
    }

    #[test]
    fn skip_policy_fails_when_nothing_is_readable() {
        let files = vec![UploadedFile::new("broken.pdf", "%BAD data")];
        let result = ingestor()
            .ingest(&files, MergeMode::PerFile)
            .resolve(PartialFailurePolicy::SkipFailed);
        assert!(result.is_err());
    }
}
