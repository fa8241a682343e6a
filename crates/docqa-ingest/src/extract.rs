//! Text extraction seam.
//!
//! Binary formats (PDF and friends) are handled by an external extractor
//! plugged in through [`TextExtractor`]. The built-in [`PlainTextExtractor`]
//! covers UTF-8 text files.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("file is not valid UTF-8 text")]
    NotText,

    #[error("file is corrupt: {0}")]
    Corrupt(String),
}

/// Pulls page-ordered text out of one uploaded file.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> Result<Vec<String>, ExtractionError>;
}

/// Extracts UTF-8 text, treating form feeds (`\x0c`) as page breaks.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

const PAGE_BREAK: char = '\x0c';
const BOM: char = '\u{feff}';

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<Vec<String>, ExtractionError> {
        let text = std::str::from_utf8(bytes).map_err(|_| ExtractionError::NotText)?;
        if text.contains('\0') {
            return Err(ExtractionError::Corrupt("contains NUL bytes".to_string()));
        }
        let text = text.strip_prefix(BOM).unwrap_or(text);
        Ok(text.split(PAGE_BREAK).map(str::to_string).collect())
    }
}
