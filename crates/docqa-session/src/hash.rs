//! BLAKE3 hashing for document fingerprints and stored-session checksums.

use docqa_core::{DocumentSet, Fingerprint, Session};

/// Compute the fingerprint of a document set.
///
/// Covers the ordered document texts only. Each text is length-prefixed so
/// that `["ab", "c"]` and `["a", "bc"]` hash differently, and the document
/// count is hashed first so an empty set differs from a set of one empty text.
pub fn fingerprint(documents: &DocumentSet) -> Fingerprint {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(documents.len() as u64).to_le_bytes());
    for text in documents.texts() {
        hasher.update(&(text.len() as u64).to_le_bytes());
        hasher.update(text.as_bytes());
    }
    Fingerprint(hasher.finalize().to_hex().to_string())
}

/// Compute the BLAKE3 checksum of a session's canonical JSON encoding.
pub fn session_checksum(session: &Session) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(session)?;
    Ok(blake3::hash(&json).to_hex().to_string())
}
