use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 fingerprint of submitted code, used as the
/// deduplication key in the structured store.
pub fn content_hash(code: &str) -> String {
    format!("{:x}", Sha256::digest(code.as_bytes()))
}
