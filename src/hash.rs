/// Content hashing for canonical URLs
use sha2::{Digest, Sha256};

use crate::canonical::canonicalize;
use crate::settings::NormalizationPolicy;

/// SHA-256 of the canonical URL as 64 lower-case hex characters
pub fn content_hash(canonical_url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_url.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Canonicalize then hash in one step
pub fn url_hash(raw_url: &str, policy: &NormalizationPolicy) -> String {
    content_hash(&canonicalize(raw_url, policy))
}
