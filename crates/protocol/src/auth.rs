//! Challenge-response password digest.
//!
//! ```text
//! inner  = base64(SHA-256(password || salt))
//! digest = base64(SHA-256(inner || challenge))
//! ```
//!
//! Strings are hashed as UTF-8 and rendered with the standard, padded
//! base64 alphabet, which is what existing streamers compute.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// The digest a streamer knowing `password` must send in `identify`.
pub fn expected_digest(password: &str, salt: &str, challenge: &str) -> String {
    let inner = sha256_base64(&[password, salt]);
    sha256_base64(&[&inner, challenge])
}

/// Check a candidate digest in constant time.
pub fn verify(candidate: &str, password: &str, salt: &str, challenge: &str) -> bool {
    let expected = expected_digest(password, salt, challenge);
    // ct_eq needs equal lengths; compare the two SHA-256 outputs instead.
    let ha = Sha256::digest(candidate.as_bytes());
    let hb = Sha256::digest(expected.as_bytes());
    ha.ct_eq(&hb).into()
}

fn sha256_base64(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    STANDARD.encode(hasher.finalize())
}
