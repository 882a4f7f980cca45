//! Per-connection challenge and salt.

use rand::rngs::OsRng;
use rand::RngCore;
use rr_protocol::Authentication;

/// Random bytes behind each hex-encoded value (512 bits).
const RANDOM_BYTES: usize = 64;

/// A fresh (challenge, salt) pair, generated once per streamer connection
/// and dropped with it.
#[derive(Clone, PartialEq, Eq)]
pub struct Challenge {
    pub challenge: String,
    pub salt: String,
}

impl Challenge {
    pub fn generate() -> Self {
        Self {
            challenge: random_hex(),
            salt: random_hex(),
        }
    }

    /// The `authentication` block of the `hello` message.
    pub fn authentication(&self) -> Authentication {
        Authentication {
            challenge: self.challenge.clone(),
            salt: self.salt.clone(),
        }
    }
}

impl std::fmt::Debug for Challenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Challenge").finish_non_exhaustive()
    }
}

fn random_hex() -> String {
    let mut bytes = [0u8; RANDOM_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
