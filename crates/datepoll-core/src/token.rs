use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Base58 alphabet, no 0/O/I/l
const ALPHABET: &[u8] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Length of generated tokens
pub const TOKEN_LENGTH: usize = 24;

/// Secret handed to the voter, required to change or remove their vote
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthToken(String);

impl AuthToken {
    /// Generate a fresh random token
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let token = (0..TOKEN_LENGTH)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        Self(token)
    }

    /// Wrap a token loaded from storage
    pub fn from_stored(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compare against a presented token without short-circuiting on the
    /// first differing byte
    pub fn matches(&self, presented: &str) -> bool {
        let expected = self.0.as_bytes();
        let presented = presented.as_bytes();
        if expected.len() != presented.len() {
            return false;
        }
        expected
            .iter()
            .zip(presented)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

// Keep secrets out of logs
impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(..)")
    }
}
