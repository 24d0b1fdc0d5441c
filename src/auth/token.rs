//! Random token generation and fingerprinting for session and reset tokens.

use std::fmt;

use anyhow::Context;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

/// Minimum number of random bytes in any issued token (256 bits).
pub const MIN_TOKEN_BYTES: usize = 32;

/// Generate a URL-safe token from `byte_len` bytes of OS randomness.
///
/// The returned string is the plaintext handed to the client. Only its
/// [`TokenHash`] may be persisted.
pub fn generate_token(byte_len: usize) -> anyhow::Result<String> {
    anyhow::ensure!(
        byte_len >= MIN_TOKEN_BYTES,
        "token length {byte_len} is below the {MIN_TOKEN_BYTES}-byte minimum"
    );
    let mut bytes = vec![0u8; byte_len];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to read from the OS random source")?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// SHA-256 fingerprint of a plaintext token, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenHash(String);

impl TokenHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint a token. Tokens are already high-entropy, so a single unsalted
/// SHA-256 pass is enough and keeps lookups cheap.
pub fn hash_token(token: &str) -> TokenHash {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    TokenHash(URL_SAFE_NO_PAD.encode(hasher.finalize()))
}

/// Compare two byte strings without an early exit on the first mismatch.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
