//! Proof Key for Code Exchange (RFC 7636) helpers.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

const VERIFIER_MIN_LEN: usize = 43;
const VERIFIER_MAX_LEN: usize = 128;

/// Generates a cryptographically random code verifier.
///
/// 48 bytes of OS entropy encoded as base64url without padding: 64 characters.
pub fn generate_code_verifier() -> String {
    let mut bytes = [0u8; 48];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// `BASE64URL-NOPAD(SHA256(verifier))`, the S256 code challenge.
pub fn generate_code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Anti-forgery `state` value: 16 random bytes, base64url.
pub fn generate_state() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PkceError {
    #[error("code verifier must be 43-128 characters, got {0}")]
    InvalidLength(usize),
    #[error("code verifier contains a character outside [A-Za-z0-9-._~]")]
    InvalidCharacter,
}

/// A code verifier known to satisfy the RFC 7636 length and alphabet rules.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CodeVerifier(String);

impl CodeVerifier {
    pub fn generate() -> Self {
        Self(generate_code_verifier())
    }

    pub fn parse(value: impl Into<String>) -> Result<Self, PkceError> {
        let value = value.into();
        if !(VERIFIER_MIN_LEN..=VERIFIER_MAX_LEN).contains(&value.len()) {
            return Err(PkceError::InvalidLength(value.len()));
        }
        if !value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~'))
        {
            return Err(PkceError::InvalidCharacter);
        }
        Ok(Self(value))
    }

    pub fn challenge(&self) -> String {
        generate_code_challenge(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CodeVerifier {
    type Error = PkceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<CodeVerifier> for String {
    fn from(value: CodeVerifier) -> Self {
        value.0
    }
}

impl fmt::Debug for CodeVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CodeVerifier([REDACTED])")
    }
}
