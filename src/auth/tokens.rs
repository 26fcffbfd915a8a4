//! Download token identifiers

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use std::fmt;

/// Random bytes per token (128 bits of entropy)
pub const TOKEN_BYTES: usize = 16;

/// An unguessable, URL-safe capability identifier
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DownloadToken {
    token: String,
}

impl DownloadToken {
    /// Generate a new token
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let mut bytes = [0u8; TOKEN_BYTES];
        rng.fill(&mut bytes);

        Self {
            token: URL_SAFE_NO_PAD.encode(bytes),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.token
    }

    pub fn into_string(self) -> String {
        self.token
    }
}

impl fmt::Display for DownloadToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token)
    }
}

impl fmt::Debug for DownloadToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DownloadToken([REDACTED])")
    }
}
