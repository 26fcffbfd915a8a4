//! Administrator credential

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use std::fmt;

/// Environment variable holding the admin key
pub const ADMIN_KEY_ENV: &str = "SYSTEM_STATUS_ADMIN_KEY";

/// Shared secret identifying administrators
#[derive(Clone)]
pub struct AdminKey {
    key: String,
}

impl AdminKey {
    pub fn new(key: String) -> Self {
        Self { key }
    }

    pub fn from_env() -> Option<Self> {
        std::env::var(ADMIN_KEY_ENV).ok().map(Self::new)
    }

    /// Generate a fresh random key (256 bits)
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::rng().fill(&mut bytes);
        Self::new(URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn matches(&self, token: &str) -> bool {
        // Constant-time comparison to prevent timing attacks
        if token.len() != self.key.len() {
            return false;
        }

        let mut result = 0u8;
        for (a, b) in token.bytes().zip(self.key.bytes()) {
            result |= a ^ b;
        }
        result == 0
    }

    /// Check an `Authorization` header value of the form `Bearer <key>`
    pub fn matches_bearer(&self, header: &str) -> bool {
        header
            .strip_prefix("Bearer ")
            .is_some_and(|token| self.matches(token.trim()))
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }
}

impl fmt::Debug for AdminKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AdminKey([REDACTED])")
    }
}
