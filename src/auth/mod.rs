//! Authentication and capability tokens
//!
//! - `AdminKey`: shared secret that marks a caller as an administrator
//! - `TokenBroker`: issues single-use tokens that authorize one server log
//!   download within a short window

mod admin;
mod broker;
mod tokens;

pub use admin::{AdminKey, ADMIN_KEY_ENV};
pub use broker::{TokenBroker, Verdict, DEFAULT_TOKEN_TTL};
pub use tokens::{DownloadToken, TOKEN_BYTES};
