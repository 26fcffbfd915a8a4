//! Server configuration

use crate::auth::{AdminKey, DEFAULT_TOKEN_TTL};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default listen address
pub const DEFAULT_BIND: &str = "127.0.0.1:6090";

/// Per-connection queue depth for outbound WebSocket messages
pub const OUTBOUND_QUEUE_DEPTH: usize = 100;

/// File name offered to browsers when the log file path has none
pub const DEFAULT_LOG_FILE_NAME: &str = "server.log";

/// Status server configuration
#[derive(Debug, Clone)]
pub struct StatusServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,
    /// Key identifying administrators; without one every admin call is refused
    pub admin_key: Option<AdminKey>,
    /// Server log offered for download
    pub log_file: PathBuf,
    /// Lifetime of a download token
    pub token_ttl: Duration,
    /// How often abandoned tokens are swept
    pub sweep_interval: Duration,
}

impl StatusServerConfig {
    pub fn new(bind_addr: SocketAddr, log_file: impl Into<PathBuf>) -> Self {
        Self {
            bind_addr,
            admin_key: None,
            log_file: log_file.into(),
            token_ttl: DEFAULT_TOKEN_TTL,
            sweep_interval: DEFAULT_TOKEN_TTL,
        }
    }

    pub fn admin_key(mut self, key: AdminKey) -> Self {
        self.admin_key = Some(key);
        self
    }

    /// Set the token TTL; the sweep interval follows it
    pub fn token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self.sweep_interval = ttl;
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Name used in the download's `Content-Disposition`
    pub fn log_file_name(&self) -> String {
        Path::new(&self.log_file)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(DEFAULT_LOG_FILE_NAME)
            .to_string()
    }
}
