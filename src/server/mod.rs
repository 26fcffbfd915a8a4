//! Status server
//!
//! Serves the admin status publication over WebSocket, the server log
//! download (gated by single-use tokens), and session lifecycle ingest.

mod connections;
mod http;
pub mod messages;
mod websocket;

pub use connections::{AdminConnection, ConnectionManager, SubscribeError};
pub use http::{ApiError, TokenResponse};
pub use messages::{ClientMessage, ServerMessage};

use crate::auth::{AdminKey, TokenBroker};
use crate::config::StatusServerConfig;
use crate::sessions::MemorySessionStore;

use anyhow::{Context, Result};
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Shared state for all handlers
#[derive(Clone)]
pub(crate) struct AppState {
    pub sessions: Arc<MemorySessionStore>,
    pub broker: Arc<TokenBroker>,
    pub connections: Arc<ConnectionManager>,
    pub admin_key: Option<AdminKey>,
    pub log_file: PathBuf,
    pub log_file_name: String,
}

/// The status server
pub struct StatusServer {
    config: StatusServerConfig,
    state: AppState,
}

impl StatusServer {
    pub fn new(config: StatusServerConfig, sessions: Arc<MemorySessionStore>) -> Self {
        let state = AppState {
            sessions,
            broker: Arc::new(TokenBroker::new(config.token_ttl)),
            connections: Arc::new(ConnectionManager::new()),
            admin_key: config.admin_key.clone(),
            log_file: config.log_file.clone(),
            log_file_name: config.log_file_name(),
        };

        Self { config, state }
    }

    /// Build the HTTP router
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(http::health_handler))
            .route("/ws", get(websocket::ws_handler))
            .route("/admin/server-log/token", post(http::issue_log_token))
            .route("/admin/status/server-log/{token}", get(http::download_server_log))
            .route("/admin/sessions", put(http::put_session))
            .route("/admin/sessions/{session_id}", delete(http::delete_session))
            .with_state(self.state.clone())
    }

    pub fn sessions(&self) -> Arc<MemorySessionStore> {
        self.state.sessions.clone()
    }

    pub fn broker(&self) -> Arc<TokenBroker> {
        self.state.broker.clone()
    }

    /// Get connection count
    pub fn connection_count(&self) -> usize {
        self.state.connections.count()
    }

    /// Bind the configured address and serve until `shutdown` resolves
    pub async fn run(&self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .with_context(|| format!("Failed to bind {}", self.config.bind_addr))?;

        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let addr: SocketAddr = listener.local_addr()?;
        if self.state.admin_key.is_none() {
            warn!("No admin key configured, all admin requests will be refused");
        }

        let sweeper = self.spawn_token_sweeper();

        info!(addr = %addr, "Status server listening");
        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await;

        sweeper.abort();
        result.context("Status server failed")
    }

    fn spawn_token_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let broker = self.state.broker.clone();
        let period = self.config.sweep_interval.max(Duration::from_secs(1));

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // First tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                broker.sweep_expired();
            }
        })
    }
}
