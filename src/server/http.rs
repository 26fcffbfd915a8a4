//! HTTP endpoints: log download tokens, the download itself, session ingest

use crate::auth::Verdict;
use crate::server::AppState;
use crate::sessions::Session;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info};

/// Errors surfaced by the HTTP layer
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Forbidden(&'static str),

    #[error("Invalid server log download token.")]
    InvalidDownloadToken,

    #[error("session not found")]
    SessionNotFound,

    #[error("server log unavailable")]
    LogUnavailable(#[source] std::io::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::InvalidDownloadToken | ApiError::SessionNotFound => StatusCode::NOT_FOUND,
            ApiError::LogUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (
            status,
            [(header::CONTENT_TYPE, "text/plain")],
            self.to_string(),
        )
            .into_response()
    }
}

/// Refuse the request unless it carries the admin key
fn require_admin(state: &AppState, headers: &HeaderMap, denial: &'static str) -> Result<(), ApiError> {
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .zip(state.admin_key.as_ref())
        .is_some_and(|(value, key)| key.matches_bearer(value));

    if authorized {
        Ok(())
    } else {
        Err(ApiError::Forbidden(denial))
    }
}

pub(crate) async fn health_handler() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Issue a one-time server log download token
pub(crate) async fn issue_log_token(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<TokenResponse>, ApiError> {
    require_admin(&state, &headers, "User must be admin to download system log.")?;

    let token = state.broker.issue();
    info!(outstanding = state.broker.outstanding(), "Server log download token issued");

    Ok(Json(TokenResponse {
        token: token.into_string(),
    }))
}

/// Redeem a token and send the server log
pub(crate) async fn download_server_log(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Response, ApiError> {
    if state.broker.consume(&token) == Verdict::Rejected {
        debug!("Server log download refused");
        return Err(ApiError::InvalidDownloadToken);
    }

    // The log is assumed small enough to hold in memory
    let contents = tokio::fs::read(&state.log_file).await.map_err(|e| {
        error!(path = %state.log_file.display(), error = %e, "Failed to read server log");
        ApiError::LogUnavailable(e)
    })?;

    info!(bytes = contents.len(), "Serving server log download");

    let disposition = format!("attachment;filename=\"{}\"", state.log_file_name);
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_LENGTH, contents.len().to_string()),
            (header::CONTENT_TYPE, "text/plain".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        contents,
    )
        .into_response())
}

/// Record a live session
pub(crate) async fn put_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(session): Json<Session>,
) -> Result<StatusCode, ApiError> {
    require_admin(&state, &headers, "User must be admin to report sessions.")?;

    if state.sessions.insert(session) {
        Ok(StatusCode::CREATED)
    } else {
        Ok(StatusCode::OK)
    }
}

/// Forget a session
pub(crate) async fn delete_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    require_admin(&state, &headers, "User must be admin to report sessions.")?;

    state
        .sessions
        .remove(&session_id)
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or(ApiError::SessionNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        let cases = [
            (ApiError::Forbidden("no"), StatusCode::FORBIDDEN),
            (ApiError::InvalidDownloadToken, StatusCode::NOT_FOUND),
            (ApiError::SessionNotFound, StatusCode::NOT_FOUND),
            (
                ApiError::LogUnavailable(std::io::Error::from(std::io::ErrorKind::NotFound)),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn test_invalid_token_message() {
        assert_eq!(
            ApiError::InvalidDownloadToken.to_string(),
            "Invalid server log download token."
        );
    }
}
