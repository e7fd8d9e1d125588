//! API handlers and the helpers they share: bearer session resolution,
//! client descriptor extraction, and error-to-status mapping.

pub mod auth;
pub mod health;
pub mod history;
pub mod me;

use crate::account::AccountService;
use crate::error::AccountError;
use crate::identity::{AuthError, Session};
use axum::{
    http::{
        HeaderMap, StatusCode,
        header::{AUTHORIZATION, USER_AGENT},
    },
    response::{IntoResponse, Response},
};
use tracing::error;

/// Longest client descriptor stored with a login attempt.
const MAX_CLIENT_DESCRIPTOR_LEN: usize = 512;

pub(crate) fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Free-text device string for login history, taken from `User-Agent`.
pub(crate) fn client_descriptor(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| value.chars().take(MAX_CLIENT_DESCRIPTOR_LEN).collect())
}

/// Resolve the bearer token into a session, or the response to return.
pub(crate) async fn require_session(
    headers: &HeaderMap,
    service: &AccountService,
) -> Result<Session, Response> {
    let Some(token) = extract_bearer_token(headers) else {
        return Err(StatusCode::UNAUTHORIZED.into_response());
    };

    match service.resolve_session(&token).await {
        Ok(context) => context
            .session()
            .cloned()
            .ok_or_else(|| StatusCode::UNAUTHORIZED.into_response()),
        Err(err) => Err(error_response(&err)),
    }
}

/// Map an account error to a generic, user-facing response.
pub(crate) fn error_response(err: &AccountError) -> Response {
    match err {
        AccountError::Validation(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
        AccountError::Authentication(_) => (
            StatusCode::UNAUTHORIZED,
            "Invalid login credentials".to_string(),
        )
            .into_response(),
        AccountError::Unauthenticated => StatusCode::UNAUTHORIZED.into_response(),
        AccountError::Authorization(_) => {
            (StatusCode::FORBIDDEN, "Request failed".to_string()).into_response()
        }
        AccountError::PrimaryCommit(source) => {
            error!("Profile save failed: {source}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to save profile".to_string(),
            )
                .into_response()
        }
        AccountError::Load(source) => {
            error!("Account data load failed: {source}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load account data".to_string(),
            )
                .into_response()
        }
        AccountError::Provider(AuthError::Rejected { message }) => {
            (StatusCode::BAD_REQUEST, message.clone()).into_response()
        }
        AccountError::Provider(source) => {
            error!("Identity provider failure: {source}");
            (
                StatusCode::BAD_GATEWAY,
                "Identity provider unavailable".to_string(),
            )
                .into_response()
        }
    }
}
