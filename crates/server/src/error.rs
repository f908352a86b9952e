//! API error types.

use crate::auth::AuthError;
use crate::proxy::ProxyError;
use axum::Json;
use axum::http::header::WWW_AUTHENTICATE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use quarry_maven::MavenError;
use quarry_storage::{StorageError, WriteError};
use quarry_tokens::TokenStoreError;
use serde::Serialize;

/// Realm advertised to clients on authentication failures.
const AUTH_CHALLENGE: &str = "Basic realm=\"quarry\"";

/// API error response.
///
/// Also attached to the response extensions so the error page middleware can
/// render it as HTML for browsers.
#[derive(Clone, Debug, Serialize)]
pub struct ErrorResponse {
    /// HTTP status code.
    pub status: u16,
    /// Human-readable error message.
    pub message: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Proxy(#[from] ProxyError),

    #[error(transparent)]
    Maven(#[from] MavenError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("token store error: {0}")]
    Tokens(#[from] TokenStoreError),

    #[error(transparent)]
    Core(#[from] quarry_core::Error),
}

impl ApiError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Auth(e) => match e {
                AuthError::InsufficientPermission(_) => StatusCode::FORBIDDEN,
                AuthError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::UNAUTHORIZED,
            },
            Self::Proxy(e) => match e {
                ProxyError::InvalidProxiedRequest(_) => StatusCode::BAD_REQUEST,
                ProxyError::NotFound => StatusCode::NOT_FOUND,
                ProxyError::Client(_) | ProxyError::Unavailable => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Maven(e) => match e {
                MavenError::BadRequest(_) => StatusCode::BAD_REQUEST,
                MavenError::NotFound(_) | MavenError::BuildsNotFound(_) => StatusCode::NOT_FOUND,
                MavenError::Storage(e) => storage_status(e),
                MavenError::Write(e) => write_status(e),
                MavenError::Xml(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Storage(e) => storage_status(e),
            Self::Write(e) => write_status(e),
            Self::Tokens(e) => match e {
                TokenStoreError::NotFound(_) => StatusCode::NOT_FOUND,
                TokenStoreError::Invalid(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Core(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn is_auth_failure(&self) -> bool {
        self.status_code() == StatusCode::UNAUTHORIZED
    }
}

fn storage_status(error: &StorageError) -> StatusCode {
    match error {
        StorageError::NotFound(_) => StatusCode::NOT_FOUND,
        StorageError::InvalidKey(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn write_status(error: &WriteError) -> StatusCode {
    match error {
        WriteError::QuotaExceeded { .. } => StatusCode::INSUFFICIENT_STORAGE,
        WriteError::Source(_) => StatusCode::BAD_REQUEST,
        WriteError::Storage(e) => storage_status(e),
        WriteError::Timeout(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = ErrorResponse {
            status: status.as_u16(),
            message: self.to_string(),
        };
        let mut response = (status, Json(body.clone())).into_response();
        if self.is_auth_failure() {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static(AUTH_CHALLENGE));
        }
        response.extensions_mut().insert(body);
        response
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Minimal HTML page carrying the same status and message as the JSON body.
pub fn render_error_page(error: &ErrorResponse) -> String {
    let reason = StatusCode::from_u16(error.status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Error");
    format!(
        "<!DOCTYPE html>\n<html>\n<head><title>{status} {reason}</title></head>\n\
         <body>\n<h1>{status} {reason}</h1>\n<p>{message}</p>\n</body>\n</html>\n",
        status = error.status,
        reason = reason,
        message = escape_html(&error.message),
    )
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from(AuthError::InvalidCredentials).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(AuthError::InsufficientPermission("deploy".into())).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(WriteError::QuotaExceeded {
                requested: 10,
                remaining: 1
            })
            .status_code(),
            StatusCode::INSUFFICIENT_STORAGE
        );
        assert_eq!(
            ApiError::from(WriteError::Timeout("k".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(MavenError::BuildsNotFound("d".into())).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(ProxyError::InvalidProxiedRequest("a/b".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(StorageError::NotFound("k".into())).status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_auth_failures_carry_challenge() {
        let response = ApiError::from(AuthError::MissingHeader).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(WWW_AUTHENTICATE).unwrap(),
            AUTH_CHALLENGE
        );
        assert!(response.extensions().get::<ErrorResponse>().is_some());

        let forbidden =
            ApiError::from(AuthError::InsufficientPermission("x".into())).into_response();
        assert!(forbidden.headers().get(WWW_AUTHENTICATE).is_none());
    }

    #[test]
    fn test_error_page_escapes_message() {
        let page = render_error_page(&ErrorResponse {
            status: 404,
            message: "not found: <script>".to_string(),
        });
        assert!(page.contains("<h1>404 Not Found</h1>"));
        assert!(page.contains("not found: &lt;script&gt;"));
    }
}
