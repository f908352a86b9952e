//! Authentication and authorization middleware.
//!
//! Credentials are `Authorization: Basic base64(alias:secret)`. A request
//! moves through parsing, secret verification and the path/permission check;
//! any failure stops it with a distinct [`AuthError`].

use crate::error::{ApiError, ApiResult, ErrorResponse, render_error_page};
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use quarry_core::token::Permission;
use quarry_core::{RepositoryPath, RepositorySet, Session};
use quarry_tokens::{TokenStore, TokenStoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

/// Maximum length for trace IDs.
/// Longer trace IDs are truncated to prevent log bloat and potential log injection.
const MAX_TRACE_ID_LEN: usize = 128;

/// Trace ID for request correlation.
#[derive(Clone, Debug)]
pub struct TraceId(pub String);

impl TraceId {
    /// Generate a new random trace ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a trace ID from a client-provided value, truncated and limited
    /// to printable ASCII.
    pub fn from_client(value: &str) -> Self {
        let sanitized: String = value
            .chars()
            .take(MAX_TRACE_ID_LEN)
            .filter(|c| c.is_ascii_graphic() || *c == ' ')
            .collect();

        if sanitized.is_empty() {
            Self::new()
        } else {
            Self(sanitized)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Authentication and authorization failures.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication required")]
    MissingHeader,

    #[error("unsupported authorization scheme, expected Basic")]
    UnsupportedScheme,

    #[error("malformed credentials")]
    MalformedCredentials,

    /// Unknown alias and wrong secret are indistinguishable to the caller.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("insufficient permission: {0}")]
    InsufficientPermission(String),

    #[error("token lookup failed: {0}")]
    Store(#[from] TokenStoreError),
}

/// Parsed `alias:secret` pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub alias: String,
    pub secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("alias", &self.alias)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Parse an `Authorization` header value. The scheme must be exactly
    /// `Basic` and the decoded payload must hold one `:` separator.
    pub fn parse(header: &HeaderValue) -> Result<Self, AuthError> {
        let value = header.to_str().map_err(|_| AuthError::MalformedCredentials)?;
        let (scheme, payload) = value.split_once(' ').ok_or(AuthError::UnsupportedScheme)?;
        if scheme != "Basic" {
            return Err(AuthError::UnsupportedScheme);
        }

        let decoded = STANDARD
            .decode(payload.trim())
            .map_err(|_| AuthError::MalformedCredentials)?;
        let decoded = String::from_utf8(decoded).map_err(|_| AuthError::MalformedCredentials)?;
        let (alias, secret) = decoded
            .split_once(':')
            .ok_or(AuthError::MalformedCredentials)?;
        if alias.is_empty() {
            return Err(AuthError::MalformedCredentials);
        }

        Ok(Self {
            alias: alias.to_string(),
            secret: secret.to_string(),
        })
    }
}

/// Verifies credentials against the token store and checks sessions against
/// request paths.
#[derive(Clone)]
pub struct Authorizer {
    tokens: Arc<dyn TokenStore>,
    repositories: Arc<RepositorySet>,
}

impl Authorizer {
    pub fn new(tokens: Arc<dyn TokenStore>, repositories: Arc<RepositorySet>) -> Self {
        Self {
            tokens,
            repositories,
        }
    }

    /// Authenticate the request headers into a session.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<Session, AuthError> {
        let header = headers.get(AUTHORIZATION).ok_or(AuthError::MissingHeader)?;
        let credentials = Credentials::parse(header)?;
        self.verify(&credentials).await
    }

    /// Verify parsed credentials.
    pub async fn verify(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        let token = self
            .tokens
            .get_token(&credentials.alias)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        if !token.verify_secret(&credentials.secret) {
            tracing::debug!(alias = %credentials.alias, "secret mismatch");
            return Err(AuthError::InvalidCredentials);
        }
        Ok(Session::new(token, &self.repositories))
    }

    /// Check that `session` may perform `permission` on `path`.
    pub fn authorize(
        &self,
        session: &Session,
        path: &RepositoryPath,
        permission: Permission,
    ) -> Result<(), AuthError> {
        if !session.has_permission(&path.absolute()) {
            return Err(AuthError::InsufficientPermission(format!(
                "token '{}' does not cover {}",
                session.alias(),
                path
            )));
        }
        if !session.allows(permission) {
            return Err(AuthError::InsufficientPermission(format!(
                "token '{}' lacks {} permission",
                session.alias(),
                permission
            )));
        }
        Ok(())
    }

    /// Operator endpoints need the manager flag, independent of path.
    pub fn require_manager(&self, session: &Session) -> Result<(), AuthError> {
        if session.allows(Permission::Manager) {
            Ok(())
        } else {
            Err(AuthError::InsufficientPermission(format!(
                "token '{}' lacks manager permission",
                session.alias()
            )))
        }
    }
}

/// Authenticated request extension.
#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub session: Session,
}

/// Extract trace ID from X-Trace-Id header or generate a new one.
fn extract_or_generate_trace_id(req: &Request) -> TraceId {
    req.headers()
        .get("x-trace-id")
        .and_then(|v| v.to_str().ok())
        .map(TraceId::from_client)
        .unwrap_or_else(TraceId::new)
}

/// Authentication middleware that validates credentials and sets up trace
/// context. Requests without an `Authorization` header continue anonymously;
/// handlers decide whether a session is required.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let trace_id = extract_or_generate_trace_id(&req);
    let span = tracing::info_span!("request", trace_id = %trace_id);
    req.extensions_mut().insert(trace_id);

    async move {
        if req.headers().contains_key(AUTHORIZATION) {
            let session = state.authorizer.authenticate(req.headers()).await?;
            tracing::debug!(alias = %session.alias(), "authenticated");
            req.extensions_mut().insert(AuthenticatedUser { session });
        }
        Ok::<_, ApiError>(next.run(req).await)
    }
    .instrument(span)
    .await
}

/// Render error responses as HTML for clients that prefer `text/html`.
pub async fn error_page_middleware(req: Request, next: Next) -> Response {
    let wants_html = prefers_html(req.headers());
    let mut response = next.run(req).await;
    if !wants_html {
        return response;
    }

    let Some(error) = response.extensions_mut().remove::<ErrorResponse>() else {
        return response;
    };
    let page = render_error_page(&error);
    let headers = response.headers_mut();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    headers.remove(CONTENT_LENGTH);
    *response.body_mut() = Body::from(page);
    response
}

/// Whether the `Accept` header ranks `text/html` above JSON.
fn prefers_html(headers: &HeaderMap) -> bool {
    let Some(accept) = headers.get(ACCEPT).and_then(|v| v.to_str().ok()) else {
        return false;
    };

    let mut html = None;
    let mut json = None;
    for (position, item) in accept.split(',').enumerate() {
        let mut parts = item.split(';');
        let media = parts.next().unwrap_or_default().trim();
        let quality = parts
            .filter_map(|p| p.trim().strip_prefix("q="))
            .find_map(|q| q.parse::<f32>().ok())
            .unwrap_or(1.0);
        let rank = (quality, std::cmp::Reverse(position));
        match media {
            "text/html" => html = html.or(Some(rank)),
            "application/json" => json = json.or(Some(rank)),
            _ => {}
        }
    }

    match (html, json) {
        (Some((hq, _)), _) if hq <= 0.0 => false,
        (Some(h), Some(j)) => h.0 > j.0 || (h.0 == j.0 && h.1 > j.1),
        (Some(_), None) => true,
        (None, _) => false,
    }
}

/// Require authentication (credentials must be present).
pub fn require_session(req: &Request) -> ApiResult<&Session> {
    get_session(req).ok_or_else(|| AuthError::MissingHeader.into())
}

/// Get optional authentication.
pub fn get_session(req: &Request) -> Option<&Session> {
    req.extensions()
        .get::<AuthenticatedUser>()
        .map(|user| &user.session)
}
