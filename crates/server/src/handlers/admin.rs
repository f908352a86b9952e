//! Administrative endpoints: health, token management and cache control.

use crate::auth::require_session;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use quarry_core::token::{
    Permission, Permissions, Token, generate_secret, hash_secret, validate_token_path,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Maximum request body size for admin endpoints (1 MiB).
const MAX_ADMIN_BODY_SIZE: usize = 1024 * 1024;

const MAX_ALIAS_LEN: usize = 64;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /api/health - Health check.
///
/// Unauthenticated; reports only status and version.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    state.storage.health_check().await?;
    state.tokens.health_check().await?;

    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    }))
}

/// Create token request. `permissions` is a flag string: `m` manager,
/// `w` write; read is implicit.
#[derive(Debug, Deserialize)]
pub struct CreateTokenRequest {
    pub alias: String,
    pub path: String,
    #[serde(default)]
    pub permissions: String,
}

/// Create token response. The secret is returned once and never stored.
#[derive(Debug, Serialize)]
pub struct CreateTokenResponse {
    pub alias: String,
    pub secret: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePermissionsRequest {
    pub permissions: String,
}

/// Token listing entry.
#[derive(Debug, Serialize)]
pub struct TokenInfo {
    pub alias: String,
    pub path: String,
    pub permissions: Vec<Permission>,
    pub created_at: String,
}

impl TryFrom<Token> for TokenInfo {
    type Error = ApiError;

    fn try_from(token: Token) -> Result<Self, Self::Error> {
        let created_at = token
            .created_at
            .format(&Rfc3339)
            .map_err(|e| ApiError::Internal(format!("failed to format created_at: {e}")))?;
        Ok(Self {
            permissions: token.permissions.to_list(),
            alias: token.alias,
            path: token.path,
            created_at,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct PurgeResponse {
    pub purged: usize,
}

async fn read_json<T: DeserializeOwned>(req: Request) -> ApiResult<T> {
    let bytes = axum::body::to_bytes(req.into_body(), MAX_ADMIN_BODY_SIZE)
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read body: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::BadRequest(format!("invalid JSON: {e}")))
}

fn require_manager(state: &AppState, req: &Request) -> ApiResult<String> {
    let session = require_session(req)?;
    state.authorizer.require_manager(session)?;
    Ok(session.alias().to_string())
}

/// Aliases are the Basic auth user name, so `:` and whitespace are out.
fn validate_alias(alias: &str) -> ApiResult<()> {
    if alias.is_empty() || alias.len() > MAX_ALIAS_LEN {
        return Err(ApiError::BadRequest(format!(
            "alias must be 1 to {MAX_ALIAS_LEN} characters"
        )));
    }
    if alias.chars().any(|c| c == ':' || c.is_whitespace() || c.is_control()) {
        return Err(ApiError::BadRequest(format!(
            "alias must not contain ':' or whitespace: {alias}"
        )));
    }
    Ok(())
}

/// GET /api/tokens - List tokens.
pub async fn list_tokens(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<Vec<TokenInfo>>> {
    require_manager(&state, &req)?;

    let tokens = state.tokens.list_tokens().await?;
    let response = tokens
        .into_iter()
        .map(TokenInfo::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(response))
}

/// POST /api/tokens - Generate a token. An existing alias is replaced and
/// its old secret stops working.
pub async fn create_token(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<(StatusCode, Json<CreateTokenResponse>)> {
    let issuer = require_manager(&state, &req)?;
    let body: CreateTokenRequest = read_json(req).await?;

    validate_alias(&body.alias)?;
    validate_token_path(&body.path)?;
    let permissions = Permissions::parse(&body.permissions)?;

    let secret = generate_secret();
    let token = Token {
        alias: body.alias,
        path: body.path,
        permissions,
        secret_hash: hash_secret(&secret),
        created_at: OffsetDateTime::now_utc(),
    };
    state.tokens.create_token(&token).await?;

    tracing::info!(
        issuer = %issuer,
        alias = %token.alias,
        path = %token.path,
        permissions = %permissions.to_flags(),
        "token generated"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateTokenResponse {
            alias: token.alias,
            secret,
        }),
    ))
}

/// PUT /api/tokens/{alias}/permissions - Replace a token's permission flags.
pub async fn update_permissions(
    State(state): State<AppState>,
    Path(alias): Path<String>,
    req: Request,
) -> ApiResult<StatusCode> {
    let issuer = require_manager(&state, &req)?;
    let body: UpdatePermissionsRequest = read_json(req).await?;
    let permissions = Permissions::parse(&body.permissions)?;

    state.tokens.update_permissions(&alias, permissions).await?;
    tracing::info!(issuer = %issuer, alias = %alias, permissions = %permissions.to_flags(), "token permissions changed");

    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/tokens/{alias} - Revoke a token.
pub async fn revoke_token(
    State(state): State<AppState>,
    Path(alias): Path<String>,
    req: Request,
) -> ApiResult<StatusCode> {
    let issuer = require_manager(&state, &req)?;

    if issuer == alias {
        return Err(ApiError::BadRequest(
            "cannot revoke the token used for this request".to_string(),
        ));
    }

    state.tokens.delete_token(&alias).await?;
    tracing::info!(issuer = %issuer, alias = %alias, "token revoked");

    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/metadata/cache - Drop every cached metadata document.
pub async fn purge_metadata_cache(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<PurgeResponse>> {
    let issuer = require_manager(&state, &req)?;
    let purged = state.generator.purge();
    tracing::info!(issuer = %issuer, purged, "metadata cache purged");
    Ok(Json(PurgeResponse { purged }))
}
