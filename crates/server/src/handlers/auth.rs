//! Authentication-related endpoints.

use crate::auth::require_session;
use crate::error::ApiResult;
use axum::Json;
use axum::extract::Request;
use quarry_core::token::Permission;
use serde::Serialize;

/// Response for the authenticated caller.
#[derive(Debug, Serialize)]
pub struct WhoamiResponse {
    pub alias: String,
    pub path: String,
    pub permissions: Vec<Permission>,
    pub repositories: Vec<String>,
}

/// GET /api/auth/whoami - Return the token identity and its repository scope.
pub async fn whoami(req: Request) -> ApiResult<Json<WhoamiResponse>> {
    let session = require_session(&req)?;
    let token = session.token();

    Ok(Json(WhoamiResponse {
        alias: token.alias.clone(),
        path: token.path.clone(),
        permissions: token.permissions.to_list(),
        repositories: session.repositories().to_vec(),
    }))
}
