//! Shared handler helpers.

use crate::auth::AuthError;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use percent_encoding::percent_decode_str;
use quarry_core::token::Permission;
use quarry_core::{RepositoryPath, Session};

/// Resolve a raw request path to a path inside a configured repository.
///
/// Traversal segments are rejected. When `rewrite_path_to_primary` is on, a
/// path whose first segment is not a repository is moved under the primary
/// repository.
pub fn resolve_path(state: &AppState, raw: &str) -> ApiResult<RepositoryPath> {
    let decoded = percent_decode_str(raw)
        .decode_utf8()
        .map_err(|_| ApiError::BadRequest("path is not valid UTF-8".to_string()))?;
    let path = RepositoryPath::parse(&decoded)?;

    let path = match state.repositories.primary() {
        Some(primary)
            if state.config.server.rewrite_path_to_primary
                && !state.repositories.contains(path.repository()) =>
        {
            path.prepend_repository(&primary.name)
        }
        _ => path,
    };

    if !state.repositories.contains(path.repository()) {
        return Err(ApiError::NotFound(format!(
            "repository not found: {}",
            path.repository()
        )));
    }
    Ok(path)
}

/// Reads of hidden repositories, or of any repository under full
/// authentication, need a session covering the path.
pub fn authorize_read(
    state: &AppState,
    session: Option<&Session>,
    path: &RepositoryPath,
) -> ApiResult<()> {
    let hidden = state
        .repositories
        .get(path.repository())
        .is_some_and(|repository| repository.hidden);
    if !hidden && !state.config.server.full_authentication {
        return Ok(());
    }

    let session = session.ok_or(AuthError::MissingHeader)?;
    state
        .authorizer
        .authorize(session, path, Permission::Read)?;
    Ok(())
}

/// Content type served for a stored file, by extension.
pub fn content_type_for(name: &str) -> &'static str {
    match name.rsplit_once('.').map(|(_, extension)| extension) {
        Some("jar" | "war" | "ear" | "aar") => "application/java-archive",
        Some("pom" | "xml") => "application/xml",
        Some("module" | "json") => "application/json",
        Some("md5" | "sha1" | "sha256" | "sha512" | "asc") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}
