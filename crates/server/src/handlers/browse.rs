//! Directory listings and repository discovery.

use super::common::{authorize_read, resolve_path};
use crate::auth::get_session;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Request, State};
use quarry_core::version::sort_by_relevance;
use quarry_storage::{Entry, StorageError};
use serde::Serialize;
use time::format_description::well_known::Rfc3339;

const BROWSE_PREFIX: &str = "/api/browse";

#[derive(Debug, Serialize)]
pub struct ListingEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub size: u64,
    pub last_modified: Option<String>,
}

impl From<Entry> for ListingEntry {
    fn from(entry: Entry) -> Self {
        Self {
            kind: if entry.is_directory { "directory" } else { "file" },
            size: entry.size,
            last_modified: entry.last_modified.and_then(|t| t.format(&Rfc3339).ok()),
            name: entry.name,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListingResponse {
    pub path: String,
    pub entries: Vec<ListingEntry>,
}

#[derive(Debug, Serialize)]
pub struct RepositorySummary {
    pub name: String,
    pub hidden: bool,
}

/// GET /api/browse/{*path} - List a directory, directories first and newest
/// versions on top.
pub async fn browse(State(state): State<AppState>, req: Request) -> ApiResult<Json<ListingResponse>> {
    let raw = req
        .uri()
        .path()
        .strip_prefix(BROWSE_PREFIX)
        .unwrap_or_default();
    let path = resolve_path(&state, raw)?;
    authorize_read(&state, get_session(&req), &path)?;

    let key = path.key();
    let at_root = path.segments().is_empty();
    if !at_root && !state.storage.is_directory(&key).await? {
        return Err(ApiError::NotFound(format!("directory not found: {path}")));
    }

    let mut entries = match state.storage.list(&key).await {
        Ok(entries) => entries,
        // A repository nothing was deployed to yet.
        Err(StorageError::NotFound(_)) if at_root => Vec::new(),
        Err(e) => return Err(e.into()),
    };
    entries.retain(|entry| !quarry_storage::traits::is_temp_name(&entry.name));
    sort_by_relevance(&mut entries, |entry| (entry.name.as_str(), entry.is_directory));

    Ok(Json(ListingResponse {
        path: path.to_string(),
        entries: entries.into_iter().map(ListingEntry::from).collect(),
    }))
}

/// GET /api/repositories - Repositories visible to the caller.
pub async fn list_repositories(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<Vec<RepositorySummary>>> {
    let visible: Vec<RepositorySummary> = match get_session(&req) {
        Some(session) => session
            .repositories()
            .iter()
            .filter_map(|name| state.repositories.get(name))
            .map(|repository| RepositorySummary {
                name: repository.name.clone(),
                hidden: repository.hidden,
            })
            .collect(),
        None if state.config.server.full_authentication => Vec::new(),
        None => state
            .repositories
            .iter()
            .filter(|repository| !repository.hidden)
            .map(|repository| RepositorySummary {
                name: repository.name.clone(),
                hidden: false,
            })
            .collect(),
    };
    Ok(Json(visible))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthenticatedUser;
    use axum::body::Body;
    use quarry_core::Repository;
    use quarry_core::config::AppConfig;
    use quarry_core::token::{Permissions, Session, Token};
    use quarry_storage::{DiskQuota, MemoryBackend};
    use quarry_tokens::MemoryTokenStore;
    use std::sync::Arc;
    use time::OffsetDateTime;

    fn state() -> AppState {
        let mut config = AppConfig::for_testing();
        config.repositories.push(Repository::hidden("private"));
        AppState::new(
            config,
            Arc::new(MemoryBackend::new()),
            Arc::new(DiskQuota::unlimited()),
            Arc::new(MemoryTokenStore::new()),
        )
        .unwrap()
    }

    fn request_as(path: &str, state: &AppState) -> Request {
        let mut req = Request::builder().uri("/api/repositories").body(Body::empty()).unwrap();
        let token = Token {
            alias: "reader".to_string(),
            path: path.to_string(),
            permissions: Permissions::READ,
            secret_hash: String::new(),
            created_at: OffsetDateTime::now_utc(),
        };
        req.extensions_mut().insert(AuthenticatedUser {
            session: Session::new(token, &state.repositories),
        });
        req
    }

    #[tokio::test]
    async fn test_anonymous_sees_public_repositories() {
        let state = state();
        let req = Request::builder().uri("/api/repositories").body(Body::empty()).unwrap();
        let Json(repositories) = list_repositories(State(state), req).await.unwrap();
        let names: Vec<_> = repositories.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["releases", "snapshots"]);
    }

    #[tokio::test]
    async fn test_session_sees_its_scope() {
        let state = state();
        let req = request_as("/", &state);
        let Json(repositories) = list_repositories(State(state.clone()), req).await.unwrap();
        assert_eq!(repositories.len(), 3);

        let req = request_as("/private", &state);
        let Json(repositories) = list_repositories(State(state), req).await.unwrap();
        assert_eq!(repositories.len(), 1);
        assert_eq!(repositories[0].name, "private");
        assert!(repositories[0].hidden);
    }
}
