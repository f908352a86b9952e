//! Repository file endpoints: lookup, deploy and delete under
//! `/{repository}/{path...}`.
//!
//! Routed through the router fallback since repository names are
//! configuration, not route literals.

use super::common::{authorize_read, content_type_for, resolve_path};
use crate::auth::{get_session, require_session};
use crate::error::{ApiError, ApiResult};
use crate::metrics::{DEPLOYED_BYTES, DEPLOYS, LOOKUPS, record_write_error};
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::StreamExt;
use quarry_core::token::Permission;
use quarry_core::{ArtifactCoordinate, METADATA_FILE, RepositoryPath};
use quarry_maven::{ChecksumAlgorithm, MavenError};
use quarry_storage::{ByteStream, StorageError};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Request for the latest version of an artifact: `{group}/{artifact}/latest`.
const LATEST_FILE: &str = "latest";

/// Uploads of client-side metadata start with this stem; the server
/// generates its own.
const METADATA_STEM: &str = "maven-metadata";

/// Files the server produces instead of reading from storage.
#[derive(Debug, PartialEq, Eq)]
enum Generated {
    Metadata,
    Checksum(ChecksumAlgorithm),
    Latest,
}

impl Generated {
    fn detect(file_name: &str) -> Option<Self> {
        if file_name == METADATA_FILE {
            return Some(Self::Metadata);
        }
        if file_name == LATEST_FILE {
            return Some(Self::Latest);
        }
        file_name
            .strip_prefix(METADATA_FILE)
            .and_then(|rest| rest.strip_prefix('.'))
            .and_then(ChecksumAlgorithm::from_extension)
            .map(Self::Checksum)
    }
}

/// Fallback handler for repository paths.
pub async fn repository_fallback(State(state): State<AppState>, req: Request) -> ApiResult<Response> {
    match *req.method() {
        Method::GET | Method::HEAD => lookup(state, req).await,
        Method::PUT | Method::POST => deploy(state, req).await,
        Method::DELETE => remove(state, req).await,
        ref other => Err(ApiError::MethodNotAllowed(other.to_string())),
    }
}

/// GET/HEAD: generated documents, then stored files, then remotes.
async fn lookup(state: AppState, req: Request) -> ApiResult<Response> {
    let head_only = req.method() == Method::HEAD;
    let path = resolve_path(&state, req.uri().path())?;
    authorize_read(&state, get_session(&req), &path)?;

    let Some(file_name) = path.file_name() else {
        return Err(ApiError::NotFound(format!(
            "{path} is a repository root, browse it under /api/browse"
        )));
    };

    if let Some(generated) = Generated::detect(file_name) {
        match serve_generated(&state, &path, generated).await {
            Ok((content_type, body)) => {
                LOOKUPS.with_label_values(&["generated"]).inc();
                return Ok(respond(head_only, content_type, body));
            }
            // Metadata of artifacts that only exist remotely.
            Err(MavenError::NotFound(_) | MavenError::BuildsNotFound(_))
                if state.proxy.is_some() => {}
            Err(e) => {
                LOOKUPS.with_label_values(&["missing"]).inc();
                return Err(e.into());
            }
        }
    }

    let key = path.key();
    match state.storage.head(&key).await {
        Ok(meta) => {
            LOOKUPS.with_label_values(&["local"]).inc();
            let content_type = content_type_for(file_name);
            if head_only {
                return Ok(file_head(content_type, Some(meta.size), Body::empty()));
            }
            let stream = state
                .storage
                .get_stream(&key)
                .await?
                .map(|result| result.map_err(|e| io::Error::other(e.to_string())));
            return Ok(file_head(
                content_type,
                Some(meta.size),
                Body::from_stream(stream),
            ));
        }
        Err(StorageError::NotFound(_)) => {}
        Err(e) => return Err(e.into()),
    }

    let Some(proxy) = &state.proxy else {
        LOOKUPS.with_label_values(&["missing"]).inc();
        return Err(ApiError::NotFound(format!("file not found: {path}")));
    };

    let artifact = proxy.resolve(&path).await.inspect_err(|_| {
        LOOKUPS.with_label_values(&["missing"]).inc();
    })?;
    LOOKUPS.with_label_values(&["proxied"]).inc();
    tracing::debug!(path = %path, remote = %artifact.remote, "serving proxied artifact");

    let content_type = artifact
        .content_type
        .clone()
        .unwrap_or_else(|| content_type_for(file_name).to_string());
    let content_length = artifact.content_length;
    let body = if head_only {
        Body::empty()
    } else {
        artifact.into_body()
    };
    Ok(file_head(&content_type, content_length, body))
}

async fn serve_generated(
    state: &AppState,
    path: &RepositoryPath,
    generated: Generated,
) -> Result<(&'static str, Bytes), MavenError> {
    let repository = path.repository();
    let segments = path.segments();
    match generated {
        Generated::Metadata => {
            let xml = state.generator.generate(repository, segments).await?;
            Ok(("application/xml", Bytes::copy_from_slice(xml.as_bytes())))
        }
        Generated::Checksum(algorithm) => {
            let mut document = segments.to_vec();
            if let Some(last) = document.last_mut() {
                *last = METADATA_FILE.to_string();
            }
            let digest = state
                .generator
                .generate_checksum(repository, &document, algorithm)
                .await?;
            Ok(("text/plain; charset=utf-8", Bytes::from(digest)))
        }
        Generated::Latest => {
            let artifact = &segments[..segments.len().saturating_sub(1)];
            if artifact.len() < 2 {
                return Err(MavenError::BadRequest(format!(
                    "latest needs a group and an artifact: {path}"
                )));
            }
            let version = state.generator.latest_version(repository, artifact).await?;
            Ok(("text/plain; charset=utf-8", Bytes::from(version)))
        }
    }
}

fn respond(head_only: bool, content_type: &str, body: Bytes) -> Response {
    let length = body.len() as u64;
    let body = if head_only {
        Body::empty()
    } else {
        Body::from(body)
    };
    file_head(content_type, Some(length), body)
}

fn file_head(content_type: &str, length: Option<u64>, body: Body) -> Response {
    let mut response = (StatusCode::OK, [(CONTENT_TYPE, content_type.to_string())], body)
        .into_response();
    if let Some(length) = length {
        response.headers_mut().insert(CONTENT_LENGTH, length.into());
    }
    response
}

/// PUT/POST: store the request body at the path.
async fn deploy(state: AppState, req: Request) -> ApiResult<Response> {
    if !state.config.server.deploy_enabled {
        return Err(ApiError::MethodNotAllowed("deploy is disabled".to_string()));
    }

    let path = resolve_path(&state, req.uri().path())?;
    let session = require_session(&req)?.clone();
    state
        .authorizer
        .authorize(&session, &path, Permission::Write)?;

    let Some(file_name) = path.file_name() else {
        return Err(ApiError::BadRequest(
            "deploy target must be a file".to_string(),
        ));
    };
    if file_name.starts_with(METADATA_STEM) {
        DEPLOYS.with_label_values(&["ignored"]).inc();
        tracing::debug!(path = %path, "client metadata upload acknowledged, not stored");
        return Ok(StatusCode::OK.into_response());
    }

    let key = path.key();
    if state.storage.is_directory(&key).await? {
        return Err(ApiError::BadRequest(format!("{path} is a directory")));
    }

    let max_size = state.config.server.max_deploy_size;
    let size_hint = req
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if let Some(size) = size_hint
        && size > max_size
    {
        return Err(too_large(size, max_size));
    }

    let exceeded = Arc::new(AtomicBool::new(false));
    let body = limited_body(req.into_body(), max_size, exceeded.clone());
    let written = match state.writes.store(&key, body, size_hint).await {
        Ok(written) => written,
        Err(_) if exceeded.load(Ordering::Relaxed) => {
            return Err(too_large(max_size.saturating_add(1), max_size));
        }
        Err(e) => {
            record_write_error(&e);
            return Err(e.into());
        }
    };

    state.generator.invalidate_deployed(&path);
    DEPLOYS.with_label_values(&["stored"]).inc();
    DEPLOYED_BYTES.inc_by(written);
    match ArtifactCoordinate::from_segments(path.segments()) {
        Ok(coordinate) => tracing::info!(
            alias = %session.alias(),
            coordinate = %coordinate,
            file = %coordinate.file_name,
            snapshot = coordinate.is_snapshot(),
            bytes = written,
            "artifact deployed"
        ),
        Err(_) => tracing::info!(alias = %session.alias(), path = %path, bytes = written, "file deployed"),
    }

    Ok(StatusCode::CREATED.into_response())
}

fn too_large(size: u64, max_size: u64) -> ApiError {
    ApiError::PayloadTooLarge(format!(
        "{size} bytes exceeds the deploy limit of {max_size} bytes"
    ))
}

/// Request body as a storage stream that fails once `max_size` is passed.
fn limited_body(body: Body, max_size: u64, exceeded: Arc<AtomicBool>) -> ByteStream {
    let mut seen = 0u64;
    Box::pin(body.into_data_stream().map(move |chunk| {
        let chunk = chunk.map_err(|e| StorageError::Io(io::Error::other(e)))?;
        seen += chunk.len() as u64;
        if seen > max_size {
            exceeded.store(true, Ordering::Relaxed);
            return Err(StorageError::Io(io::Error::other(
                "request body exceeds the deploy limit",
            )));
        }
        Ok(chunk)
    }))
}

/// DELETE: remove a stored file.
async fn remove(state: AppState, req: Request) -> ApiResult<Response> {
    let path = resolve_path(&state, req.uri().path())?;
    let session = require_session(&req)?;
    state
        .authorizer
        .authorize(session, &path, Permission::Write)?;

    if path.file_name().is_none() {
        return Err(ApiError::BadRequest(
            "cannot delete a repository".to_string(),
        ));
    }
    let key = path.key();
    if state.storage.is_directory(&key).await? {
        return Err(ApiError::BadRequest(format!(
            "{path} is a directory, delete its files instead"
        )));
    }

    let size = state.writes.remove(&key).await.inspect_err(record_write_error)?;
    state.generator.invalidate_deployed(&path);
    DEPLOYS.with_label_values(&["deleted"]).inc();
    tracing::info!(alias = %session.alias(), path = %path, bytes = size, "file deleted");

    Ok(StatusCode::NO_CONTENT.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_generated_files() {
        assert_eq!(
            Generated::detect("maven-metadata.xml"),
            Some(Generated::Metadata)
        );
        assert_eq!(
            Generated::detect("maven-metadata.xml.sha256"),
            Some(Generated::Checksum(ChecksumAlgorithm::Sha256))
        );
        assert_eq!(Generated::detect("latest"), Some(Generated::Latest));
        assert_eq!(
            Generated::detect("maven-metadata.xml.md5"),
            Some(Generated::Checksum(ChecksumAlgorithm::Md5))
        );
        assert_eq!(Generated::detect("maven-metadata.xml.crc32"), None);
        assert_eq!(Generated::detect("lib-1.0.jar"), None);
    }

    #[tokio::test]
    async fn test_limited_body_flags_oversized_upload() {
        let exceeded = Arc::new(AtomicBool::new(false));
        let mut stream = limited_body(Body::from("0123456789"), 4, exceeded.clone());
        assert!(stream.next().await.unwrap().is_err());
        assert!(exceeded.load(Ordering::Relaxed));

        let exceeded = Arc::new(AtomicBool::new(false));
        let mut stream = limited_body(Body::from("0123"), 4, exceeded.clone());
        assert_eq!(stream.next().await.unwrap().unwrap(), "0123");
        assert!(!exceeded.load(Ordering::Relaxed));
    }
}
