//! Server test utilities.

use super::fixtures::basic_auth;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use bytes::Bytes;
use quarry_core::config::{AppConfig, StorageConfig};
use quarry_core::token::{Permissions, Token, generate_secret, hash_secret};
use quarry_server::{AppState, create_router};
use quarry_storage::{DiskQuota, FilesystemBackend, StorageProvider};
use quarry_tokens::{MemoryTokenStore, TokenStore};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use time::OffsetDateTime;
use tower::ServiceExt;

/// Credentials of a token created for a test.
#[derive(Clone, Debug)]
pub struct Login {
    pub alias: String,
    pub secret: String,
}

/// A buffered response.
#[allow(dead_code)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[allow(dead_code)]
impl TestResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary filesystem storage.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let storage_path = temp_dir.path().join("repositories");

        let mut config = AppConfig::for_testing();
        config.storage = StorageConfig::Filesystem {
            path: storage_path.clone(),
        };
        modifier(&mut config);

        let storage: Arc<dyn StorageProvider> = Arc::new(
            FilesystemBackend::new(&storage_path)
                .await
                .expect("Failed to create storage backend"),
        );
        let quota = match config.quota.limit {
            Some(limit) => DiskQuota::from_limit(limit, None).expect("Invalid quota"),
            None => DiskQuota::unlimited(),
        };
        let tokens: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());

        let state = AppState::new(config, storage, Arc::new(quota), tokens)
            .expect("Failed to create app state");
        let router = create_router(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// Store a token and return its credentials.
    pub async fn create_token(&self, alias: &str, path: &str, permissions: Permissions) -> Login {
        let secret = generate_secret();
        let token = Token {
            alias: alias.to_string(),
            path: path.to_string(),
            permissions,
            secret_hash: hash_secret(&secret),
            created_at: OffsetDateTime::now_utc(),
        };
        self.state
            .tokens
            .create_token(&token)
            .await
            .expect("Failed to create token");
        Login {
            alias: alias.to_string(),
            secret,
        }
    }

    /// Root token with manager permission.
    pub async fn manager(&self) -> Login {
        self.create_token("operator", "/", Permissions::MANAGER).await
    }

    /// Root token allowed to deploy.
    pub async fn deployer(&self) -> Login {
        self.create_token("deployer", "/", Permissions::WRITE).await
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Body,
        login: Option<&Login>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(login) = login {
            builder = builder.header("Authorization", basic_auth(&login.alias, &login.secret));
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let request = builder.body(body).unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();

        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, login: Option<&Login>) -> TestResponse {
        self.request(Method::GET, uri, Body::empty(), login, &[]).await
    }

    pub async fn head(&self, uri: &str, login: Option<&Login>) -> TestResponse {
        self.request(Method::HEAD, uri, Body::empty(), login, &[]).await
    }

    pub async fn put(&self, uri: &str, data: impl Into<Bytes>, login: Option<&Login>) -> TestResponse {
        self.request(Method::PUT, uri, Body::from(data.into()), login, &[])
            .await
    }

    pub async fn delete(&self, uri: &str, login: Option<&Login>) -> TestResponse {
        self.request(Method::DELETE, uri, Body::empty(), login, &[])
            .await
    }

    /// Send an optional JSON body.
    pub async fn json_request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        login: Option<&Login>,
    ) -> TestResponse {
        match body {
            Some(value) => {
                let bytes = serde_json::to_vec(&value).unwrap();
                self.request(
                    method,
                    uri,
                    Body::from(bytes),
                    login,
                    &[("Content-Type", "application/json")],
                )
                .await
            }
            None => self.request(method, uri, Body::empty(), login, &[]).await,
        }
    }
}
