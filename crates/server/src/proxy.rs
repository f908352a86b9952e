//! Remote repository fallback with write-through caching.
//!
//! On a local miss the path is requested from each configured remote in
//! order. The first successful response is streamed to the caller and, when
//! storing is enabled, written to local storage at the same path through the
//! [`WriteCoordinator`].
//!
//! Fetches run on spawned tasks bounded by a semaphore. The handler only
//! awaits the response head; a caller that disconnects leaves the fetch and
//! its persistence running.

use crate::metrics::{PROXY_REQUESTS, record_write_error};
use axum::body::Body;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use quarry_core::RepositoryPath;
use quarry_core::config::ProxyConfig;
use quarry_maven::MetadataGenerator;
use quarry_storage::{ByteStream, StorageError, StorageResult, WriteCoordinator, WriteError};
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tracing::{Instrument, debug, info, warn};

/// Characters escaped in a remote path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Chunks buffered between the remote and each consumer.
const BODY_BUFFER: usize = 16;

/// Minimum segments below the repository: group, artifact and file.
const MIN_SEGMENTS: usize = 3;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid proxied request: {0}")]
    InvalidProxiedRequest(String),

    #[error("artifact not found in local and remote repository")]
    NotFound,

    #[error("proxy worker unavailable")]
    Unavailable,

    #[error("failed to build proxy client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Response head of a successful remote fetch; the body follows through a
/// channel fed by the fetch task.
pub struct ProxiedArtifact {
    pub remote: String,
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
    body: mpsc::Receiver<io::Result<Bytes>>,
}

impl ProxiedArtifact {
    pub fn into_body(self) -> Body {
        let mut body = self.body;
        Body::from_stream(async_stream::stream! {
            while let Some(chunk) = body.recv().await {
                yield chunk;
            }
        })
    }
}

/// Resolves local misses against remote repositories.
#[derive(Clone)]
pub struct ProxyResolver {
    client: reqwest::Client,
    remotes: Arc<[String]>,
    store: bool,
    writes: WriteCoordinator,
    generator: MetadataGenerator,
    permits: Arc<Semaphore>,
}

impl ProxyResolver {
    pub fn new(
        config: &ProxyConfig,
        writes: WriteCoordinator,
        generator: MetadataGenerator,
    ) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.read_timeout())
            .user_agent(concat!("quarry/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            remotes: config.remotes.iter().cloned().collect(),
            store: config.store,
            writes,
            generator,
            permits: Arc::new(Semaphore::new(config.max_concurrent_fetches.max(1))),
        })
    }

    pub fn remotes(&self) -> &[String] {
        &self.remotes
    }

    /// Fetch `path` from the first remote that has it.
    pub async fn resolve(&self, path: &RepositoryPath) -> Result<ProxiedArtifact, ProxyError> {
        let segments = path.segments();
        if segments.len() < MIN_SEGMENTS {
            return Err(ProxyError::InvalidProxiedRequest(path.to_string()));
        }

        let fetch = Fetch {
            client: self.client.clone(),
            remotes: self.remotes.clone(),
            relative: encode_segments(segments),
            path: path.clone(),
            persist: self
                .store
                .then(|| (self.writes.clone(), self.generator.clone())),
        };

        let (head_tx, head_rx) = oneshot::channel();
        let permits = self.permits.clone();
        tokio::spawn(
            async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    let _ = head_tx.send(Err(ProxyError::Unavailable));
                    return;
                };
                fetch.run(head_tx).await;
            }
            .instrument(tracing::Span::current()),
        );

        head_rx.await.map_err(|_| ProxyError::Unavailable)?
    }
}

/// One remote lookup, owned by its spawned task.
struct Fetch {
    client: reqwest::Client,
    remotes: Arc<[String]>,
    relative: String,
    path: RepositoryPath,
    persist: Option<(WriteCoordinator, MetadataGenerator)>,
}

impl Fetch {
    async fn run(self, head_tx: oneshot::Sender<Result<ProxiedArtifact, ProxyError>>) {
        let Some((remote, response)) = self.first_success().await else {
            PROXY_REQUESTS.with_label_values(&["miss"]).inc();
            let _ = head_tx.send(Err(ProxyError::NotFound));
            return;
        };
        PROXY_REQUESTS.with_label_values(&["hit"]).inc();

        let content_length = response.content_length();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let (body_tx, body_rx) = mpsc::channel(BODY_BUFFER);
        let head = ProxiedArtifact {
            remote,
            content_length,
            content_type,
            body: body_rx,
        };
        if head_tx.send(Ok(head)).is_err() {
            debug!(path = %self.path, "caller went away before the response head");
        }

        let upstream = response.bytes_stream();
        let Some((writes, generator)) = self.persist_target(content_length) else {
            relay(upstream, body_tx, None).await;
            return;
        };

        let key = self.path.key();
        let (store_tx, store_rx) = mpsc::channel(BODY_BUFFER);
        let (_, stored) = tokio::join!(
            relay(upstream, body_tx, Some(store_tx)),
            writes.store(&key, receiver_stream(store_rx), content_length),
        );

        match stored {
            Ok(bytes) => {
                PROXY_REQUESTS.with_label_values(&["persisted"]).inc();
                generator.invalidate_deployed(&self.path);
                info!(key, bytes, "proxied artifact stored");
            }
            Err(e @ WriteError::QuotaExceeded { .. }) => {
                record_write_error(&e);
                PROXY_REQUESTS.with_label_values(&["persist_skipped"]).inc();
                warn!(key, error = %e, "disk quota exhausted, proxied artifact not stored");
            }
            Err(e) => {
                record_write_error(&e);
                PROXY_REQUESTS.with_label_values(&["persist_failed"]).inc();
                warn!(key, error = %e, "failed to store proxied artifact");
            }
        }
    }

    async fn first_success(&self) -> Option<(String, reqwest::Response)> {
        for remote in self.remotes.iter() {
            let url = format!("{}/{}", remote.trim_end_matches('/'), self.relative);
            match self.client.get(&url).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(url, "remote hit");
                    return Some((remote.clone(), response));
                }
                Ok(response) => debug!(url, status = %response.status(), "remote miss"),
                Err(e) => warn!(url, error = %e, "remote fetch failed"),
            }
        }
        None
    }

    /// Where to persist the body, unless storing is off or the announced
    /// length already exceeds the remaining quota.
    fn persist_target(
        &self,
        content_length: Option<u64>,
    ) -> Option<(WriteCoordinator, MetadataGenerator)> {
        let (writes, generator) = self.persist.as_ref()?;
        if let Some(length) = content_length
            && !writes.quota().can_hold(length)
        {
            PROXY_REQUESTS.with_label_values(&["persist_skipped"]).inc();
            crate::metrics::QUOTA_REJECTIONS.inc();
            warn!(
                path = %self.path,
                length,
                remaining = writes.quota().remaining(),
                "disk quota exhausted, proxied artifact not stored"
            );
            return None;
        }
        Some((writes.clone(), generator.clone()))
    }
}

/// Copy the remote body to the caller and, optionally, to the local writer.
/// A consumer that hangs up is dropped; the other keeps receiving.
async fn relay<S>(
    upstream: S,
    client: mpsc::Sender<io::Result<Bytes>>,
    store: Option<mpsc::Sender<StorageResult<Bytes>>>,
) where
    S: Stream<Item = reqwest::Result<Bytes>>,
{
    let mut upstream = std::pin::pin!(upstream);
    let mut client = Some(client);
    let mut store = store;

    while let Some(chunk) = upstream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!(error = %e, "remote body failed mid-stream");
                if let Some(tx) = &client {
                    let _ = tx.send(Err(io::Error::other(e.to_string()))).await;
                }
                if let Some(tx) = &store {
                    let _ = tx
                        .send(Err(StorageError::Io(io::Error::other(e.to_string()))))
                        .await;
                }
                return;
            }
        };

        let client_gone = match &client {
            Some(tx) => tx.send(Ok(chunk.clone())).await.is_err(),
            None => false,
        };
        if client_gone {
            debug!("caller disconnected, continuing remote fetch");
            client = None;
        }

        let store_gone = match &store {
            Some(tx) => tx.send(Ok(chunk)).await.is_err(),
            None => false,
        };
        if store_gone {
            store = None;
        }

        if client.is_none() && store.is_none() {
            return;
        }
    }
}

fn receiver_stream(mut rx: mpsc::Receiver<StorageResult<Bytes>>) -> ByteStream {
    Box::pin(async_stream::stream! {
        while let Some(chunk) = rx.recv().await {
            yield chunk;
        }
    })
}

fn encode_segments(segments: &[String]) -> String {
    segments
        .iter()
        .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segments(path: &str) -> Vec<String> {
        path.split('/').map(str::to_string).collect()
    }

    #[test]
    fn test_encode_segments() {
        assert_eq!(
            encode_segments(&segments("com/example/lib/1.0/lib-1.0.jar")),
            "com/example/lib/1.0/lib-1.0.jar"
        );
        assert_eq!(
            encode_segments(&segments("g/a b/x#y?.pom")),
            "g/a%20b/x%23y%3F.pom"
        );
    }

    #[tokio::test]
    async fn test_relay_keeps_storing_after_client_disconnect() {
        let (client_tx, client_rx) = mpsc::channel(1);
        let (store_tx, mut store_rx) = mpsc::channel(8);
        drop(client_rx);

        let upstream = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"ab")),
            Ok(Bytes::from_static(b"cd")),
        ]);
        relay(upstream, client_tx, Some(store_tx)).await;

        let mut stored = Vec::new();
        while let Some(chunk) = store_rx.recv().await {
            stored.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(stored, b"abcd");
    }
}
