//! Local filesystem storage backend.

use crate::error::{StorageError, StorageResult};
use crate::traits::{
    ByteStream, Entry, ObjectMeta, StorageProvider, StreamingUpload, TEMP_MARKER, is_temp_name,
};
use async_trait::async_trait;
use bytes::Bytes;
use fs2::FileExt as _;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Default chunk size for streaming reads (64 KiB).
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Local filesystem storage.
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Storage root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the full path for a key, with path traversal protection.
    ///
    /// Runs `key_path_sync` on the blocking pool since it canonicalizes
    /// and stats paths.
    async fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        let root = self.root.clone();
        let key = key.to_string();
        blocking(move || Self::key_path_sync(&root, &key)).await
    }

    /// Returns an error if the key would escape the storage root, including
    /// through symlinks.
    fn key_path_sync(root: &Path, key: &str) -> StorageResult<PathBuf> {
        if key.contains("..") || key.starts_with('/') || key.starts_with('\\') {
            return Err(StorageError::InvalidKey(format!(
                "path traversal not allowed: {key}"
            )));
        }

        for component in Path::new(key).components() {
            if !matches!(component, std::path::Component::Normal(_)) {
                return Err(StorageError::InvalidKey(format!(
                    "contains unsafe path component: {key}"
                )));
            }
        }

        let path = root.join(key);
        let root_canonical = root.canonicalize().map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to canonicalize root: {e}"),
            ))
        })?;

        // Existing paths (or dangling symlinks) must resolve inside the root.
        match std::fs::symlink_metadata(&path) {
            Ok(meta) => {
                let canonical = path.canonicalize().map_err(|e| {
                    if meta.file_type().is_symlink() {
                        StorageError::InvalidKey(format!(
                            "symlink target missing or invalid: {key}"
                        ))
                    } else {
                        StorageError::Io(e)
                    }
                })?;
                if !canonical.starts_with(&root_canonical) {
                    return Err(StorageError::InvalidKey(format!(
                        "resolved path escapes storage root: {key}"
                    )));
                }
                return Ok(path);
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(StorageError::Io(err)),
        }

        // New paths: the nearest existing ancestor must resolve inside the root,
        // otherwise create_dir_all would follow a symlinked directory out of it.
        let mut ancestor = path.as_path();
        while let Some(parent) = ancestor.parent() {
            match std::fs::symlink_metadata(parent) {
                Ok(meta) => {
                    let parent_canonical = parent.canonicalize().map_err(|e| {
                        if meta.file_type().is_symlink() {
                            StorageError::InvalidKey(format!(
                                "ancestor symlink target missing or invalid: {key}"
                            ))
                        } else {
                            StorageError::Io(e)
                        }
                    })?;
                    if !parent_canonical.starts_with(&root_canonical) {
                        return Err(StorageError::InvalidKey(format!(
                            "ancestor path escapes storage root: {key}"
                        )));
                    }
                    break;
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(StorageError::Io(err)),
            }
            ancestor = parent;
        }

        Ok(path)
    }

    /// Ensure parent directory exists.
    async fn ensure_parent(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Sibling lock file guarding writes to `path`.
    ///
    /// The name carries the temp marker so it stays out of listings and usage.
    /// Lock files are never removed, so every writer locks the same inode.
    fn lock_path(path: &Path) -> PathBuf {
        let suffix = format!("{TEMP_MARKER}lock");
        path.with_file_name(
            path.file_name()
                .map(|n| format!("{}{}", n.to_string_lossy(), suffix))
                .unwrap_or_else(|| suffix.clone()),
        )
    }

    /// Sibling temp path, unique per write.
    fn temp_path(path: &Path) -> PathBuf {
        let suffix = format!("{TEMP_MARKER}{}", Uuid::new_v4());
        path.with_file_name(
            path.file_name()
                .map(|n| format!("{}{}", n.to_string_lossy(), suffix))
                .unwrap_or_else(|| suffix.clone()),
        )
    }

    fn map_not_found(key: &str, e: std::io::Error) -> StorageError {
        if e.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(key.to_string())
        } else {
            StorageError::Io(e)
        }
    }

    fn usage_sync(root: &Path) -> std::io::Result<u64> {
        let mut total = 0u64;
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            for entry in std::fs::read_dir(&dir)? {
                let entry = entry?;
                // file_type() does not follow symlinks.
                let file_type = entry.file_type()?;
                if file_type.is_dir() {
                    stack.push(entry.path());
                } else if file_type.is_file()
                    && !is_temp_name(&entry.file_name().to_string_lossy())
                {
                    total += entry.metadata()?.len();
                }
            }
        }
        Ok(total)
    }
}

/// Run blocking filesystem work off the async runtime.
async fn blocking<T, F>(f: F) -> StorageResult<T>
where
    F: FnOnce() -> StorageResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}")))
    })?
}

#[async_trait]
impl StorageProvider for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_path(key).await?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn is_directory(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_path(key).await?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        let path = self.key_path(key).await?;
        let metadata = fs::metadata(&path)
            .await
            .map_err(|e| Self::map_not_found(key, e))?;
        if !metadata.is_file() {
            return Err(StorageError::NotFound(key.to_string()));
        }

        Ok(ObjectMeta {
            size: metadata.len(),
            last_modified: metadata.modified().ok().map(|t| t.into()),
        })
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.key_path(key).await?;
        let data = fs::read(&path)
            .await
            .map_err(|e| Self::map_not_found(key, e))?;
        Ok(Bytes::from(data))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        use tokio::io::AsyncReadExt;

        let path = self.key_path(key).await?;
        let file = fs::File::open(&path)
            .await
            .map_err(|e| Self::map_not_found(key, e))?;

        let stream = async_stream::try_stream! {
            let mut file = file;
            let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                yield Bytes::copy_from_slice(&buf[..n]);
            }
        };

        Ok(Box::pin(stream))
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let path = self.key_path(key).await?;
        self.ensure_parent(&path).await?;

        // Temp file + fsync + rename keeps readers from seeing partial content.
        let temp_path = Self::temp_path(&path);
        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
        }
        fs::rename(&temp_path, &path).await?;

        Ok(())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn open_write(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>> {
        let path = self.key_path(key).await?;
        self.ensure_parent(&path).await?;

        let lock_path = Self::lock_path(&path);
        let lock_key = key.to_string();
        let lock = blocking(move || {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .truncate(false)
                .read(true)
                .write(true)
                .open(&lock_path)?;
            match file.try_lock_exclusive() {
                Ok(()) => Ok(file),
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                    Err(StorageError::Locked(lock_key))
                }
                Err(e) => Err(StorageError::Io(e)),
            }
        })
        .await?;

        let temp_path = Self::temp_path(&path);
        let file = match fs::File::create(&temp_path).await {
            Ok(file) => file,
            Err(e) => {
                let _ = lock.unlock();
                return Err(StorageError::Io(e));
            }
        };

        Ok(Box::new(FilesystemUpload {
            file: Some(file),
            temp_path: Some(temp_path),
            final_path: path,
            lock,
            bytes_written: 0,
        }))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_path(key).await?;
        fs::remove_file(&path)
            .await
            .map_err(|e| Self::map_not_found(key, e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn list(&self, dir: &str) -> StorageResult<Vec<Entry>> {
        let path = self.key_path(dir).await?;
        let mut entries = fs::read_dir(&path)
            .await
            .map_err(|e| Self::map_not_found(dir, e))?;

        let mut results = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            // Symlinks are skipped so listings never reach outside the root.
            let file_type = entry.file_type().await?;
            if !(file_type.is_dir() || file_type.is_file()) || is_temp_name(&name) {
                continue;
            }
            let metadata = entry.metadata().await?;
            results.push(Entry {
                name,
                is_directory: file_type.is_dir(),
                size: if file_type.is_dir() { 0 } else { metadata.len() },
                last_modified: metadata.modified().ok().map(|t| t.into()),
            });
        }

        results.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(results)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn usage(&self) -> StorageResult<u64> {
        let root = self.root.clone();
        blocking(move || Self::usage_sync(&root).map_err(StorageError::Io)).await
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn capacity(&self) -> StorageResult<Option<u64>> {
        let root = self.root.clone();
        blocking(move || Ok(Some(fs2::total_space(&root)?))).await
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn health_check(&self) -> StorageResult<()> {
        let metadata = fs::metadata(&self.root).await.map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("storage root not accessible: {e}"),
            ))
        })?;

        if !metadata.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                format!("storage root is not a directory: {:?}", self.root),
            )));
        }

        Ok(())
    }
}

/// Streaming upload holding an exclusive lock on the destination's sidecar
/// lock file.
///
/// Data goes to a sibling temp file that replaces the destination on finish,
/// so the destination never exists in a partial state. The lock is released
/// when the upload is dropped.
struct FilesystemUpload {
    file: Option<fs::File>,
    temp_path: Option<PathBuf>,
    final_path: PathBuf,
    lock: std::fs::File,
    bytes_written: u64,
}

impl FilesystemUpload {
    fn file(&mut self) -> StorageResult<&mut fs::File> {
        self.file.as_mut().ok_or_else(|| {
            StorageError::Io(std::io::Error::other("upload already finished"))
        })
    }
}

#[async_trait]
impl StreamingUpload for FilesystemUpload {
    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        self.file()?.write_all(&data).await?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> StorageResult<u64> {
        if let Some(file) = self.file.take() {
            file.sync_all().await?;
        }
        if let Some(temp_path) = self.temp_path.take()
            && let Err(e) = fs::rename(&temp_path, &self.final_path).await
        {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::Io(e));
        }
        let _ = self.lock.unlock();
        Ok(self.bytes_written)
    }

    async fn abort(mut self: Box<Self>) -> StorageResult<()> {
        self.file.take();
        if let Some(temp_path) = self.temp_path.take() {
            let _ = fs::remove_file(&temp_path).await;
        }
        let _ = self.lock.unlock();
        Ok(())
    }
}

impl Drop for FilesystemUpload {
    fn drop(&mut self) {
        // Dropped without finish or abort: discard the partial temp file.
        if let Some(temp_path) = self.temp_path.take() {
            self.file.take();
            let _ = std::fs::remove_file(temp_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();

        let key = "releases/com/example/lib/1.0/lib-1.0.pom";
        let data = Bytes::from("<project/>");

        backend.put(key, data.clone()).await.unwrap();
        assert!(backend.exists(key).await.unwrap());
        assert!(
            backend
                .is_directory("releases/com/example/lib")
                .await
                .unwrap()
        );
        assert!(!backend.exists("releases/com/example/lib").await.unwrap());

        let retrieved = backend.get(key).await.unwrap();
        assert_eq!(retrieved, data);

        let meta = backend.head(key).await.unwrap();
        assert_eq!(meta.size, data.len() as u64);
        assert!(meta.last_modified.is_some());
    }

    #[tokio::test]
    async fn test_streaming_read() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();
        let data = vec![7u8; STREAM_CHUNK_SIZE * 2 + 10];
        backend
            .put("big.bin", Bytes::from(data.clone()))
            .await
            .unwrap();

        let mut stream = backend.get_stream("big.bin").await.unwrap();
        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(collected, data);
    }

    #[tokio::test]
    async fn test_list_direct_children_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();
        backend.put("repo/lib/2.0/a.jar", Bytes::from("a")).await.unwrap();
        backend.put("repo/lib/1.0/a.jar", Bytes::from("a")).await.unwrap();
        backend
            .put("repo/lib/maven-metadata.xml", Bytes::from("xml"))
            .await
            .unwrap();

        let entries = backend.list("repo/lib").await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["1.0", "2.0", "maven-metadata.xml"]);
        assert!(entries[0].is_directory);
        assert!(!entries[2].is_directory);
        assert_eq!(entries[2].size, 3);

        assert!(matches!(
            backend.list("repo/missing").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_open_write_replaces_on_finish() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();
        backend.put("repo/file", Bytes::from("old")).await.unwrap();

        let mut upload = backend.open_write("repo/file").await.unwrap();
        upload.write(Bytes::from("new ")).await.unwrap();
        upload.write(Bytes::from("content")).await.unwrap();

        // Temp files stay out of listings while the write is in flight.
        let names: Vec<_> = backend
            .list("repo")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, ["file"]);
        assert_eq!(backend.get("repo/file").await.unwrap(), Bytes::from("old"));

        assert_eq!(upload.finish().await.unwrap(), 11);
        assert_eq!(
            backend.get("repo/file").await.unwrap(),
            Bytes::from("new content")
        );
    }

    #[tokio::test]
    async fn test_open_write_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();

        let first = backend.open_write("repo/locked").await.unwrap();
        match backend.open_write("repo/locked").await {
            Err(StorageError::Locked(key)) => assert_eq!(key, "repo/locked"),
            Err(other) => panic!("expected Locked, got {other:?}"),
            Ok(_) => panic!("expected Locked, got an upload"),
        }

        first.abort().await.unwrap();
        let second = backend.open_write("repo/locked").await.unwrap();
        second.abort().await.unwrap();
    }

    #[tokio::test]
    async fn test_new_file_is_invisible_until_finish() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();
        backend.put("repo/other", Bytes::from("x")).await.unwrap();

        let mut upload = backend.open_write("repo/new.jar").await.unwrap();
        upload.write(Bytes::from("partial")).await.unwrap();

        assert!(!backend.exists("repo/new.jar").await.unwrap());
        assert!(matches!(
            backend.head("repo/new.jar").await,
            Err(StorageError::NotFound(_))
        ));
        let names: Vec<_> = backend
            .list("repo")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, ["other"]);
        assert_eq!(backend.usage().await.unwrap(), 1);

        assert_eq!(upload.finish().await.unwrap(), 7);
        assert_eq!(
            backend.get("repo/new.jar").await.unwrap(),
            Bytes::from("partial")
        );
    }

    #[tokio::test]
    async fn test_abort_leaves_no_file_and_keeps_existing() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();

        let mut upload = backend.open_write("repo/new").await.unwrap();
        upload.write(Bytes::from("partial")).await.unwrap();
        upload.abort().await.unwrap();
        assert!(!backend.exists("repo/new").await.unwrap());

        backend.put("repo/existing", Bytes::from("keep")).await.unwrap();
        let mut upload = backend.open_write("repo/existing").await.unwrap();
        upload.write(Bytes::from("discard")).await.unwrap();
        upload.abort().await.unwrap();
        assert_eq!(
            backend.get("repo/existing").await.unwrap(),
            Bytes::from("keep")
        );
        assert_eq!(backend.list("repo").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_usage_and_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();
        backend.put("a/b/c", Bytes::from("12345")).await.unwrap();
        backend.put("a/d", Bytes::from("123")).await.unwrap();

        assert_eq!(backend.usage().await.unwrap(), 8);
        assert!(backend.capacity().await.unwrap().is_some_and(|c| c > 0));
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();

        assert!(backend.exists("../escape").await.is_err());
        assert!(backend.exists("/absolute/path").await.is_err());
        assert!(backend.exists("foo/../bar").await.is_err());
        assert!(backend.open_write("../escape").await.is_err());

        assert!(backend.exists("valid/nested/key").await.is_ok());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_symlink_traversal_rejected() {
        use std::os::unix::fs::symlink;

        let dir = tempfile::tempdir().unwrap();
        let outside_dir = tempfile::tempdir().unwrap();
        let outside_file = outside_dir.path().join("secret.txt");
        std::fs::write(&outside_file, "secret data").unwrap();

        let backend = FilesystemBackend::new(dir.path()).await.unwrap();
        symlink(&outside_file, dir.path().join("malicious_link")).unwrap();

        match backend.get("malicious_link").await {
            Err(StorageError::InvalidKey(msg)) => assert!(msg.contains("escapes storage root")),
            other => panic!("expected InvalidKey error, got: {other:?}"),
        }

        symlink(outside_dir.path(), dir.path().join("escape")).unwrap();
        let result = backend
            .put("escape/nested/deep/file.txt", Bytes::from("data"))
            .await;
        assert!(result.is_err(), "ancestor symlink traversal should be rejected");
        assert!(!outside_dir.path().join("nested").exists());

        // Symlinks never show up in listings.
        let names: Vec<_> = backend
            .list("")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert!(names.is_empty());
    }
}
