//! Metadata generation from the stored directory layout.

use crate::build::{BuildFile, base_version, is_build_file};
use crate::cache::MetadataCache;
use crate::checksum::ChecksumAlgorithm;
use crate::document::{MetadataDocument, Snapshot, SnapshotVersion, Versioning, format_timestamp};
use crate::error::{MavenError, MavenResult};
use bytes::Bytes;
use quarry_core::version::{compare_names, most_relevant};
use quarry_core::{METADATA_FILE, RepositoryPath};
use quarry_storage::{Entry, StorageProvider, WriteCoordinator};
use std::collections::HashSet;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, instrument, warn};

/// Builds `maven-metadata.xml` documents and keeps them cached until a write
/// under the artifact invalidates them.
///
/// Concurrent first requests for the same uncached document may each
/// regenerate it. A generation that raced with an invalidation of its
/// document is returned to its caller but neither cached nor persisted.
#[derive(Clone)]
pub struct MetadataGenerator {
    storage: Arc<dyn StorageProvider>,
    writes: WriteCoordinator,
    cache: Arc<MetadataCache>,
}

impl MetadataGenerator {
    pub fn new(writes: WriteCoordinator, cache: Arc<MetadataCache>) -> Self {
        Self {
            storage: writes.storage().clone(),
            writes,
            cache,
        }
    }

    pub fn cache(&self) -> &Arc<MetadataCache> {
        &self.cache
    }

    /// Generate (or fetch from cache) the document at
    /// `{repository}/{segments...}`, whose last segment must be
    /// `maven-metadata.xml`.
    #[instrument(skip(self, segments), fields(path = %segments.join("/")))]
    pub async fn generate(&self, repository: &str, segments: &[String]) -> MavenResult<Arc<str>> {
        let dir_segments = match segments {
            [dir @ .., file] if file == METADATA_FILE && segments.len() >= 3 => dir,
            _ => {
                return Err(MavenError::BadRequest(format!(
                    "not a metadata file below an artifact: {}",
                    segments.join("/")
                )));
            }
        };

        let key = storage_key(repository, segments);
        if let Some(cached) = self.cache.get(&key) {
            debug!(key, "metadata cache hit");
            return Ok(cached);
        }

        let ticket = self.cache.ticket(&key);
        let dir = storage_key(repository, dir_segments);
        let entries = self
            .storage
            .list(&dir)
            .await
            .map_err(|e| MavenError::from_listing(&dir, e))?;

        let document = if entries.iter().any(|entry| entry.is_directory) {
            artifact_metadata(dir_segments, &entries)
        } else {
            build_metadata(&dir, dir_segments, &entries)?
        };

        let xml: Arc<str> = Arc::from(document.to_xml()?);
        if !self.cache.is_current(&key, ticket) {
            debug!(key, "metadata invalidated during generation, not cached");
            return Ok(xml);
        }
        self.persist(&key, &xml).await;
        if !self.cache.insert(key.clone(), xml.clone(), ticket) {
            debug!(key, "metadata invalidated during generation, not cached");
        }
        Ok(xml)
    }

    /// Checksum of the generated document at `{repository}/{segments...}`.
    pub async fn generate_checksum(
        &self,
        repository: &str,
        segments: &[String],
        algorithm: ChecksumAlgorithm,
    ) -> MavenResult<String> {
        let document = self.generate(repository, segments).await?;
        Ok(algorithm.digest(document.as_bytes()))
    }

    /// Most relevant version directory under an artifact directory.
    #[instrument(skip(self, segments), fields(path = %segments.join("/")))]
    pub async fn latest_version(&self, repository: &str, segments: &[String]) -> MavenResult<String> {
        let dir = storage_key(repository, segments);
        let entries = self
            .storage
            .list(&dir)
            .await
            .map_err(|e| MavenError::from_listing(&dir, e))?;

        most_relevant(
            entries
                .iter()
                .filter(|entry| entry.is_directory)
                .map(|entry| entry.name.as_str()),
        )
        .map(str::to_string)
        .ok_or_else(|| MavenError::NotFound(format!("no versions under {dir}")))
    }

    /// Drop the cached document stored under `key`.
    pub fn invalidate(&self, key: &str) -> bool {
        self.cache.remove(key)
    }

    /// Drop the documents a write to `path` can change: those of the file's
    /// version directory and of its artifact directory.
    pub fn invalidate_deployed(&self, path: &RepositoryPath) -> usize {
        let mut removed = 0;
        let mut dir = path.parent();
        for _ in 0..2 {
            let Some(current) = dir else { break };
            if let Ok(metadata) = current.join(METADATA_FILE)
                && self.cache.remove(&metadata.key())
            {
                removed += 1;
            }
            dir = current.parent();
        }
        if removed > 0 {
            debug!(path = %path, removed, "metadata cache invalidated");
        }
        removed
    }

    /// Clear the whole cache. Returns the number of dropped documents.
    pub fn purge(&self) -> usize {
        self.cache.clear()
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    async fn persist(&self, key: &str, xml: &str) {
        let document = Bytes::copy_from_slice(xml.as_bytes());
        if let Err(e) = self.writes.store_bytes(key, document).await {
            warn!(key, error = %e, "failed to persist metadata");
            return;
        }

        for algorithm in ChecksumAlgorithm::ALL {
            let checksum_key = format!("{key}.{}", algorithm.extension());
            let digest = Bytes::from(algorithm.digest(xml.as_bytes()));
            if let Err(e) = self.writes.store_bytes(&checksum_key, digest).await {
                warn!(key = checksum_key, error = %e, "failed to persist metadata checksum");
            }
        }
    }
}

fn storage_key(repository: &str, segments: &[String]) -> String {
    if segments.is_empty() {
        return repository.to_string();
    }
    format!("{repository}/{}", segments.join("/"))
}

fn timestamp_of(entry: &Entry) -> String {
    format_timestamp(entry.last_modified.unwrap_or_else(OffsetDateTime::now_utc))
}

/// Metadata of an artifact directory listing its version directories.
fn artifact_metadata(dir_segments: &[String], entries: &[Entry]) -> MetadataDocument {
    let (artifact_id, group) = match dir_segments.split_last() {
        Some((artifact_id, group)) => (artifact_id.clone(), group.join(".")),
        None => (String::new(), String::new()),
    };

    let versions: Vec<&Entry> = entries.iter().filter(|entry| entry.is_directory).collect();
    let latest = versions
        .iter()
        .copied()
        .min_by(|a, b| compare_names(&a.name, &b.name));

    MetadataDocument {
        group_id: group,
        artifact_id,
        version: None,
        versioning: Versioning {
            release: latest.map(|entry| entry.name.clone()),
            latest: latest.map(|entry| entry.name.clone()),
            versions: versions.iter().map(|entry| entry.name.clone()).collect(),
            last_updated: latest.map(timestamp_of).unwrap_or_default(),
            ..Default::default()
        },
    }
}

/// Metadata of a single version directory, derived from its build files.
fn build_metadata(
    dir: &str,
    dir_segments: &[String],
    entries: &[Entry],
) -> MavenResult<MetadataDocument> {
    let [group @ .., artifact_id, version] = dir_segments else {
        return Err(MavenError::BuildsNotFound(dir.to_string()));
    };
    if group.is_empty() {
        return Err(MavenError::BuildsNotFound(dir.to_string()));
    }

    let mut candidates: Vec<&Entry> = entries
        .iter()
        .filter(|entry| !entry.is_directory && is_build_file(&entry.name, artifact_id))
        .collect();
    candidates.sort_by(|a, b| compare_names(&a.name, &b.name));

    let builds: Vec<(&Entry, BuildFile)> = candidates
        .into_iter()
        .filter_map(|entry| {
            BuildFile::parse(&entry.name, artifact_id, version).map(|build| (entry, build))
        })
        .collect();

    let Some((newest_entry, newest)) = builds.first() else {
        return Err(MavenError::BuildsNotFound(dir.to_string()));
    };
    let last_updated = timestamp_of(newest_entry);

    let versioning = match &newest.stamp {
        Some(stamp) => {
            let base = base_version(version);
            let mut seen = HashSet::new();
            let snapshot_versions = builds
                .iter()
                .filter_map(|(entry, build)| {
                    let stamp = build.stamp.as_ref()?;
                    seen.insert((build.classifier.clone(), build.extension.clone()))
                        .then(|| SnapshotVersion {
                            classifier: build.classifier.clone(),
                            extension: build.extension.clone(),
                            value: format!("{base}-{}-{}", stamp.timestamp, stamp.build_number),
                            updated: timestamp_of(entry),
                        })
                })
                .collect();

            Versioning {
                snapshot: Some(Snapshot {
                    timestamp: stamp.timestamp.clone(),
                    build_number: stamp.build_number,
                }),
                snapshot_versions,
                last_updated,
                ..Default::default()
            }
        }
        None => Versioning {
            release: Some(version.clone()),
            latest: Some(version.clone()),
            versions: vec![version.clone()],
            last_updated,
            ..Default::default()
        },
    };

    Ok(MetadataDocument {
        group_id: group.join("."),
        artifact_id: artifact_id.clone(),
        version: Some(version.clone()),
        versioning,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn file(name: &str, at: OffsetDateTime) -> Entry {
        Entry {
            name: name.to_string(),
            is_directory: false,
            size: 1,
            last_modified: Some(at),
        }
    }

    fn dir(name: &str, at: OffsetDateTime) -> Entry {
        Entry {
            name: name.to_string(),
            is_directory: true,
            size: 0,
            last_modified: Some(at),
        }
    }

    fn segments(path: &str) -> Vec<String> {
        path.split('/').map(str::to_string).collect()
    }

    #[test]
    fn test_artifact_metadata_picks_most_relevant() {
        let entries = vec![
            dir("1.0", datetime!(2024-01-01 0:00 UTC)),
            dir("1.10", datetime!(2024-02-01 0:00 UTC)),
            dir("1.9", datetime!(2024-03-01 0:00 UTC)),
            file("maven-metadata.xml", datetime!(2024-04-01 0:00 UTC)),
        ];
        let document = artifact_metadata(&segments("com/example/lib"), &entries);

        assert_eq!(document.group_id, "com.example");
        assert_eq!(document.artifact_id, "lib");
        assert_eq!(document.versioning.latest.as_deref(), Some("1.10"));
        assert_eq!(document.versioning.release.as_deref(), Some("1.10"));
        assert_eq!(document.versioning.versions, ["1.0", "1.10", "1.9"]);
        assert_eq!(document.versioning.last_updated, "20240201000000");
    }

    #[test]
    fn test_snapshot_build_metadata() {
        let entries = vec![
            file("lib-1.0-20240101.120000-1.jar", datetime!(2024-01-01 12:00 UTC)),
            file("lib-1.0-20240102.120000-2.jar", datetime!(2024-01-02 12:00 UTC)),
            file("lib-1.0-20240102.120000-2.pom", datetime!(2024-01-02 12:00:01 UTC)),
            file("lib-1.0-20240102.120000-2-sources.jar", datetime!(2024-01-02 12:00:02 UTC)),
            file("lib-1.0-20240102.120000-2.jar.sha1", datetime!(2024-01-02 12:00 UTC)),
            file("maven-metadata.xml", datetime!(2024-01-03 0:00 UTC)),
        ];
        let document = build_metadata(
            "snapshots/com/example/lib/1.0-SNAPSHOT",
            &segments("com/example/lib/1.0-SNAPSHOT"),
            &entries,
        )
        .unwrap();

        assert_eq!(document.version.as_deref(), Some("1.0-SNAPSHOT"));
        let versioning = &document.versioning;
        assert_eq!(
            versioning.snapshot,
            Some(Snapshot {
                timestamp: "20240102.120000".to_string(),
                build_number: 2,
            })
        );
        let pairs: Vec<_> = versioning
            .snapshot_versions
            .iter()
            .map(|v| (v.classifier.as_deref(), v.extension.as_str(), v.value.as_str()))
            .collect();
        assert_eq!(
            pairs,
            [
                (None, "jar", "1.0-20240102.120000-2"),
                (None, "pom", "1.0-20240102.120000-2"),
                (Some("sources"), "jar", "1.0-20240102.120000-2"),
            ]
        );
        assert!(versioning.versions.is_empty());
        assert_eq!(versioning.last_updated, "20240102120000");
    }

    #[test]
    fn test_release_build_metadata_is_fake_snapshot() {
        let entries = vec![
            file("lib-2.0.jar", datetime!(2024-05-01 8:30 UTC)),
            file("lib-2.0.pom", datetime!(2024-05-01 8:29 UTC)),
        ];
        let document =
            build_metadata("releases/g/lib/2.0", &segments("g/lib/2.0"), &entries).unwrap();

        assert_eq!(document.versioning.snapshot, None);
        assert_eq!(document.versioning.release.as_deref(), Some("2.0"));
        assert_eq!(document.versioning.latest.as_deref(), Some("2.0"));
        assert_eq!(document.versioning.versions, ["2.0"]);
        assert_eq!(document.versioning.last_updated, "20240501083000");
    }

    #[test]
    fn test_build_metadata_without_builds() {
        let entries = vec![file("notes.txt", datetime!(2024-01-01 0:00 UTC))];
        let err = build_metadata("releases/g/lib/2.0", &segments("g/lib/2.0"), &entries)
            .unwrap_err();
        assert!(matches!(err, MavenError::BuildsNotFound(_)));
    }
}
