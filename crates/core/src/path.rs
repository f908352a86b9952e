//! Request path parsing and artifact coordinates.

use std::fmt;

/// A validated path inside a repository: `{repository}/{segments...}`.
///
/// Paths never contain empty, `.` or `..` segments, so joining the segments
/// always yields a key below the repository root.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RepositoryPath {
    repository: String,
    segments: Vec<String>,
}

impl RepositoryPath {
    /// Parse a raw request path such as `/releases/com/example/lib/1.0/lib-1.0.jar`.
    ///
    /// A single leading and trailing slash are ignored. The first segment is
    /// the repository name.
    pub fn parse(raw: &str) -> crate::Result<Self> {
        let mut segments = split_segments(raw)?;
        if segments.is_empty() {
            return Err(crate::Error::InvalidPath(
                "path must name a repository".to_string(),
            ));
        }
        let repository = segments.remove(0);
        Ok(Self {
            repository,
            segments,
        })
    }

    /// Build from a repository name and already-validated segments.
    pub fn new(repository: impl Into<String>, segments: Vec<String>) -> crate::Result<Self> {
        let repository = repository.into();
        validate_segment(&repository)?;
        for segment in &segments {
            validate_segment(segment)?;
        }
        Ok(Self {
            repository,
            segments,
        })
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Segments below the repository.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Last segment, if any.
    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Storage key: `repository/seg/seg/...`.
    pub fn key(&self) -> String {
        if self.segments.is_empty() {
            return self.repository.clone();
        }
        format!("{}/{}", self.repository, self.segments.join("/"))
    }

    /// Absolute request path: `/repository/seg/...`.
    pub fn absolute(&self) -> String {
        format!("/{}", self.key())
    }

    /// The parent path, or `None` at the repository root.
    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        let mut segments = self.segments.clone();
        segments.pop();
        Some(Self {
            repository: self.repository.clone(),
            segments,
        })
    }

    /// A child path.
    pub fn join(&self, segment: &str) -> crate::Result<Self> {
        validate_segment(segment)?;
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Ok(Self {
            repository: self.repository.clone(),
            segments,
        })
    }

    /// Prepend a repository, turning the current repository name into the
    /// first segment.
    pub fn prepend_repository(self, repository: &str) -> Self {
        let mut segments = Vec::with_capacity(self.segments.len() + 1);
        segments.push(self.repository);
        segments.extend(self.segments);
        Self {
            repository: repository.to_string(),
            segments,
        }
    }
}

impl fmt::Display for RepositoryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.key())
    }
}

/// Split a raw path into validated segments.
pub fn split_segments(raw: &str) -> crate::Result<Vec<String>> {
    let trimmed = raw.strip_prefix('/').unwrap_or(raw);
    let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    trimmed
        .split('/')
        .map(|segment| {
            validate_segment(segment)?;
            Ok(segment.to_string())
        })
        .collect()
}

fn validate_segment(segment: &str) -> crate::Result<()> {
    if segment.is_empty() {
        return Err(crate::Error::InvalidPath(
            "empty path segment".to_string(),
        ));
    }
    if segment == "." || segment == ".." {
        return Err(crate::Error::PathTraversal(segment.to_string()));
    }
    if segment.contains(['\\', '/', '\0']) {
        return Err(crate::Error::InvalidPath(format!(
            "invalid characters in path segment: {segment:?}"
        )));
    }
    Ok(())
}

/// Group/artifact/version coordinate of a file inside a repository.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactCoordinate {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    pub file_name: String,
}

impl ArtifactCoordinate {
    /// Parse from segments below the repository:
    /// `{group...}/{artifactId}/{version}/{file}`.
    pub fn from_segments(segments: &[String]) -> crate::Result<Self> {
        let [group @ .., artifact_id, version, file_name] = segments else {
            return Err(crate::Error::InvalidCoordinate(format!(
                "expected group/artifact/version/file, got '{}'",
                segments.join("/")
            )));
        };
        if group.is_empty() {
            return Err(crate::Error::InvalidCoordinate(format!(
                "missing group id in '{}'",
                segments.join("/")
            )));
        }
        Ok(Self {
            group_id: group.join("."),
            artifact_id: artifact_id.clone(),
            version: version.clone(),
            file_name: file_name.clone(),
        })
    }

    /// Whether the version is a snapshot.
    pub fn is_snapshot(&self) -> bool {
        self.version.ends_with("-SNAPSHOT")
    }
}

impl fmt::Display for ArtifactCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group_id, self.artifact_id, self.version)
    }
}
