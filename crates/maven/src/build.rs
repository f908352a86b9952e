//! Build files inside a version directory.
//!
//! A build file is named `{artifactId}-{version}[-{classifier}].{extension}`.
//! Timestamped snapshot builds replace the `-SNAPSHOT` suffix of the version
//! with `-{timestamp}-{buildNumber}`.

use quarry_core::{IGNORED_CHECKSUM_EXTENSIONS, METADATA_FILE};
use quarry_storage::traits::is_temp_name;

const SNAPSHOT_SUFFIX: &str = "-SNAPSHOT";

/// Whether a file in a version directory is a build of `artifact_id`.
pub fn is_build_file(name: &str, artifact_id: &str) -> bool {
    let metadata_stem = METADATA_FILE.trim_end_matches(".xml");
    name.strip_prefix(artifact_id)
        .is_some_and(|rest| rest.starts_with('-'))
        && !name.starts_with(metadata_stem)
        && !is_temp_name(name)
        && !name
            .rsplit_once('.')
            .is_some_and(|(_, ext)| IGNORED_CHECKSUM_EXTENSIONS.contains(&ext))
}

/// `1.0-SNAPSHOT` → `1.0`; release versions are returned unchanged.
pub fn base_version(version: &str) -> &str {
    version.strip_suffix(SNAPSHOT_SUFFIX).unwrap_or(version)
}

/// A parsed build file name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildFile {
    pub classifier: Option<String>,
    pub extension: String,
    /// Set when the file is a timestamped snapshot build.
    pub stamp: Option<BuildStamp>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildStamp {
    pub timestamp: String,
    pub build_number: u32,
}

impl BuildFile {
    /// Parse `name` as a build of `artifact_id` in the `version` directory.
    pub fn parse(name: &str, artifact_id: &str, version: &str) -> Option<Self> {
        let rest = name.strip_prefix(artifact_id)?.strip_prefix('-')?;
        let (stem, extension) = rest.rsplit_once('.')?;
        if extension.is_empty() {
            return None;
        }
        let extension = extension.to_string();

        // Plain build: `{version}[-{classifier}]`.
        if let Some(identifier) = stem.strip_prefix(version) {
            return match identifier {
                "" => Some(Self {
                    classifier: None,
                    extension,
                    stamp: None,
                }),
                _ => identifier.strip_prefix('-').map(|classifier| Self {
                    classifier: Some(classifier.to_string()),
                    extension,
                    stamp: None,
                }),
            };
        }

        // Timestamped build: `{baseVersion}-{timestamp}-{buildNumber}[-{classifier}]`.
        let identifier = stem
            .strip_prefix(base_version(version))?
            .strip_prefix('-')?;
        let mut parts = identifier.splitn(3, '-');
        let timestamp = parts.next().filter(|t| is_timestamp(t))?;
        let build_number = parts.next()?.parse().ok()?;
        let classifier = parts.next().map(str::to_string);

        Some(Self {
            classifier,
            extension,
            stamp: Some(BuildStamp {
                timestamp: timestamp.to_string(),
                build_number,
            }),
        })
    }
}

fn is_timestamp(token: &str) -> bool {
    token.bytes().any(|b| b.is_ascii_digit())
        && token.bytes().all(|b| b.is_ascii_digit() || b == b'.')
}
