//! Maven metadata document model and its XML wire format.

use crate::error::MavenResult;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesText, Event};
use std::io::{Cursor, Write};
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

/// `yyyyMMddHHmmss`, the timestamp format of `lastUpdated` and `updated`.
const MAVEN_TIMESTAMP: &[FormatItem<'static>] =
    format_description!("[year][month][day][hour][minute][second]");

/// Format a time as a Maven metadata timestamp in UTC.
pub fn format_timestamp(at: OffsetDateTime) -> String {
    at.to_offset(UtcOffset::UTC)
        .format(MAVEN_TIMESTAMP)
        .unwrap_or_default()
}

/// A `maven-metadata.xml` document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetadataDocument {
    pub group_id: String,
    pub artifact_id: String,
    /// Set for build metadata of a single version directory.
    pub version: Option<String>,
    pub versioning: Versioning,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Versioning {
    pub release: Option<String>,
    pub latest: Option<String>,
    pub versions: Vec<String>,
    pub snapshot: Option<Snapshot>,
    pub snapshot_versions: Vec<SnapshotVersion>,
    /// `yyyyMMddHHmmss`
    pub last_updated: String,
}

/// Timestamp and build number of the newest snapshot build.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub timestamp: String,
    pub build_number: u32,
}

/// Newest build of one classifier/extension pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotVersion {
    pub classifier: Option<String>,
    pub extension: String,
    /// `{baseVersion}-{timestamp}-{buildNumber}`
    pub value: String,
    /// `yyyyMMddHHmmss`
    pub updated: String,
}

impl MetadataDocument {
    /// Serialize to indented XML with a UTF-8 declaration.
    pub fn to_xml(&self) -> MavenResult<String> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        writer
            .create_element("metadata")
            .write_inner_content(|w| self.write_body(w))?;

        let bytes = writer.into_inner().into_inner();
        // Every piece written above is a &str, so the buffer is valid UTF-8.
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn write_body<W: Write>(&self, w: &mut Writer<W>) -> quick_xml::Result<()> {
        text_element(w, "groupId", &self.group_id)?;
        text_element(w, "artifactId", &self.artifact_id)?;
        if let Some(version) = &self.version {
            text_element(w, "version", version)?;
        }
        w.create_element("versioning")
            .write_inner_content(|w| self.versioning.write(w))?;
        Ok(())
    }
}

impl Versioning {
    fn write<W: Write>(&self, w: &mut Writer<W>) -> quick_xml::Result<()> {
        if let Some(release) = &self.release {
            text_element(w, "release", release)?;
        }
        if let Some(latest) = &self.latest {
            text_element(w, "latest", latest)?;
        }
        if !self.versions.is_empty() {
            w.create_element("versions").write_inner_content(|w| {
                for version in &self.versions {
                    text_element(w, "version", version)?;
                }
                Ok::<(), quick_xml::Error>(())
            })?;
        }
        if let Some(snapshot) = &self.snapshot {
            w.create_element("snapshot").write_inner_content(|w| {
                text_element(w, "timestamp", &snapshot.timestamp)?;
                text_element(w, "buildNumber", &snapshot.build_number.to_string())
            })?;
        }
        if !self.snapshot_versions.is_empty() {
            w.create_element("snapshotVersions").write_inner_content(|w| {
                for entry in &self.snapshot_versions {
                    w.create_element("snapshotVersion").write_inner_content(|w| {
                        if let Some(classifier) = &entry.classifier {
                            text_element(w, "classifier", classifier)?;
                        }
                        text_element(w, "extension", &entry.extension)?;
                        text_element(w, "value", &entry.value)?;
                        text_element(w, "updated", &entry.updated)
                    })?;
                }
                Ok::<(), quick_xml::Error>(())
            })?;
        }
        text_element(w, "lastUpdated", &self.last_updated)
    }
}

fn text_element<W: Write>(w: &mut Writer<W>, name: &str, value: &str) -> quick_xml::Result<()> {
    w.create_element(name)
        .write_text_content(BytesText::new(value))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_format_timestamp_uses_utc() {
        assert_eq!(
            format_timestamp(datetime!(2024-03-05 07:08:09 +02:00)),
            "20240305050809"
        );
    }

    #[test]
    fn test_artifact_metadata_xml() {
        let document = MetadataDocument {
            group_id: "com.example".to_string(),
            artifact_id: "lib".to_string(),
            version: None,
            versioning: Versioning {
                release: Some("2.0".to_string()),
                latest: Some("2.0".to_string()),
                versions: vec!["1.0".to_string(), "2.0".to_string()],
                last_updated: "20240101000000".to_string(),
                ..Default::default()
            },
        };

        let xml = document.to_xml().unwrap();
        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(xml.contains("<groupId>com.example</groupId>"));
        assert!(xml.contains("<release>2.0</release>"));
        assert!(xml.contains("<version>1.0</version>"));
        assert!(xml.contains("<lastUpdated>20240101000000</lastUpdated>"));
        assert!(!xml.contains("<snapshot>"));
        assert!(xml.find("<version>1.0</version>") < xml.find("<version>2.0</version>"));
    }

    #[test]
    fn test_snapshot_metadata_xml() {
        let document = MetadataDocument {
            group_id: "g".to_string(),
            artifact_id: "a".to_string(),
            version: Some("1.0-SNAPSHOT".to_string()),
            versioning: Versioning {
                snapshot: Some(Snapshot {
                    timestamp: "20240101.120000".to_string(),
                    build_number: 3,
                }),
                snapshot_versions: vec![SnapshotVersion {
                    classifier: Some("sources".to_string()),
                    extension: "jar".to_string(),
                    value: "1.0-20240101.120000-3".to_string(),
                    updated: "20240101120000".to_string(),
                }],
                last_updated: "20240101120000".to_string(),
                ..Default::default()
            },
        };

        let xml = document.to_xml().unwrap();
        assert!(xml.contains("<version>1.0-SNAPSHOT</version>"));
        assert!(xml.contains("<buildNumber>3</buildNumber>"));
        assert!(xml.contains("<classifier>sources</classifier>"));
        assert!(xml.contains("<value>1.0-20240101.120000-3</value>"));
        assert!(!xml.contains("<versions>"));
    }

    #[test]
    fn test_text_is_escaped() {
        let document = MetadataDocument {
            group_id: "a&b".to_string(),
            artifact_id: "<lib>".to_string(),
            ..Default::default()
        };
        let xml = document.to_xml().unwrap();
        assert!(xml.contains("<groupId>a&amp;b</groupId>"));
        assert!(xml.contains("<artifactId>&lt;lib&gt;</artifactId>"));
    }
}
