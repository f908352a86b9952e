//! Test fixtures for generating test data.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;

/// Generate deterministic test data based on a seed.
#[allow(dead_code)]
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    for chunk in data.chunks_mut(8) {
        // Simple LCG for deterministic data
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// `Authorization` header value for Basic credentials.
#[allow(dead_code)]
pub fn basic_auth(alias: &str, secret: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{alias}:{secret}")))
}

/// Request path of a file in a release version directory:
/// `/{repository}/com/example/{artifact}/{version}/{artifact}-{version}.{extension}`.
#[allow(dead_code)]
pub fn artifact_path(repository: &str, artifact: &str, version: &str, extension: &str) -> String {
    format!("/{repository}/com/example/{artifact}/{version}/{artifact}-{version}.{extension}")
}

/// Minimal POM for an artifact.
#[allow(dead_code)]
pub fn pom(artifact: &str, version: &str) -> Bytes {
    Bytes::from(format!(
        "<project><modelVersion>4.0.0</modelVersion>\
         <groupId>com.example</groupId><artifactId>{artifact}</artifactId>\
         <version>{version}</version></project>"
    ))
}
