use bytes::Bytes;
use quarry_core::config::WriteConfig;
use quarry_storage::{ByteStream, DiskQuota, FilesystemBackend, WriteCoordinator};
use std::sync::Arc;
use tempfile::TempDir;

/// Generate deterministic test data using a seeded pseudo-random generator.
/// Same seed produces same output (reproducible tests)
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    // Simple LCG (Linear Congruential Generator)
    for chunk in data.chunks_mut(8) {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// Split `data` into a stream of `chunk_size` pieces.
pub fn chunked_stream(data: Bytes, chunk_size: usize) -> ByteStream {
    let chunks: Vec<_> = data
        .chunks(chunk_size)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    Box::pin(futures::stream::iter(chunks))
}

/// Coordinator over a fresh filesystem root with a generous retry budget.
pub async fn filesystem_coordinator(quota_limit: u64) -> (TempDir, WriteCoordinator) {
    let temp_dir = TempDir::new().unwrap();
    let backend = FilesystemBackend::new(temp_dir.path()).await.unwrap();
    let config = WriteConfig {
        lock_retry_delay_ms: 5,
        lock_max_attempts: 400,
    };
    let coordinator =
        WriteCoordinator::new(Arc::new(backend), Arc::new(DiskQuota::new(quota_limit)), &config);
    (temp_dir, coordinator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_bytes_deterministic() {
        assert_eq!(seeded_bytes(42, 100), seeded_bytes(42, 100));
        assert_ne!(seeded_bytes(42, 100), seeded_bytes(43, 100));
    }
}
