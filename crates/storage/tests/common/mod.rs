pub mod fixtures;

#[allow(unused_imports)]
pub use fixtures::{chunked_stream, filesystem_coordinator, seeded_bytes};
