pub mod storage;

#[allow(unused_imports)]
pub use storage::{TestRepository, YieldingBackend, segments};
