//! Disk quota accounting.

use quarry_core::QuotaLimit;
use std::sync::atomic::{AtomicU64, Ordering};

/// Byte budget shared by every writer.
///
/// `used` only moves through [`allocate`](Self::allocate) and
/// [`release`](Self::release), so it never exceeds `limit`.
#[derive(Debug)]
pub struct DiskQuota {
    limit: u64,
    used: AtomicU64,
}

impl DiskQuota {
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            used: AtomicU64::new(0),
        }
    }

    /// Quota for a configured limit; percentages resolve against `capacity`.
    pub fn from_limit(limit: QuotaLimit, capacity: Option<u64>) -> quarry_core::Result<Self> {
        Ok(Self::new(limit.resolve(capacity)?))
    }

    pub fn unlimited() -> Self {
        Self::new(u64::MAX)
    }

    /// Seed the counter with bytes already on disk at startup.
    pub fn with_used(self, used: u64) -> Self {
        self.used.store(used.min(self.limit), Ordering::Relaxed);
        self
    }

    /// Reserve `size` bytes. Succeeds only while `used + size < limit`.
    pub fn allocate(&self, size: u64) -> bool {
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(size).filter(|next| *next < self.limit)
            })
            .is_ok()
    }

    /// Whether `size` more bytes would currently fit.
    pub fn can_hold(&self, size: u64) -> bool {
        self.used()
            .checked_add(size)
            .is_some_and(|next| next < self.limit)
    }

    pub fn release(&self, size: u64) {
        let _ = self
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                Some(used.saturating_sub(size))
            });
    }

    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Acquire)
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.used())
    }
}
