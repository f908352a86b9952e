//! Metadata document cache.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Serialized metadata documents keyed by storage key
/// (`releases/com/example/lib/maven-metadata.xml`).
///
/// Entries never expire; writers invalidate them explicitly. Every
/// invalidation bumps an epoch, and a document is only cached if no
/// invalidation of its key happened since its generation took a
/// [`CacheTicket`].
#[derive(Default)]
pub struct MetadataCache {
    entries: DashMap<String, Arc<str>>,
    /// Per-key invalidation counters.
    epochs: DashMap<String, u64>,
    /// Bumped by `clear`.
    generation: AtomicU64,
    /// Held shared by inserts and exclusively by `clear`.
    clearing: RwLock<()>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Invalidation state observed before a document was generated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheTicket {
    generation: u64,
    epoch: u64,
}

/// Hit and miss counters since startup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Arc<str>> {
        let found = self.entries.get(key).map(|entry| entry.value().clone());
        let counter = if found.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Take a ticket for `key`. Must be called before reading the storage
    /// the document is generated from.
    pub fn ticket(&self, key: &str) -> CacheTicket {
        let _shared = self.clearing.read().unwrap_or_else(|p| p.into_inner());
        CacheTicket {
            generation: self.generation.load(Ordering::Acquire),
            epoch: self.epochs.get(key).map(|e| *e.value()).unwrap_or(0),
        }
    }

    /// Whether `key` has not been invalidated since `ticket` was taken.
    pub fn is_current(&self, key: &str, ticket: CacheTicket) -> bool {
        self.ticket(key) == ticket
    }

    /// Cache `document` unless `key` was invalidated since `ticket` was
    /// taken. Returns whether it was stored.
    pub fn insert(&self, key: String, document: Arc<str>, ticket: CacheTicket) -> bool {
        let _shared = self.clearing.read().unwrap_or_else(|p| p.into_inner());
        if self.generation.load(Ordering::Acquire) != ticket.generation {
            return false;
        }
        // The epoch entry guard serializes this check with `remove`.
        let epoch = self.epochs.entry(key.clone()).or_insert(0);
        if *epoch != ticket.epoch {
            return false;
        }
        self.entries.insert(key, document);
        true
    }

    /// Remove one entry and invalidate in-flight generations of it.
    /// Returns whether an entry was present.
    pub fn remove(&self, key: &str) -> bool {
        let mut epoch = self.epochs.entry(key.to_string()).or_insert(0);
        *epoch += 1;
        self.entries.remove(key).is_some()
    }

    /// Remove every entry and return how many there were.
    pub fn clear(&self) -> usize {
        let _exclusive = self.clearing.write().unwrap_or_else(|p| p.into_inner());
        self.generation.fetch_add(1, Ordering::AcqRel);
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
