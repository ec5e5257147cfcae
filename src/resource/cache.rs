//! Representation caching.
//!
//! Stores the encoded bytes a resource actually sent so a later request for
//! the same resource, version and encoding can skip the read entirely.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::dispatch::navigator::Trail;
use crate::dispatch::negotiation::Representation;
use crate::http::request::RestRequest;

/// Entries kept by a [`MemoryCache`] before it starts over.
pub const DEFAULT_CAPACITY: usize = 256;

/// Identifies one cached representation.
///
/// Only inputs that change the bytes sent are part of the key: the canonical
/// resource URL, the ETag the bytes were read under, and the two encoding
/// choices. Unrelated query parameters never create new entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Canonical URL of the resource.
    pub target: String,
    /// ETag in effect when the representation was read.
    pub etag: Option<String>,
    /// Whether the representation was negotiated for a gzip-capable client.
    pub gzip: bool,
    /// Whether the compact JSON flag was present on the query.
    pub compact_json: bool,
}

impl CacheKey {
    pub fn for_request(
        trail: &Trail,
        req: &RestRequest,
        etag: Option<&str>,
        compact_json_param: &str,
    ) -> Self {
        Self {
            target: trail.url(req.prefix()),
            etag: etag.map(str::to_string),
            gzip: req.accepts_gzip(),
            compact_json: req.query_flag(compact_json_param),
        }
    }
}

/// Cache delegate for encoded representations.
///
/// Readers take a [`generation`](RepresentationCache::generation) before
/// reading and hand it back to `put`; a representation read before the last
/// invalidation is never served.
pub trait RepresentationCache: Send + Sync {
    fn generation(&self) -> u64;

    fn get(&self, key: &CacheKey) -> Option<Representation>;

    fn put(&self, key: CacheKey, generation: u64, representation: Representation);

    /// Drop everything; called after the resource changed.
    fn invalidate(&self);
}

/// In-process cache backed by a concurrent map.
#[derive(Clone)]
pub struct MemoryCache {
    inner: Arc<DashMap<CacheKey, (u64, Representation)>>,
    generation: Arc<AtomicU64>,
    capacity: usize,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache holding at most `capacity` entries; a full cache is cleared
    /// before the next insert.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            generation: Arc::new(AtomicU64::new(0)),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl RepresentationCache for MemoryCache {
    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn get(&self, key: &CacheKey) -> Option<Representation> {
        let current = self.generation();
        let entry = self.inner.get(key)?;
        let (generation, representation) = entry.value();
        (*generation == current).then(|| representation.clone())
    }

    fn put(&self, key: CacheKey, generation: u64, representation: Representation) {
        if generation != self.generation() {
            tracing::debug!(resource = %key.target, "Discarding representation read before invalidation");
            return;
        }
        if self.inner.len() >= self.capacity && !self.inner.contains_key(&key) {
            tracing::debug!(capacity = self.capacity, "Representation cache full, clearing");
            self.inner.clear();
        }
        // An invalidation racing this insert leaves an entry stamped with the
        // old generation, which `get` ignores.
        self.inner.insert(key, (generation, representation));
    }

    fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.clear();
    }
}
