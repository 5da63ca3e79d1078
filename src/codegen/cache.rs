/*!
 * Compiled Kernel Cache
 *
 * Compiled kernels keyed by (unit fingerprint, descriptor hash, device,
 * hoisting flag) behind a reader-writer lock, with LRU eviction at a
 * configurable entry cap.
 */

use super::kernel::CompiledKernel;
use crate::core::limits::CODE_CACHE_MAX_ENTRIES;
use crate::exec::device::DeviceKind;
use ahash::RandomState;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Cache key of a compiled kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CodeCacheKey {
    pub unit_fingerprint: u64,
    pub qmd_hash: u64,
    pub device: DeviceKind,
    pub hoist_literals: bool,
}

struct CacheEntry {
    kernel: Arc<CompiledKernel>,
    last_used: AtomicU64,
}

/// Cache hit/miss/eviction counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CodeCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// The compiled-kernel cache
pub struct CodeCache {
    entries: RwLock<HashMap<CodeCacheKey, CacheEntry, RandomState>>,
    max_entries: usize,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl CodeCache {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(CODE_CACHE_MAX_ENTRIES)
    }

    #[must_use]
    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::with_hasher(RandomState::new())),
            max_entries: max_entries.max(1),
            clock: AtomicU64::new(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Look up a compiled kernel, refreshing its LRU position
    #[must_use]
    pub fn get(&self, key: &CodeCacheKey) -> Option<Arc<CompiledKernel>> {
        let entries = self.entries.read();
        match entries.get(key) {
            Some(entry) => {
                entry
                    .last_used
                    .store(self.clock.fetch_add(1, Ordering::Relaxed), Ordering::Relaxed);
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(Arc::clone(&entry.kernel))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert a freshly compiled kernel, evicting the least recently
    /// used entry when the cap is reached.
    pub fn put(&self, key: CodeCacheKey, kernel: Arc<CompiledKernel>) {
        let mut entries = self.entries.write();
        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            if let Some(victim) = entries
                .iter()
                .min_by_key(|(_, e)| e.last_used.load(Ordering::Relaxed))
                .map(|(k, _)| *k)
            {
                entries.remove(&victim);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(?victim, "evicted compiled kernel");
            }
        }
        entries.insert(
            key,
            CacheEntry {
                kernel,
                last_used: AtomicU64::new(self.clock.fetch_add(1, Ordering::Relaxed)),
            },
        );
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    #[must_use]
    pub fn stats(&self) -> CodeCacheStats {
        CodeCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

impl Default for CodeCache {
    fn default() -> Self {
        Self::new()
    }
}
