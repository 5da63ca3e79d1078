/*!
 * Pinned Buffer Handles
 * RAII pins over pool-resident chunk bytes
 */

use super::manager::MgrInner;
use super::types::ChunkKey;
use std::ops::Deref;
use std::sync::Arc;

/// A pinned view of a chunk resident in one tier. The segment backing it
/// cannot be evicted while this handle lives; dropping it unpins.
pub struct PinnedBuffer {
    key: ChunkKey,
    bytes: Arc<[u8]>,
    /// Slab location, None for zero-copy wrappers
    loc: Option<(usize, usize)>,
    mgr: Arc<MgrInner>,
}

impl PinnedBuffer {
    pub(super) fn new(
        key: ChunkKey,
        bytes: Arc<[u8]>,
        loc: Option<(usize, usize)>,
        mgr: Arc<MgrInner>,
    ) -> Self {
        Self {
            key,
            bytes,
            loc,
            mgr,
        }
    }

    #[inline]
    #[must_use]
    pub fn key(&self) -> ChunkKey {
        self.key
    }

    #[inline]
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Shared handle to the underlying bytes, outliving the pin
    #[inline]
    #[must_use]
    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Deref for PinnedBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl Drop for PinnedBuffer {
    fn drop(&mut self) {
        if let Some((slab, start_page)) = self.loc {
            self.mgr.unpin_segment(slab, start_page);
        }
    }
}

impl std::fmt::Debug for PinnedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinnedBuffer")
            .field("key", &self.key)
            .field("len", &self.bytes.len())
            .field("loc", &self.loc)
            .finish()
    }
}
