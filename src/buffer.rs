//! Opaque, non-owning buffer handles.
//!
//! The core treats a buffer as `(address-identity, size-in-bytes,
//! current-dtype, usage-flags)`. Rather than using the `wgpu::Buffer`
//! itself as a map key (possible, but it requires threading a stable
//! identity through `wgpu`'s handle types), identity is a small
//! monotonic [`BufferId`] minted once per logical buffer and carried
//! alongside the `wgpu::Buffer` reference — equivalent to a global map
//! keyed by handle, without needing one.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity for a logical buffer, independent of dtype
/// reclassification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(u64);

impl BufferId {
    pub fn fresh() -> Self {
        Self(NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A non-owning reference to a caller-supplied `wgpu::Buffer`, tagged
/// with the identity the dtype registry and validator key off of.
///
/// The core never destroys the underlying `wgpu::Buffer` of a
/// `BufferHandle` — lifetime is caller-controlled.
#[derive(Clone)]
pub struct BufferHandle<'a> {
    id: BufferId,
    buffer: &'a wgpu::Buffer,
    size_bytes: u64,
}

impl<'a> BufferHandle<'a> {
    pub fn new(id: BufferId, buffer: &'a wgpu::Buffer, size_bytes: u64) -> Self {
        Self {
            id,
            buffer,
            size_bytes,
        }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        self.buffer
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_ids_are_unique_and_monotonic() {
        let a = BufferId::fresh();
        let b = BufferId::fresh();
        assert_ne!(a, b);
        assert!(b > a);
    }
}
