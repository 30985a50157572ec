//! Aligned buffer for Direct I/O.
//!
//! `O_DIRECT` transfers fail with `EINVAL` unless the source memory is
//! aligned to the filesystem block size, so cache pages and scratch staging
//! buffers are allocated through [`AlignedBuf`] rather than `Vec<u8>`, whose
//! allocation alignment is only that of `u8`.

use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::ops::{Deref, DerefMut};

/// A zero-initialized heap buffer with a guaranteed address alignment.
///
/// The buffer owns its memory exclusively and frees it with the same
/// [`Layout`] it was allocated with.
pub struct AlignedBuf {
    ptr: *mut u8,
    len: usize,
    layout: Layout,
}

impl AlignedBuf {
    /// Allocates a zeroed buffer of `len` bytes aligned to `align`.
    ///
    /// # Panics
    ///
    /// Panics if `align` is zero or not a power of two, if `len` is zero,
    /// or if the allocator fails.
    pub fn zeroed(len: usize, align: usize) -> Self {
        assert!(len > 0, "aligned buffer must not be empty");
        let layout =
            Layout::from_size_align(len, align).expect("invalid layout for aligned buffer");

        // SAFETY: layout has non-zero size, checked above.
        let ptr = unsafe { alloc_zeroed(layout) };
        assert!(!ptr.is_null(), "failed to allocate aligned buffer");

        Self { ptr, len, layout }
    }

    /// Returns the buffer contents as a slice.
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr is valid for len bytes for the lifetime of self and
        // was zero-initialized at allocation.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    /// Returns the buffer contents as a mutable slice.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and &mut self guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }

    /// Returns the length of the buffer in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the buffer is empty. Always false by construction.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the alignment the buffer was allocated with.
    pub fn align(&self) -> usize {
        self.layout.align()
    }
}

impl Deref for AlignedBuf {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl DerefMut for AlignedBuf {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.as_mut_slice()
    }
}

impl Drop for AlignedBuf {
    fn drop(&mut self) {
        // SAFETY: ptr was allocated with exactly this layout and is not
        // freed anywhere else.
        unsafe { dealloc(self.ptr, self.layout) }
    }
}

impl std::fmt::Debug for AlignedBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedBuf")
            .field("len", &self.len)
            .field("align", &self.layout.align())
            .finish()
    }
}

// SAFETY: AlignedBuf owns its memory exclusively; no interior mutability.
unsafe impl Send for AlignedBuf {}
unsafe impl Sync for AlignedBuf {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_is_aligned_and_zeroed() {
        let buf = AlignedBuf::zeroed(4096, 4096);
        assert_eq!(buf.len(), 4096);
        assert_eq!(buf.align(), 4096);
        assert_eq!(buf.as_slice().as_ptr() as usize % 4096, 0);
        assert!(buf.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn writes_are_visible_through_deref() {
        let mut buf = AlignedBuf::zeroed(4096, 4096);
        buf[10..14].copy_from_slice(b"abcd");
        assert_eq!(&buf[10..14], b"abcd");
        assert_eq!(buf[9], 0);
        assert_eq!(buf[14], 0);
    }

    #[test]
    fn oversized_alignment_is_respected() {
        let buf = AlignedBuf::zeroed(512, 16384);
        assert_eq!(buf.as_slice().as_ptr() as usize % 16384, 0);
    }
}
