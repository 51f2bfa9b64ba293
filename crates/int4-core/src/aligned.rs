//! Cache-line aligned byte storage for packed weights.

use std::alloc::{self, Layout};
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

/// Alignment of every [`AlignedBytes`] allocation. One cache line, and one
/// full AVX-512 register.
pub const PACK_ALIGN: usize = 64;

/// A zero-initialized, 64-byte aligned byte buffer.
pub struct AlignedBytes {
    ptr: NonNull<u8>,
    len: usize,
}

// Safety: AlignedBytes uniquely owns its allocation.
unsafe impl Send for AlignedBytes {}
unsafe impl Sync for AlignedBytes {}

impl AlignedBytes {
    /// Allocate `len` zeroed bytes.
    ///
    /// Panics only if the allocator itself fails.
    pub fn new_zeroed(len: usize) -> Self {
        if len == 0 {
            return Self {
                ptr: NonNull::dangling(),
                len: 0,
            };
        }

        let layout = Self::layout(len);
        // Safety: layout has nonzero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = match NonNull::new(raw) {
            Some(p) => p,
            None => alloc::handle_alloc_error(layout),
        };
        Self { ptr, len }
    }

    /// Copy `bytes` into a fresh aligned allocation.
    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut v = Self::new_zeroed(bytes.len());
        v.copy_from_slice(bytes);
        v
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    fn layout(len: usize) -> Layout {
        match Layout::from_size_align(len, PACK_ALIGN) {
            Ok(l) => l,
            Err(_) => panic!("AlignedBytes: {} bytes exceeds isize::MAX", len),
        }
    }
}

impl Deref for AlignedBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // Safety: ptr is valid for len initialized bytes (dangling is fine for len 0).
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl DerefMut for AlignedBytes {
    fn deref_mut(&mut self) -> &mut [u8] {
        // Safety: as in deref, and &mut self guarantees exclusivity.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for AlignedBytes {
    fn drop(&mut self) {
        if self.len == 0 {
            return;
        }
        // Safety: allocated in new_zeroed with exactly this layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), Self::layout(self.len)) }
    }
}

impl Clone for AlignedBytes {
    fn clone(&self) -> Self {
        Self::from_slice(self)
    }
}

impl PartialEq for AlignedBytes {
    fn eq(&self, other: &Self) -> bool {
        **self == **other
    }
}

impl Eq for AlignedBytes {}

impl std::fmt::Debug for AlignedBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AlignedBytes(len={}, align={})", self.len, PACK_ALIGN)
    }
}
