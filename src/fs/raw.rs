//! Reinterpretation of on-disk structures as raw bytes.
//!
//! Every structure moved through these helpers is `#[repr(C)]` without
//! implicit padding, so its memory representation matches the packed
//! little-endian on-disk layout on the platforms the tool targets.

use std::mem::size_of;
use std::{mem, ptr, slice};

/// Reinterprets the given structure as a byte slice.
pub(crate) fn as_bytes<T>(val: &T) -> &[u8] {
    unsafe { slice::from_raw_parts(val as *const T as *const u8, size_of::<T>()) }
}

/// Builds a structure out of the first `size_of::<T>()` bytes of `buf`.
///
/// The buffer must be at least as large as the structure.
pub(crate) fn from_bytes<T: Copy>(buf: &[u8]) -> T {
    assert!(buf.len() >= size_of::<T>());
    unsafe {
        let mut val: T = mem::zeroed();
        ptr::copy_nonoverlapping(buf.as_ptr(), &mut val as *mut T as *mut u8, size_of::<T>());
        val
    }
}
