//! This file contains the size helpers for the allocator. These are functions
//! that don't particularly belong to any concrete module of the program.

use crate::block::MIN_PAYLOAD;

/// Every block and every payload starts on a multiple of this many bytes.
///
/// This is a fixed constant rather than the pointer width of the target so
/// that 32 bit and 64 bit builds lay out the region identically.
pub const WORD_SIZE: usize = 8;

/// It aligns `to_be_aligned` using `aligment`, which must be a power of two.
///
/// Returns `None` if the result does not fit in a `usize`.
pub const fn align(to_be_aligned: usize, aligment: usize) -> Option<usize> {
    match to_be_aligned.checked_add(aligment - 1) {
        Some(value) => Some(value & !(aligment - 1)),
        None => None,
    }
}

/// Payload size handed out for a request of `requested` bytes.
///
/// The request is rounded up to [`WORD_SIZE`] and never goes below
/// [`MIN_PAYLOAD`], since a block has to be able to hold its free list links
/// once it is given back.
pub const fn aligned_size(requested: usize) -> Option<usize> {
    match align(requested, WORD_SIZE) {
        Some(size) if size < MIN_PAYLOAD => Some(MIN_PAYLOAD),
        other => other,
    }
}
