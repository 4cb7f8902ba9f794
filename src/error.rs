use thiserror::Error;

/// Errors reported by a [`crate::Heap`] and the handles bound to it.
///
/// Double frees are not in this list: handing the same pointer back twice is
/// undefined behaviour and is not detected.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
    /// No free block can hold the request. The free list is left untouched.
    #[error("out of memory: no free block can hold {requested} bytes")]
    OutOfMemory { requested: usize },
    /// The region cannot even hold a single free block.
    #[error("region of {len} bytes is too small, at least {min} bytes are needed")]
    HeapTooSmall { len: usize, min: usize },
    /// The region does not start on a word boundary.
    #[error("region base {addr:#x} is not aligned to a word boundary")]
    MisalignedRegion { addr: usize },
    /// The element type needs a stricter alignment than the heap can give.
    #[error("alignment of {align} bytes is not supported, blocks are aligned to 8 bytes")]
    UnsupportedAlignment { align: usize },
    /// The pointer handed to `deallocate` was not produced by this heap.
    #[error("pointer {addr:#x} does not belong to this heap")]
    ForeignPointer { addr: usize },
    /// The operating system refused to map memory for a region.
    #[error("could not map {len} bytes of memory")]
    MapFailed { len: usize },
}

/// Inconsistencies found by [`crate::Heap::check`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Corruption {
    #[error("free list is not sorted by address at offset {offset}")]
    Unordered { offset: usize },
    #[error("free blocks at offsets {left} and {right} are physically adjacent")]
    Adjacent { left: usize, right: usize },
    #[error("block at offset {offset} records a size of {size}, which is not a word multiple")]
    BadSize { offset: usize, size: usize },
    #[error("block at offset {offset} runs past the end of the region")]
    Overrun { offset: usize },
    #[error("free list entry at offset {offset} is not a block boundary")]
    StrayFreeBlock { offset: usize },
}
