//! # inblock - an allocator that lives inside a caller supplied buffer
//!
//! A [`Heap`] takes a fixed size, contiguous buffer and hands out variable
//! sized pieces of it. It never asks the operating system for memory: all
//! the bookkeeping is kept inside the buffer itself, in front of and inside
//! the blocks it manages.
//!
//! ```text
//!   Region handed to Heap::new:
//!
//!   base                                                         base + len
//!   +------+---------+------+----------------------+------+--------------+
//!   | size | payload | size | next | prev |  ...   | size |   payload    |
//!   +------+---------+------+----------------------+------+--------------+
//!     allocated block          free block            allocated block
//! ```
//!
//! Every block starts with an 8 byte header holding its payload size. Free
//! blocks also keep `next`/`previous` links in the first bytes of their
//! payload, forming a doubly linked free list that is always sorted by
//! address:
//!
//! - Allocation searches the free list for the smallest block that fits
//!   (best fit), splits off what it does not need as a new free block, and
//!   returns a pointer just past the header.
//! - Deallocation puts the block back in address order and merges it with
//!   its left and right neighbours if those are free, so no two free blocks
//!   ever touch.
//!
//! Sizes are always rounded to 8 bytes, so every pointer handed out is 8
//! byte aligned as long as the buffer is.
//!
//! ## Quick Start
//!
//! ```
//! use inblock::{Heap, HeapAlloc};
//!
//! #[repr(C, align(8))]
//! struct Arena([u8; 4096]);
//!
//! let mut arena = Arena([0; 4096]);
//! let heap = Heap::new(&mut arena.0).unwrap();
//!
//! let first = heap.allocate(100).unwrap();
//! let second = heap.allocate(200).unwrap();
//! unsafe {
//!     heap.deallocate(first).unwrap();
//!     heap.deallocate(second).unwrap();
//! }
//! assert_eq!(heap.free_blocks().len(), 1);
//!
//! // Containers use the heap through a handle.
//! let mut squares = allocator_api2::vec::Vec::new_in(HeapAlloc::new(&heap));
//! squares.extend((0..10).map(|i: u64| i * i));
//! ```
//!
//! ## Limitations
//!
//! - **Single-threaded only**: a heap is not `Sync`; wrap it in a lock to
//!   share it.
//! - **Fixed size**: the region never grows or shrinks.
//! - **8 byte alignment**: larger alignments are refused.
//! - **No double free detection**: releasing a block twice is undefined
//!   behaviour. Pointers outside the region are rejected.

mod alloc;
mod block;
mod error;
mod freelist;
mod heap;
mod kernel;
mod list;
mod region;
mod utils;

pub use alloc::HeapAlloc;
pub use block::{HEADER_SIZE, MIN_PAYLOAD, MIN_REGION_SIZE};
pub use error::{Corruption, HeapError};
pub use heap::{FreeBlock, Heap, HeapStats};
pub use kernel::{MappedRegion, page_size};
pub use utils::{WORD_SIZE, align, aligned_size};
