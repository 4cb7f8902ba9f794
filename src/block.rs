use std::mem;

/// Header size of a block. Only the size word survives while a block is
/// allocated, so that is all the header holds.
pub const HEADER_SIZE: usize = mem::size_of::<u64>();

/// Smallest payload a block can have. A free block keeps its `next` and
/// `previous` links in the first bytes of its payload, so every payload has
/// to be large enough to hold both of them.
pub const MIN_PAYLOAD: usize = 2 * mem::size_of::<u64>();

/// Smallest region that can be turned into a heap.
pub const MIN_REGION_SIZE: usize = HEADER_SIZE + MIN_PAYLOAD;

/// Marker stored in a link slot that points nowhere.
const NIL: u64 = u64::MAX;

/// Offset of a block inside its region. `None` means there is no block.
pub(crate) type Link = Option<Block>;

/// A block, identified by the byte offset of its header inside the region.
///
/// ```text
/// +---------------------+ <------+
/// |        size         |        | -> Header (always present)
/// +---------------------+ <------+
/// |        next         |        |
/// +---------------------+        | -> Links (only while free)
/// |      previous       |        |
/// +---------------------+ <------+
/// |         ...         |
/// |    rest of payload  |
/// |         ...         |
/// +---------------------+
/// ```
///
/// Once the block is allocated everything after the size word belongs to the
/// caller, links included. Blocks are ordered by address, which is what the
/// free list is sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct Block(usize);

impl Block {
    #[inline]
    pub const fn at(offset: usize) -> Self {
        Self(offset)
    }

    #[inline]
    pub const fn offset(self) -> usize {
        self.0
    }

    /// Offset of the first payload byte.
    #[inline]
    pub const fn payload(self) -> usize {
        self.0 + HEADER_SIZE
    }

    /// Offset of the `next` link slot.
    #[inline]
    pub const fn next_slot(self) -> usize {
        self.payload()
    }

    /// Offset of the `previous` link slot.
    #[inline]
    pub const fn previous_slot(self) -> usize {
        self.payload() + mem::size_of::<u64>()
    }

    /// Offset one past the last payload byte of a block holding `size` bytes,
    /// which is where its right physical neighbour starts.
    #[inline]
    pub const fn end(self, size: usize) -> usize {
        self.payload() + size
    }

    /// Block that starts right after the first `size` payload bytes of this one.
    #[inline]
    pub const fn split_at(self, size: usize) -> Self {
        Self(self.end(size))
    }
}

/// The header record of a free block, as stored in the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Header {
    /// Payload bytes, excluding the header itself.
    pub size: usize,
    pub next: Link,
    pub previous: Link,
}

#[inline]
pub(crate) const fn encode_link(link: Link) -> u64 {
    match link {
        Some(block) => block.0 as u64,
        None => NIL,
    }
}

#[inline]
pub(crate) const fn decode_link(raw: u64) -> Link {
    if raw == NIL {
        None
    } else {
        Some(Block(raw as usize))
    }
}
